//! Sealed record store for profiles, remembered repositories and settings.

mod cipher;
mod models;
mod schema;
mod store;

pub use models::{
    AppSettings, AuthMethod, CreateProfileInput, Profile, Provider, RepoStatus, Repository,
    RepositoryRecord, SettingsUpdate, Theme, UpdateProfileInput,
};
pub use cipher::{STORE_KEY_ID, StoreCipher};
pub use schema::{init_db, init_memory_db};
pub use store::{RecordStorage, RecordStore};
