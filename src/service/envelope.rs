//! Uniform success/error wrapper for boundary responses.

use serde::Serialize;
use serde_json::Value;

use crate::error::{GitIdError, Result};

/// Error half of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&GitIdError> for ErrorBody {
    fn from(err: &GitIdError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// `{"success":true,"data":…}` or `{"success":false,"error":{…}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Ok(T),
    Err(ErrorBody),
}

impl<T> From<Result<T>> for Envelope<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Envelope::Ok(data),
            Err(err) => Envelope::Err(ErrorBody::from(&err)),
        }
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Envelope", 2)?;
        match self {
            Envelope::Ok(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            Envelope::Err(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let env = Envelope::from(Result::Ok(json!({ "restored": true })));
        assert!(matches!(env, Envelope::Ok(_)));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "success": true, "data": { "restored": true } })
        );
    }

    #[test]
    fn test_error_shape() {
        let env: Envelope<()> = Err(GitIdError::not_found("Backup not found: abc")).into();
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "success": false,
                "error": { "code": "NOT_FOUND", "message": "Backup not found: abc" }
            })
        );
    }

    #[test]
    fn test_error_details_included() {
        let err = GitIdError::io_at(
            std::path::Path::new("/x/config"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let env: Envelope<()> = Err(err).into();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["error"]["code"], "IO_FAILURE");
        assert_eq!(value["error"]["details"]["path"], "/x/config");
    }
}
