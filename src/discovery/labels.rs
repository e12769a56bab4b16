//! Default heuristic for naming a discovered identity.

/// What a label can be derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelHints<'a> {
    pub email: Option<&'a str>,
    pub username: Option<&'a str>,
    pub key_comment: Option<&'a str>,
}

/// Pluggable label heuristic.
pub type LabelFn = fn(&LabelHints<'_>) -> String;

const PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "yahoo.com",
    "icloud.com",
    "me.com",
    "protonmail.com",
    "proton.me",
    "fastmail.com",
];

/// Second-level labels that sit in front of a country code (`acme.co.uk`).
const SECOND_LEVEL: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu"];

/// Personal providers map to "Personal", the GitHub noreply domain to
/// "GitHub", anything else to the capitalized organisation label. Without an
/// email, falls back to the username and then the key comment.
pub fn suggest_label(hints: &LabelHints<'_>) -> String {
    if let Some(domain) = hints
        .email
        .and_then(|e| e.rsplit_once('@'))
        .map(|(_, d)| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
    {
        if PERSONAL_DOMAINS.contains(&domain.as_str()) {
            return "Personal".to_string();
        }
        if domain.ends_with("users.noreply.github.com") {
            return "GitHub".to_string();
        }
        if let Some(org) = organisation(&domain) {
            return capitalize(org);
        }
    }

    if let Some(username) = hints.username.map(|u| u.trim().to_ascii_lowercase()) {
        if username.contains("personal") {
            return "Personal".to_string();
        }
        if username.contains("work") {
            return "Work".to_string();
        }
    }

    if let Some(local) = hints
        .key_comment
        .map(|c| c.split('@').next().unwrap_or(c).trim())
        .filter(|l| !l.is_empty())
    {
        return capitalize(local);
    }

    "Unknown".to_string()
}

fn organisation(domain: &str) -> Option<&str> {
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    match labels.as_slice() {
        [] => None,
        [only] => Some(*only),
        [.., org, second, tld] if tld.len() == 2 && SECOND_LEVEL.contains(second) => Some(*org),
        [.., org, _tld] => Some(*org),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(e: &str) -> String {
        suggest_label(&LabelHints {
            email: Some(e),
            ..Default::default()
        })
    }

    #[test]
    fn test_email_domains() {
        assert_eq!(email("ada@gmail.com"), "Personal");
        assert_eq!(email("ada@Proton.me"), "Personal");
        assert_eq!(email("1234+ada@users.noreply.github.com"), "GitHub");
        assert_eq!(email("ada@acme.io"), "Acme");
        assert_eq!(email("ada@eng.bigcorp.com"), "Bigcorp");
        assert_eq!(email("ada@acme.co.uk"), "Acme");
        assert_eq!(email("ada@uni.ac.jp"), "Uni");
    }

    #[test]
    fn test_username_hint_is_a_substring_match() {
        let label = |username| {
            suggest_label(&LabelHints {
                username: Some(username),
                ..Default::default()
            })
        };
        assert_eq!(label("ada-work"), "Work");
        assert_eq!(label("AdaPersonal"), "Personal");
        assert_eq!(label("ada"), "Unknown");
    }

    #[test]
    fn test_fallbacks() {
        let hints = LabelHints {
            username: Some("Work"),
            key_comment: Some("ada@laptop"),
            ..Default::default()
        };
        assert_eq!(suggest_label(&hints), "Work");

        let hints = LabelHints {
            username: Some("ada"),
            key_comment: Some("deploy@laptop"),
            ..Default::default()
        };
        assert_eq!(suggest_label(&hints), "Deploy");

        assert_eq!(suggest_label(&LabelHints::default()), "Unknown");
    }
}
