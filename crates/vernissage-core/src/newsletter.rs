use anyhow::anyhow;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::datetime::gallery_date_serde;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,

    #[serde(with = "gallery_date_serde")]
    pub entry: DateTime<Utc>,

    /// Where the signup came from ("cli", "import", ...).
    #[serde(default)]
    pub source: Option<String>,
}

/// Trimmed and lowercased; the dedupe key for signups.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Sanity check only, not full RFC 5322.
pub fn validate_email(email: &str) -> anyhow::Result<()> {
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if re.is_match(email) {
        Ok(())
    } else {
        Err(anyhow!("invalid email address: {email}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, validate_email};

    #[test]
    fn normalization_is_the_dedupe_key() {
        assert_eq!(normalize_email("  Viewer@Example.COM "), "viewer@example.com");
        assert_eq!(
            normalize_email("viewer@example.com"),
            normalize_email("VIEWER@EXAMPLE.COM")
        );
    }

    #[test]
    fn obvious_garbage_is_rejected() {
        assert!(validate_email("viewer@example.com").is_ok());
        assert!(validate_email("v.iewer+list@mail.example.org").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("two@at@signs.com").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
        assert!(validate_email("").is_err());
    }
}
