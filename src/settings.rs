//! Engine settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Settings consumed by the resolution engine.
///
/// Every option has a default; partial JSON documents only override the keys
/// they name.
///
/// # Examples
///
/// ```
/// use sscn::Settings;
///
/// let settings = Settings::from_json(r#"{"max_page_retry": 4}"#).unwrap();
/// assert_eq!(settings.max_page_retry, 4);
/// assert_eq!(settings.request_max_retry, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Consecutive request errors after which a page stops retrying.
    pub max_page_retry: u32,
    /// Default request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Automatic retries of a single request after a timeout.
    pub request_max_retry: u32,
    /// Maximum number of standards held by a store.
    pub store_capacity: usize,
    /// User agent sent by HTTP sessions.
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_page_retry: 2,
            timeout_ms: 3_000,
            request_max_retry: 1,
            store_capacity: 64,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:85.0) Gecko/20100101 Firefox/85.0"
                .to_string(),
        }
    }
}

impl Settings {
    /// Parses settings from a JSON document and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSettings`] on malformed JSON or
    /// out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let settings: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidSettings {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSettings`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidSettings {
                reason: "timeout_ms must be positive".to_string(),
            });
        }
        if self.store_capacity == 0 {
            return Err(ValidationError::InvalidSettings {
                reason: "store_capacity must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Default request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_page_retry, 2);
        assert_eq!(settings.timeout(), Duration::from_secs(3));
        assert_eq!(settings.request_max_retry, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let settings = Settings::from_json(r#"{"timeout_ms": 10000, "store_capacity": 8}"#).unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.store_capacity, 8);
        assert_eq!(settings.max_page_retry, 2);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        let err = Settings::from_json(r#"{"store_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSettings { .. }));

        let err = Settings::from_json("{not json").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSettings { .. }));
    }
}
