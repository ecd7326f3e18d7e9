//! API key authentication for webhooks and the read-state API
//!
//! The platform backend passes the shared key via the X-API-Key header.
//! With no key configured every request is allowed.

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Shared-secret validator
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    key: Option<String>,
}

impl ApiKeyValidator {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()),
        }
    }

    /// Check if API key authentication is configured
    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Whether a request carrying `api_key` may proceed
    pub fn validate(&self, api_key: Option<&str>) -> bool {
        match (&self.key, api_key) {
            (None, _) => true,
            (Some(expected), Some(given)) => constant_time_compare(given, expected),
            (Some(_), None) => false,
        }
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_allows_everything() {
        let validator = ApiKeyValidator::new(None);
        assert!(!validator.is_configured());
        assert!(validator.validate(None));
        assert!(validator.validate(Some("anything")));
    }

    #[test]
    fn test_configured_key() {
        let validator = ApiKeyValidator::new(Some("webhook-secret".into()));
        assert!(validator.is_configured());
        assert!(validator.validate(Some("webhook-secret")));
        assert!(!validator.validate(Some("wrong-secret")));
        assert!(!validator.validate(None));
    }

    #[test]
    fn test_empty_key_treated_as_none() {
        assert!(!ApiKeyValidator::new(Some("".into())).is_configured());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
