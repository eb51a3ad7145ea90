use std::fmt;

/// API key for the answering provider. Lives only in memory: it has no
/// `Serialize` impl and its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` when the input is empty or only whitespace.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_absent() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("  \n\t").is_none());
    }

    #[test]
    fn test_trims_input() {
        let credential = Credential::new("  gsk_abc\n").unwrap();
        assert_eq!(credential.expose(), "gsk_abc");
    }

    #[test]
    fn test_debug_redacts() {
        let credential = Credential::new("gsk_secret").unwrap();
        let debug = format!("{credential:?}");
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("REDACTED"));
    }
}
