use crate::config::ConfigError;
use crate::session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit status: 2 when no credential was supplied, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Session(SessionError::MissingCredential) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::from(SessionError::MissingCredential).exit_code(), 2);
        assert_eq!(Error::from(SessionError::Api("HTTP 400".into())).exit_code(), 1);
        assert_eq!(
            Error::from(ConfigError::UnknownKey("api_key".into())).exit_code(),
            1
        );
    }
}
