use thiserror::Error;

use crate::batch::service::ServiceKind;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("no {0} is currently available")]
    NoServiceAvailable(ServiceKind),
    #[error("user configuration error: {0}")]
    UserConfiguration(String),
    #[error("internal processing error: {0}")]
    InternalProcessing(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<anyhow::Error> for GridError {
    fn from(error: anyhow::Error) -> Self {
        Self::InternalProcessing(error.to_string())
    }
}

impl From<toml::de::Error> for GridError {
    fn from(error: toml::de::Error) -> Self {
        Self::ConfigError(error.to_string())
    }
}

pub fn user_error<T, S: Into<String>>(message: S) -> crate::Result<T> {
    Err(GridError::UserConfiguration(message.into()))
}

pub fn internal_error<T, S: Into<String>>(message: S) -> crate::Result<T> {
    Err(GridError::InternalProcessing(message.into()))
}
