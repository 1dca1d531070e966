use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    // Returned by contract operations a backend cannot perform
    #[error("Player operation '{operation}' is not supported by backend '{backend}'")]
    Unsupported {
        operation: String,
        backend: String,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("D-Bus error: {0}")]
    Dbus(String),
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Operation timed out")]
    Timeout,
}

impl PlayerError {
    pub fn unsupported(operation: &str, backend: &str) -> Self {
        PlayerError::Unsupported {
            operation: operation.to_string(),
            backend: backend.to_string(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        PlayerError::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        PlayerError::Protocol(message.into())
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, PlayerError::Unsupported { .. })
    }
}

impl From<zbus::Error> for PlayerError {
    fn from(err: zbus::Error) -> Self {
        PlayerError::Dbus(err.to_string())
    }
}

impl From<zbus::fdo::Error> for PlayerError {
    fn from(err: zbus::fdo::Error) -> Self {
        PlayerError::Dbus(err.to_string())
    }
}
