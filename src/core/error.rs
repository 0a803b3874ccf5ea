use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeterflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Mailbox full for role '{role}'")]
    MailboxFull { role: String },

    #[error("Mailbox closed for role '{role}'")]
    MailboxClosed { role: String },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid metric identity: {0}")]
    InvalidIdentity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for meterflow operations
pub type Result<T> = std::result::Result<T, MeterflowError>;

impl MeterflowError {
    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Returns true if this error is recoverable
    ///
    /// Overload and transient delivery failures clear up on their own; the core
    /// never retries them itself, it only drops the item and moves on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MailboxFull { .. } | Self::Transport(_) | Self::Storage(_)
        )
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Yaml(_) => "config",
            Self::Storage(_) => "storage",
            Self::Transport(_) => "transport",
            Self::MailboxFull { .. } => "overload",
            Self::MailboxClosed { .. } | Self::UnknownRole(_) => "routing",
            Self::InvalidIdentity(_) => "validation",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
        }
    }
}
