use std::io;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PcmError {
    #[error("audio request list must contain at least one source")]
    EmptyRequestList,
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: io::ErrorKind,
        message: String,
    },
    #[error("audio producer failed: {0}")]
    Producer(String),
    #[error("invalid PCM format: {0}")]
    InvalidFormat(String),
}

impl From<io::Error> for PcmError {
    fn from(err: io::Error) -> Self {
        PcmError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PcmError> for io::Error {
    fn from(err: PcmError) -> Self {
        match err {
            PcmError::Io { kind, message } => io::Error::new(kind, message),
            other => io::Error::other(other),
        }
    }
}

impl From<String> for PcmError {
    fn from(value: String) -> Self {
        PcmError::Producer(value)
    }
}

impl From<&str> for PcmError {
    fn from(value: &str) -> Self {
        PcmError::Producer(value.to_owned())
    }
}
