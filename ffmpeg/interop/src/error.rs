use thiserror::Error;

/**
    Errors reported by a decoding engine implementation.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine could not open input: {0}")]
    Open(String),
    #[error("engine rejected option(s): {}", .0.join(", "))]
    RejectedOptions(Vec<String>),
    #[error("stream info probe failed: {0}")]
    Probe(String),
    #[error("no decoder for stream {0}")]
    DecoderNotFound(usize),
    #[error("decoder error: {0}")]
    Decode(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("allocation failed: {0}")]
    Alloc(&'static str),
    #[error("engine initialization failed: {0}")]
    Init(String),
}

/**
    Errors surfaced by the session layer.
*/
#[derive(Debug, Error)]
pub enum InteropError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("byte stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for InteropError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::RejectedOptions(keys) => Self::InvalidConfiguration(keys.join(", ")),
            EngineError::Alloc(what) => Self::OutOfMemory(what),
            EngineError::Open(msg) | EngineError::Probe(msg) => Self::OpenFailed(msg),
            EngineError::DecoderNotFound(index) => {
                Self::OpenFailed(format!("no decoder for stream {index}"))
            }
            other => Self::Engine(other),
        }
    }
}

/// Type alias for results that may return an [`InteropError`].
pub type Result<T> = std::result::Result<T, InteropError>;
