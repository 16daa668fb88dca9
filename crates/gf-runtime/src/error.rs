use derive_more::From;
use gf_core::CoreReason;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum RuntimeReason {
    #[error("bootstrap error")]
    Bootstrap,
    #[error("shutdown error")]
    Shutdown,
    #[error("delivery queue error: {0}")]
    Queue(String),
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 4001,
            Self::Shutdown => 4002,
            Self::Queue(_) => 4003,
            Self::UnsupportedScheme(_) => 4004,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
