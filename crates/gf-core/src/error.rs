use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Failures from the collection store, the query executor, and the hook
/// registry — everything that can go wrong inside a single synchronous
/// command once its tokens are parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("key not found")]
    KeyNotFound,
    #[error("id not found")]
    IdNotFound,
    #[error("path not found")]
    PathNotFound,
    #[error("hook/channel name already in use with a different kind: {0}")]
    HookKindConflict(String),
    #[error("command timed out")]
    Timeout,
    #[error("parse/evaluation error: {0}")]
    Lang(String),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl From<gf_lang::LangError> for CoreError {
    fn from(e: gf_lang::LangError) -> Self {
        StructError::from(CoreReason::Lang(e.to_string()))
    }
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::KeyNotFound => 2001,
            Self::IdNotFound => 2002,
            Self::PathNotFound => 2003,
            Self::HookKindConflict(_) => 2004,
            Self::Timeout => 2005,
            Self::Lang(_) => 2006,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;
