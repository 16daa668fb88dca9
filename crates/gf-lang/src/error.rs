use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Reasons a command tail failed to parse, or a predicate/geometry
/// evaluation failed against an object.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum LangReason {
    #[error("wrong number of arguments")]
    ArgCount,
    #[error("invalid argument: {0}")]
    ArgInvalid(String),
    #[error("duplicate argument: {0}")]
    DuplicateArg(String),
    #[error("not a rectangle")]
    NotRectangle,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("no script found with that SHA")]
    ShaNotFound,
    #[error("script error: {0}")]
    ScriptError(String),
    #[error("scripting support is not compiled in")]
    ScriptUnavailable,
    #[error("conflicting options: {0}")]
    Conflict(String),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for LangReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::ArgCount => 3001,
            Self::ArgInvalid(_) => 3002,
            Self::DuplicateArg(_) => 3003,
            Self::NotRectangle => 3004,
            Self::InvalidGeometry(_) => 3005,
            Self::ShaNotFound => 3006,
            Self::ScriptError(_) => 3007,
            Self::ScriptUnavailable => 3008,
            Self::Conflict(_) => 3009,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type LangError = StructError<LangReason>;
pub type LangResult<T> = Result<T, LangError>;
