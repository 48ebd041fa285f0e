use std::fmt;

use thiserror::Error;

/// What went wrong during a traversal or while compiling rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("truncated input: need {need} bytes, have {have}")]
    TruncatedInput { need: usize, have: usize },

    #[error("value {value} does not fit in {target}")]
    EncodingOverflow { target: String, value: String },

    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("unknown variant {value:?} for selector {selector}")]
    UnknownVariant { selector: String, value: String },

    #[error("registry key error: {0}")]
    RegistryKeyError(String),

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Terminal traversal error, carrying the document path and byte offset
/// at which it was raised when those are known.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformError {
    pub kind: ErrorKind,
    pub path: Option<String>,
    pub offset: Option<usize>,
}

impl TransformError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            offset: None,
        }
    }

    pub fn at_offset(kind: ErrorKind, offset: usize) -> Self {
        Self {
            kind,
            path: None,
            offset: Some(offset),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StructuralMismatch(message.into()))
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegistryKeyError(message.into()))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue(message.into()))
    }

    /// Attach a path unless an inner frame already did.
    pub fn with_path(mut self, path: impl FnOnce() -> String) -> Self {
        if self.path.is_none() {
            self.path = Some(path());
        }
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(path) = &self.path {
            write!(f, " at {}", path)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset {:#x})", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransformError {}

impl From<ErrorKind> for TransformError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;

/// Non-fatal anomalies reported next to an otherwise successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// A counted loop ran out of bytes before reaching its declared count.
    CountMismatch { expected: u64, observed: u64 },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::CountMismatch { expected, observed } => {
                write!(f, "item count is {} while there are only {} items", expected, observed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub path: String,
    pub offset: usize,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} (offset {:#x})", self.kind, self.path, self.offset)
    }
}
