//! Unified error taxonomy for the core field-parsing runtime.
//!
//! Mirrors the failure classes a format author or a tree consumer can hit:
//! a malformed stream, a format that doesn't match, an out-of-range read, a
//! missing path component, or an internal duplicate-name collision (the
//! last one is always repaired internally and should not reach a caller).

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the field-parsing core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A producer or the driver found a structural violation: a size
    /// mismatch, an invalid count, a field too large for its parent, a
    /// duplicate name that retry couldn't resolve.
    #[error("parser error at {path}: {message}")]
    Parser { path: String, message: String },

    /// The stream's content doesn't match the format being tried. Callers
    /// of `guess_parser`/`ParserRegistry::guess` should move on to the
    /// next candidate rather than treat this as fatal.
    #[error("format mismatch: {message}")]
    Match { message: String },

    /// A read went beyond the known end of the stream, or the source
    /// itself could not supply the requested bytes/bits.
    #[error("input stream error at bit offset {offset}: {message}")]
    InputStream { offset: u64, message: String },

    /// A path lookup did not resolve, either because the producer is
    /// exhausted or because an intermediate component doesn't exist.
    #[error("missing field: {path}")]
    MissingField { path: String },

    /// Internal: an `OrderedUniqueMap::append` saw a name already present.
    /// `FieldTree::_add_field` always catches this and renames+retries; if
    /// it ever escapes to a caller, that is itself a bug in the driver.
    #[error("duplicate field name {name:?} in {path}")]
    UniqueKeyViolation { path: String, name: String },
}

impl CoreError {
    pub fn parser(path: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Parser { path: path.into(), message: message.into() }
    }

    pub fn match_error(message: impl Into<String>) -> Self {
        CoreError::Match { message: message.into() }
    }

    pub fn input_stream(offset: u64, message: impl Into<String>) -> Self {
        CoreError::InputStream { offset, message: message.into() }
    }

    pub fn missing_field(path: impl Into<String>) -> Self {
        CoreError::MissingField { path: path.into() }
    }

    /// True for the class of error that, under `ParserOptions::autofix`,
    /// the driver is allowed to demote to a warning plus synthetic field.
    pub fn is_repairable(&self) -> bool {
        matches!(self, CoreError::Parser { .. } | CoreError::InputStream { .. })
    }
}
