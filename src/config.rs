//! Per-tree parsing options.
//!
//! The original runtime this core is modeled on reads `config.debug` and
//! `config.autofix` from process-wide globals. Here they're an explicit
//! options struct threaded through at construction, so two trees in the
//! same process can disagree (e.g. a strict validator next to a lenient
//! forensic viewer).

/// Options controlling how a [`crate::tree::FieldTree`] behaves when a
/// producer misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// When a producer yields a field that doesn't fit, or a field set
    /// seals with a size mismatch, repair it (truncate/pad/drop) and log a
    /// warning instead of propagating a [`crate::error::CoreError`].
    pub autofix: bool,
    /// Emit a `tracing::debug!` event for every field the driver appends.
    pub debug: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions { autofix: true, debug: false }
    }
}
