//! Illustrative format descriptions.
//!
//! Concrete container formats are, per this crate's scope, external
//! collaborators built on the core: each module here is a thin
//! [`crate::producer::Producer`] plus a [`crate::parser::FormatParser`]
//! impl, gated behind its own Cargo feature so the core compiles with none
//! of them enabled. They exist to exercise the producer contract end to
//! end against the scenarios in spec §8, not to cover every container
//! format named in this crate's module docs (EXIF and MOV/MP4 are
//! acknowledged, registrable formats left unimplemented).

#[cfg(feature = "float")]
pub mod float;

#[cfg(feature = "au")]
pub mod au;

#[cfg(feature = "ar")]
pub mod ar;

#[cfg(feature = "jpeg")]
pub mod jpeg;
