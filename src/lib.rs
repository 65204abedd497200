//! A lazy, bit-addressable binary field parser.
//!
//! A document is a tree of *fields*. A leaf field is a direct stream read
//! (an integer, a string, a timestamp, raw bytes); a field set is a
//! container whose children are produced lazily, one at a time, by a
//! format-specific [`producer::Producer`] as a consumer actually asks for
//! them — by path, by index, or by forcing the whole set fed. Nothing is
//! decoded until it's reached.
//!
//! # Bit numbering
//!
//! Every address in this crate ([`tree::FieldTree::absolute_address`],
//! [`stream::InputStream::read_bits`]'s `offset`, a [`tree::FieldNode`]'s
//! `address`) is a **bit** offset from the start of the stream, bit 0
//! being the most significant bit of byte 0 regardless of the field's own
//! `endian`. `endian` governs only how a multi-byte window is *packed*
//! once the bits are found — big-endian treats the first byte read as the
//! most significant, little-endian the least — never which bit is
//! numbered first. A [`field::LeafKind::Bit`] at bit offset 3 is always
//! the fourth most-significant bit of its byte.
//!
//! # Modules
//!
//! - [`stream`] — the byte buffer, addressed in bits.
//! - [`value`] — a decoded leaf's scalar value.
//! - [`field`] — leaf field kinds and how they size/decode/display.
//! - [`ordered_map`] — the insertion-ordered, unique-key map backing a
//!   field set's children.
//! - [`producer`] — the contract a format author implements.
//! - [`tree`] — the arena-backed driver tying streams, producers and
//!   field sets together.
//! - [`event`] — lifecycle listeners for mutation-aware consumers.
//! - [`parser`] — the root-level contract a complete format plugs into
//!   ([`parser::ParserTags`], [`parser::FormatParser`]).
//! - [`registry`] — format detection and dispatch
//!   ([`registry::ParserRegistry`], [`registry::guess_parser`]).
//! - [`formats`] — the format implementations carried by this crate's
//!   default features.

pub mod config;
pub mod endian;
pub mod error;
pub mod event;
pub mod field;
pub mod formats;
pub mod ordered_map;
pub mod parser;
pub mod producer;
pub mod registry;
pub mod stream;
pub mod tree;
pub mod value;

pub use config::ParserOptions;
pub use endian::Endian;
pub use error::{CoreError, Result};
pub use event::{Event, EventHandler, EventKind};
pub use field::{Charset, LeafKind};
pub use ordered_map::OrderedUniqueMap;
pub use parser::{FormatParser, ParserTags};
pub use producer::{FieldPayload, FieldSpec, Producer, StepProducer};
pub use registry::{guess_parser, ParserRegistry};
pub use stream::InputStream;
pub use tree::{FieldContent, FieldLocation, FieldNode, FieldSetId, FieldTree};
pub use value::Value;
