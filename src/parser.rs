//! The contract a complete file format plugs into.
//!
//! A [`FormatParser`] ties a root [`crate::producer::Producer`] to the
//! static metadata ([`ParserTags`]) the [`crate::registry::ParserRegistry`]
//! uses to find it, plus a `validate` hook that gets a first look at the
//! stream before a caller commits to treating it as this format.

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::producer::Producer;
use crate::stream::InputStream;
use crate::tree::FieldTree;
use crate::config::ParserOptions;

/// A `(byte pattern, bit offset)` magic-number signature.
pub type MagicSignature = (&'static [u8], u64);

/// Static identification metadata for one format, the Rust-native
/// replacement for spec's duck-typed tags dict: every field a consumer or
/// the registry might want is named up front instead of probed by key.
#[derive(Debug, Clone, Copy)]
pub struct ParserTags {
    /// Short, stable identifier (e.g. `"jpeg"`), used as the registry key.
    pub id: &'static str,
    /// Human-readable format name (e.g. `"JPEG picture"`).
    pub name: &'static str,
    pub file_ext: &'static [&'static str],
    pub mime: &'static [&'static str],
    pub magic: &'static [MagicSignature],
    /// Smallest stream size (bits) this format could possibly match.
    pub min_size_bits: Option<u64>,
    pub description: &'static str,
}

/// A complete file format: metadata plus how to build and sanity-check its
/// root field set.
pub trait FormatParser {
    fn tags() -> ParserTags
    where
        Self: Sized;

    fn root_endian() -> Endian
    where
        Self: Sized;

    /// Build the root producer. Called once, when a stream is about to be
    /// opened as this format.
    fn root_producer(stream: &InputStream) -> Box<dyn Producer>
    where
        Self: Sized;

    /// Cheap structural sanity check, run against a handful of fields
    /// pulled from the root before a caller commits to this format (see
    /// `open`). Should reject with [`CoreError::Match`] rather than pull
    /// more of the stream than it needs to decide.
    fn validate(tree: &mut FieldTree) -> Result<()>
    where
        Self: Sized;
}

/// Open `stream` as format `P`, running its cheap validation before
/// returning the (still mostly unfed) tree.
pub fn open<P: FormatParser>(stream: InputStream, options: ParserOptions) -> Result<FieldTree> {
    let tags = P::tags();
    if let Some(min) = tags.min_size_bits {
        if !stream.size_ge(min) {
            return Err(CoreError::match_error(format!("{}: stream smaller than the minimum {min} bits", tags.id)));
        }
    }
    let endian = P::root_endian();
    let producer = P::root_producer(&stream);
    let mut tree = FieldTree::new(stream, options, tags.id, Some(tags.description.to_string()), endian, producer, None);
    P::validate(&mut tree)?;
    Ok(tree)
}
