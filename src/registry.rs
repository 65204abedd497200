//! Format detection and dispatch.
//!
//! Generalizes the teacher's layered `detect_file_format_from_bytes` (quick
//! signature byte, then a per-family detail check) into a config-driven
//! list of [`ParserTags`] plus a `validate` hook, rather than a fixed enum
//! of Office formats: each registered format scores candidacy on extension,
//! MIME, magic bytes and minimum size, the way spec's `guess_parser`
//! describes, and the highest-scoring candidates get their `validate()`
//! called in turn until one accepts.

use once_cell::sync::Lazy;

use crate::config::ParserOptions;
use crate::error::{CoreError, Result};
use crate::parser::{self, FormatParser, ParserTags};
use crate::stream::InputStream;
use crate::tree::FieldTree;

/// One registered format: its static tags plus a type-erased `open`.
pub struct ParserDescriptor {
    pub tags: ParserTags,
    open: fn(InputStream, ParserOptions) -> Result<FieldTree>,
}

impl ParserDescriptor {
    pub fn of<P: FormatParser>() -> Self {
        ParserDescriptor { tags: P::tags(), open: parser::open::<P> }
    }
}

/// Hints a caller may already know about the stream (e.g. a file's
/// extension, or an HTTP `Content-Type`), narrowing the candidate order
/// before any format-specific bytes are read.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessHints<'a> {
    pub file_ext: Option<&'a str>,
    pub mime: Option<&'a str>,
}

fn magic_matches(tags: &ParserTags, stream: &InputStream) -> bool {
    if tags.magic.is_empty() {
        return true;
    }
    tags.magic.iter().any(|(pattern, bit_offset)| {
        stream
            .read_bytes(*bit_offset, pattern.len() as u64)
            .map(|bytes| bytes == *pattern)
            .unwrap_or(false)
    })
}

/// Score used only to order candidates before the (authoritative) magic +
/// size filter and `validate()` call below; higher sorts first.
fn rank(tags: &ParserTags, hints: GuessHints) -> u32 {
    let mut score = 0;
    if let Some(ext) = hints.file_ext {
        if tags.file_ext.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            score += 4;
        }
    }
    if let Some(mime) = hints.mime {
        if tags.mime.iter().any(|m| m.eq_ignore_ascii_case(mime)) {
            score += 2;
        }
    }
    score
}

/// A collection of registered formats, tried in priority order until one
/// both passes the magic/size filter and accepts `validate()`.
#[derive(Default)]
pub struct ParserRegistry {
    descriptors: Vec<ParserDescriptor>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry::default()
    }

    pub fn register(&mut self, descriptor: ParserDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[ParserDescriptor] {
        &self.descriptors
    }

    /// Try every registered format against `stream` in descending score
    /// order, filtering first on minimum size and magic bytes (cheap),
    /// then calling `validate()` (format-defined, may pull a few fields).
    /// Fails [`CoreError::Match`] naming every candidate tried if none
    /// accepts.
    pub fn guess(&self, stream: InputStream, options: ParserOptions, hints: GuessHints) -> Result<FieldTree> {
        let mut candidates: Vec<&ParserDescriptor> = self.descriptors.iter().collect();
        candidates.sort_by_key(|d| std::cmp::Reverse(rank(&d.tags, hints)));

        let mut tried = Vec::new();
        for descriptor in candidates {
            if let Some(min) = descriptor.tags.min_size_bits {
                if !stream.size_ge(min) {
                    continue;
                }
            }
            if !magic_matches(&descriptor.tags, &stream) {
                continue;
            }
            tried.push(descriptor.tags.id);
            match (descriptor.open)(stream.clone(), options) {
                Ok(tree) => return Ok(tree),
                Err(_) => continue,
            }
        }
        if tried.is_empty() {
            Err(CoreError::match_error("no registered parser's magic/size matched this stream"))
        } else {
            Err(CoreError::match_error(format!("no parser accepted this stream (tried: {})", tried.join(", "))))
        }
    }
}

/// The compile-time list of formats carried by this crate's own feature
/// flags (spec §1 treats concrete formats as external, optional
/// collaborators; each lives behind its own feature and the core compiles
/// with none of them enabled).
static DEFAULT_REGISTRY: Lazy<ParserRegistry> = Lazy::new(|| {
    let mut registry = ParserRegistry::new();
    #[cfg(feature = "au")]
    registry.register(ParserDescriptor::of::<crate::formats::au::AuFile>());
    #[cfg(feature = "ar")]
    registry.register(ParserDescriptor::of::<crate::formats::ar::ArchiveFile>());
    #[cfg(feature = "jpeg")]
    registry.register(ParserDescriptor::of::<crate::formats::jpeg::JpegFile>());
    registry
});

pub fn default_registry() -> &'static ParserRegistry {
    &DEFAULT_REGISTRY
}

/// Guess and open a parser for `stream` using the crate's default,
/// feature-gated registry.
pub fn guess_parser(stream: InputStream, options: ParserOptions, hints: GuessHints) -> Result<FieldTree> {
    DEFAULT_REGISTRY.guess(stream, options, hints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endian;

    #[test]
    fn empty_stream_fails_match() {
        let stream = InputStream::from_bytes(Vec::new(), Endian::Big, "empty");
        let err = guess_parser(stream, ParserOptions::default(), GuessHints::default()).unwrap_err();
        assert!(matches!(err, CoreError::Match { .. }));
    }
}
