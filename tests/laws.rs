//! Property tests for the quantified invariants and laws every field set
//! must hold regardless of format: child contiguity, idempotent reset, and
//! path canonicalisation. Driven against the `ar` format because its file
//! entries are a simple, arbitrary-length sequence of sibling sets — any
//! producer that honors the [`fieldscope::producer::Producer`] contract
//! would do, this one is just convenient and already in-tree.

#![cfg(feature = "ar")]

use fieldscope::formats::ar::ArchiveFile;
use fieldscope::{parser, Endian, FieldLocation, InputStream, ParserOptions};
use proptest::prelude::*;

fn pad(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

fn entry_bytes(name: &str, content: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(pad(name, 16).as_bytes());
    bytes.extend_from_slice(pad("0", 12).as_bytes());
    bytes.extend_from_slice(pad("0", 6).as_bytes());
    bytes.extend_from_slice(pad("0", 6).as_bytes());
    bytes.extend_from_slice(pad("100644", 8).as_bytes());
    bytes.extend_from_slice(pad(&content.len().to_string(), 10).as_bytes());
    bytes.extend_from_slice(&[0x60, 0x0A]);
    bytes.extend_from_slice(content);
    bytes
}

fn archive_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut bytes = b"!<arch>\n".to_vec();
    for (name, content) in entries {
        bytes.extend(entry_bytes(name, content));
    }
    bytes
}

/// 1..15 printable-ASCII-no-space chars, paired with 0..40 content bytes —
/// small enough that the fixed-width name/size header fields never
/// overflow their column.
fn entries_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::vec(("[a-zA-Z0-9_.]{1,15}", prop::collection::vec(any::<u8>(), 0..40)), 1..6)
}

proptest! {
    #[test]
    fn child_addresses_are_contiguous_from_zero(entries in entries_strategy()) {
        let stream = InputStream::from_bytes(archive_bytes(&entries), Endian::Big, "prop.a");
        let mut tree = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
        let root = tree.root();
        tree.feed_all(root).unwrap();

        let mut cursor = 0u64;
        for i in 0..tree.len(root) {
            let loc = FieldLocation::Child { parent: root, index: i };
            prop_assert_eq!(tree.address(loc), cursor);
            cursor += tree.size_bits(loc);
        }
        prop_assert_eq!(cursor, tree.current_size(root));
    }

    #[test]
    fn reset_then_refeed_is_idempotent(entries in entries_strategy()) {
        let bytes = archive_bytes(&entries);

        let stream = InputStream::from_bytes(bytes.clone(), Endian::Big, "prop.a");
        let mut first = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
        let root = first.root();
        first.feed_all(root).unwrap();
        first.reset(root);
        first.feed_all(root).unwrap();

        let stream = InputStream::from_bytes(bytes, Endian::Big, "prop.a");
        let mut second = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
        let root2 = second.root();
        second.feed_all(root2).unwrap();

        prop_assert_eq!(first.len(root), second.len(root2));
        for i in 0..first.len(root) {
            let a = FieldLocation::Child { parent: root, index: i };
            let b = FieldLocation::Child { parent: root2, index: i };
            prop_assert_eq!(first.name(a), second.name(b));
            prop_assert_eq!(first.address(a), second.address(b));
            prop_assert_eq!(first.size_bits(a), second.size_bits(b));
        }
    }

    #[test]
    fn path_lookup_canonicalises_slashes_and_dotdot(entries in entries_strategy()) {
        let stream = InputStream::from_bytes(archive_bytes(&entries), Endian::Big, "prop.a");
        let mut tree = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
        let root = tree.root();
        tree.feed_all(root).unwrap();

        let direct = tree.resolve(root, "file[0]").unwrap();
        let anchored = tree.resolve(root, "/file[0]").unwrap();
        prop_assert_eq!(direct, anchored);

        let file0 = match direct {
            FieldLocation::Set(id) => id,
            _ => panic!("file[0] is a field set"),
        };
        let roundtrip = tree.resolve(file0, "../file[0]").unwrap();
        prop_assert_eq!(roundtrip, direct);
    }
}
