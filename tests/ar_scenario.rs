//! Black-box scenario: a two-entry Unix `ar` archive, exercising sibling
//! entries and the same header/content split as the single-entry unit
//! test inside the format module, but driven only through public API.

#![cfg(feature = "ar")]

use fieldscope::formats::ar::ArchiveFile;
use fieldscope::{parser, Endian, FieldLocation, InputStream, ParserOptions};

fn entry(name: &str, content: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(format!("{:<16}", name).as_bytes());
    bytes.extend_from_slice(format!("{:<12}", 0).as_bytes());
    bytes.extend_from_slice(format!("{:<6}", 0).as_bytes());
    bytes.extend_from_slice(format!("{:<6}", 0).as_bytes());
    bytes.extend_from_slice(format!("{:<8}", "100644").as_bytes());
    bytes.extend_from_slice(format!("{:<10}", content.len()).as_bytes());
    bytes.extend_from_slice(&[0x60, 0x0A]);
    bytes.extend_from_slice(content);
    bytes
}

fn sample() -> Vec<u8> {
    let mut bytes = b"!<arch>\n".to_vec();
    bytes.extend(entry("a.txt", b"first!!"));
    bytes.extend(entry("b.txt", b"second payload"));
    bytes
}

#[test]
fn walks_two_sibling_entries_by_array_index() {
    let stream = InputStream::from_bytes(sample(), Endian::Big, "scenario.a");
    let mut tree = parser::open::<ArchiveFile>(stream, ParserOptions::default()).unwrap();
    let root = tree.root();
    let entries = tree.array(root, "file").unwrap();
    assert_eq!(entries.len(), 2);

    for (loc, (name, content)) in entries.iter().zip([("a.txt", b"first!!".as_slice()), ("b.txt", b"second payload")]) {
        let set = match loc {
            FieldLocation::Set(id) => *id,
            _ => panic!("file[] entries are field sets"),
        };
        let header = match tree.resolve(set, "header").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("header is a field set"),
        };
        assert_eq!(tree.value_of(header, "name").unwrap().as_str(), Some(name));
        let content_loc = tree.resolve(set, "content").unwrap();
        assert_eq!(tree.value(content_loc).unwrap().as_bytes(), Some(content));
    }
}
