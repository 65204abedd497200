//! Black-box scenario: SOI, an APP0/JFIF chunk, SOS, then entropy-coded
//! scan bytes the crate must never attempt to interpret (the "rendering
//! pixels" non-goal) — checks the walk stops right after SOS.

#![cfg(feature = "jpeg")]

use fieldscope::formats::jpeg::JpegFile;
use fieldscope::{parser, Endian, FieldLocation, InputStream, ParserOptions};

fn sample() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8]; // SOI
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]); // APP0, size 16
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[0x01, 0x02]); // ver_maj, ver_min
    bytes.push(0x01); // units = 1 (density, not aspect ratio)
    bytes.extend_from_slice(&[0x00, 0x48, 0x00, 0x48]); // x_density, y_density
    bytes.extend_from_slice(&[0x00, 0x00]); // thumb_w, thumb_h = 0 (no thumbnail)
    bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]); // SOS, zero-length content
    bytes.extend_from_slice(&[0x12, 0x34, 0x56]); // scan data the walk must not touch
    bytes
}

#[test]
fn stops_at_sos_and_leaves_scan_bytes_unread() {
    let stream = InputStream::from_bytes(sample(), Endian::Big, "scenario.jpg");
    let mut tree = parser::open::<JpegFile>(stream, ParserOptions::default()).unwrap();
    let root = tree.root();
    tree.feed_all(root).unwrap();

    let chunks = tree.array(root, "chunk").unwrap();
    assert_eq!(chunks.len(), 3, "SOI, APP0, SOS — and no fourth chunk for the scan bytes");

    let app0 = match chunks[1] {
        FieldLocation::Set(id) => id,
        _ => panic!("chunk[1] is a field set"),
    };
    let content = tree.child_set_ready(app0, "content").unwrap();
    assert_eq!(tree.value_of(content, "units").unwrap().as_u64(), Some(1));
    assert_eq!(tree.value_of(content, "x_density").unwrap().as_u64(), Some(0x48));
    assert!(tree.resolve(content, "thumb_data").is_err(), "zero-size thumbnail must not produce a field");
}
