//! Black-box scenario: a bare Sun/NeXT `.au` header with no `info` text,
//! opened through [`fieldscope::parser::open`] rather than any in-module
//! helper, the way a real consumer would.

#![cfg(feature = "au")]

use fieldscope::formats::au::AuFile;
use fieldscope::{parser, Endian, InputStream, ParserOptions};

fn sample() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b".snd");
    bytes.extend_from_slice(&24u32.to_be_bytes()); // data_ofs: header is exactly 24 bytes, no info
    bytes.extend_from_slice(&4u32.to_be_bytes()); // data_size
    bytes.extend_from_slice(&2u32.to_be_bytes()); // codec: 8-bit linear PCM
    bytes.extend_from_slice(&44100u32.to_be_bytes());
    bytes.extend_from_slice(&2u32.to_be_bytes()); // channels
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    bytes
}

#[test]
fn opens_and_exposes_every_header_field_by_path() {
    let stream = InputStream::from_bytes(sample(), Endian::Big, "scenario.au");
    let mut tree = parser::open::<AuFile>(stream, ParserOptions::default()).unwrap();
    let root = tree.root();
    tree.feed_all(root).unwrap();

    assert_eq!(tree.value_of(root, "signature").unwrap().as_str(), Some(".snd"));
    assert_eq!(tree.value_of(root, "sample_rate").unwrap().as_u64(), Some(44100));

    let audio = tree.resolve(root, "audio_data").unwrap();
    assert_eq!(tree.size_bits(audio), 4 * 8);
    assert_eq!(tree.value(audio).unwrap().as_bytes(), Some([1u8, 2, 3, 4].as_slice()));

    // No info field fit between data_ofs and the header end, so it must
    // not appear at all.
    assert!(tree.resolve(root, "info").is_err());
}

#[test]
fn rejects_a_stream_too_small_to_hold_a_header() {
    let stream = InputStream::from_bytes(vec![0u8; 4], Endian::Big, "tiny.au");
    assert!(parser::open::<AuFile>(stream, ParserOptions::default()).is_err());
}
