//! JPEG chunk walker, grounded in `hachoir_parser`'s `image/jpeg.py`:
//! a JPEG file is a sequence of `0xFF`-tagged chunks (SOI, APP0/JFIF, the
//! quantization/Huffman tables, SOF, SOS, EOI). This module implements the
//! chunk shell spec §8 scenario (d) exercises — SOI, a parsed APP0/JFIF
//! body, and a DQT chunk's bytes left opaque — and stops at the first SOS
//! marker rather than walking entropy-coded scan data, per this crate's
//! "rendering pixels" non-goal.

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::field::{Charset, LeafKind};
use crate::parser::{FormatParser, ParserTags};
use crate::producer::{FieldSpec, Producer, StepProducer};
use crate::stream::InputStream;
use crate::tree::{FieldLocation, FieldSetId, FieldTree};

const TAG_SOI: u64 = 0xD8;
const TAG_EOI: u64 = 0xD9;
const TAG_SOS: u64 = 0xDA;
const TAG_APP0: u64 = 0xE0;

static CHUNK_TYPE_NAME: phf::Map<u64, &'static str> = phf::phf_map! {
    0xC0u64 => "Start Of Frame 0 (SOF0)",
    0xC4u64 => "Define Huffman Table (DHT)",
    0xD8u64 => "Start of image (SOI)",
    0xD9u64 => "End of image (EOI)",
    0xDAu64 => "Start Of Scan (SOS)",
    0xDBu64 => "Define Quantization Table (DQT)",
    0xDCu64 => "Define number of Lines (DNL)",
    0xDDu64 => "Define Restart Interval (DRI)",
    0xE0u64 => "APP0",
    0xEDu64 => "Photoshop marker",
    0xFEu64 => "Comment",
};

fn app0_producer() -> Box<dyn Producer> {
    Box::new(StepProducer::new(|tree: &FieldTree, set: FieldSetId, step: u32| {
        Ok(match step {
            0 => Some(
                FieldSpec::leaf("jfif", LeafKind::StringFixed { nbytes: 5, charset: Charset::Ascii, strip: None })
                    .with_description("JFIF string"),
            ),
            1 => {
                let jfif = tree.value_of_ready(set, "jfif")?;
                if jfif.as_str() != Some("JFIF\0") {
                    return Err(CoreError::parser(
                        tree.path(FieldLocation::Set(set)),
                        "Stream doesn't look like a JPEG chunk (wrong JFIF signature)",
                    ));
                }
                Some(FieldSpec::leaf("ver_maj", LeafKind::UInt8).with_description("Major version"))
            }
            2 => Some(FieldSpec::leaf("ver_min", LeafKind::UInt8).with_description("Minor version")),
            3 => Some(
                FieldSpec::leaf("units", LeafKind::UInt8).with_description("Units"),
            ),
            4 => {
                let units = tree.value_of_ready(set, "units")?.as_u64().unwrap_or(0);
                if units == 0 {
                    Some(FieldSpec::leaf("aspect_x", LeafKind::UInt16).with_description("Aspect ratio (X)"))
                } else {
                    Some(FieldSpec::leaf("x_density", LeafKind::UInt16).with_description("X density"))
                }
            }
            5 => {
                let units = tree.value_of_ready(set, "units")?.as_u64().unwrap_or(0);
                if units == 0 {
                    Some(FieldSpec::leaf("aspect_y", LeafKind::UInt16).with_description("Aspect ratio (Y)"))
                } else {
                    Some(FieldSpec::leaf("y_density", LeafKind::UInt16).with_description("Y density"))
                }
            }
            6 => Some(FieldSpec::leaf("thumb_w", LeafKind::UInt8).with_description("Thumbnail width")),
            7 => Some(FieldSpec::leaf("thumb_h", LeafKind::UInt8).with_description("Thumbnail height")),
            8 => {
                let w = tree.value_of_ready(set, "thumb_w")?.as_u64().unwrap_or(0);
                let h = tree.value_of_ready(set, "thumb_h")?.as_u64().unwrap_or(0);
                let thumb_size = w * h * 3; // uncompressed 24-bit RGB thumbnail
                if thumb_size > 0 {
                    Some(FieldSpec::leaf("thumb_data", LeafKind::RawBytes(thumb_size as u32)).with_description("Thumbnail data"))
                } else {
                    None
                }
            }
            _ => None,
        })
    }))
}

/// One `0xFF`-tagged chunk: header byte, type, and (except for SOI/EOI) a
/// 16-bit size and a tag-dependent content. APP0 gets a parsed body; every
/// other non-empty content is left as opaque bytes (spec §1's "rendering
/// pixels" non-goal covers any further structural decode, e.g. DQT's
/// coefficient tables).
struct JpegChunkProducer;

impl Producer for JpegChunkProducer {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        match tree.len(set) {
            0 => Ok(Some(FieldSpec::leaf("header", LeafKind::UInt8).with_description("Header"))),
            1 => {
                let header = tree.value_of_ready(set, "header")?.as_u64().unwrap_or(0);
                if header != 0xFF {
                    return Err(CoreError::parser(tree.path(FieldLocation::Set(set)), "JPEG: invalid chunk header"));
                }
                Ok(Some(
                    FieldSpec::leaf("type", LeafKind::Enum { inner: Box::new(LeafKind::UInt8), mapping: &CHUNK_TYPE_NAME })
                        .with_description("Type"),
                ))
            }
            2 => {
                let tag = tree.value_of_ready(set, "type")?.as_u64().unwrap_or(0);
                if tag == TAG_SOI || tag == TAG_EOI {
                    Ok(None)
                } else {
                    Ok(Some(FieldSpec::leaf("size", LeafKind::UInt16).with_description("Size")))
                }
            }
            3 => {
                let size = tree.value_of_ready(set, "size")?.as_u64().unwrap_or(0);
                let content_size = size.saturating_sub(2);
                if content_size == 0 {
                    return Ok(None);
                }
                let tag = tree.value_of_ready(set, "type")?.as_u64().unwrap_or(0);
                let spec = if tag == TAG_APP0 {
                    FieldSpec::set("content", app0_producer(), Some(content_size * 8))
                } else {
                    FieldSpec::leaf("content", LeafKind::RawBytes(content_size as u32))
                };
                Ok(Some(spec.with_description("Chunk content")))
            }
            _ => Ok(None),
        }
    }
}

struct JpegRootProducer;

impl Producer for JpegRootProducer {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        if tree.eof(set) {
            return Ok(None);
        }
        let len = tree.len(set);
        if len > 0 {
            let prev_chunk = tree
                .child_set_ready(set, &format!("chunk[{}]", len - 1))
                .expect("the previous chunk[] was just fully fed");
            let prev_tag = tree.value_of_ready(prev_chunk, "type")?.as_u64().unwrap_or(0);
            if prev_tag == TAG_SOS {
                return Ok(None);
            }
        }
        Ok(Some(FieldSpec::set("chunk[]", Box::new(JpegChunkProducer), None)))
    }
}

pub struct JpegFile;

impl FormatParser for JpegFile {
    fn tags() -> ParserTags {
        ParserTags {
            id: "jpeg",
            name: "JPEG picture",
            file_ext: &["jpg", "jpeg"],
            mime: &["image/jpeg"],
            magic: &[(b"\xFF\xD8\xFF\xE0", 0), (b"\xFF\xD8\xFF\xE1", 0)],
            min_size_bits: Some(22 * 8),
            description: "JPEG picture",
        }
    }

    fn root_endian() -> Endian {
        Endian::Big
    }

    fn root_producer(_stream: &InputStream) -> Box<dyn Producer> {
        Box::new(JpegRootProducer)
    }

    fn validate(tree: &mut FieldTree) -> Result<()> {
        let root = tree.root();
        if tree.stream().read_bytes(0, 2)? != [0xFF, 0xD8] {
            return Err(CoreError::match_error("jpeg: invalid file signature"));
        }
        tree.read_first_fields(root, 3).map_err(|_| CoreError::match_error("jpeg: unable to parse at least three chunks"))?;
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
        let mut bytes = vec![0xFF, 0xD8]; // SOI
        // APP0 / JFIF, size = 2 (size field) + 14 (body) = 16
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(b"JFIF\0");
        bytes.extend_from_slice(&[0x01, 0x01]); // ver_maj, ver_min
        bytes.push(0x00); // units = 0 (aspect ratio)
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // aspect_x, aspect_y
        bytes.extend_from_slice(&[0x00, 0x00]); // thumb_w, thumb_h
        // DQT, size = 2 + 2 (two opaque bytes of table data)
        bytes.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x04, 0xAA, 0xBB]);
        bytes
    }

    #[test]
    fn chunk_walk_matches_the_scenario() {
        let stream = InputStream::from_bytes(sample_bytes(), Endian::Big, "test.jpg");
        let mut tree = parser::open::<JpegFile>(stream, ParserOptions::default()).unwrap();
        let root = tree.root();
        tree.feed_all(root).unwrap();

        let chunk0 = match tree.resolve(root, "chunk[0]").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        assert_eq!(tree.value_of(chunk0, "type").unwrap().as_u64(), Some(TAG_SOI));

        let chunk1 = match tree.resolve(root, "chunk[1]").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        assert_eq!(tree.value_of(chunk1, "type").unwrap().as_u64(), Some(TAG_APP0));
        let app0 = tree.child_set_ready(chunk1, "content").unwrap();
        assert_eq!(tree.value_of(app0, "jfif").unwrap().as_str(), Some("JFIF\0"));

        let chunk2 = match tree.resolve(root, "chunk[2]").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        assert_eq!(tree.value_of(chunk2, "type").unwrap().as_u64(), Some(0xDB));
    }
}
