//! Sun/NeXT `.au` audio header, grounded in `hachoir_parser`'s
//! `audio/au.py`: a fixed six-field header (signature, data offset, data
//! size, codec, sample rate, channel count), an optional free-text `info`
//! field filling whatever gap remains before `data_ofs`, then the raw
//! audio payload. The header never declares its own total size; like the
//! original, this core's bookkeeping falls out of summing the fields as
//! they're produced rather than an explicit `createContentSize` override.

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::field::{Charset, LeafKind};
use crate::parser::{FormatParser, ParserTags};
use crate::producer::{FieldSpec, Producer};
use crate::stream::InputStream;
use crate::tree::{FieldLocation, FieldSetId, FieldTree};

/// `CODEC_INFO`'s name column, keyed by the `codec` field's raw value.
static CODEC_NAME: phf::Map<u64, &'static str> = phf::phf_map! {
    1u64 => "8-bit ISDN u-law",
    2u64 => "8-bit linear PCM",
    3u64 => "16-bit linear PCM",
    4u64 => "24-bit linear PCM",
    5u64 => "32-bit linear PCM",
    6u64 => "32-bit IEEE floating point",
    7u64 => "64-bit IEEE floating point",
    8u64 => "Fragmented sample data",
    9u64 => "DSP program",
    10u64 => "8-bit fixed point",
    11u64 => "16-bit fixed point",
    12u64 => "24-bit fixed point",
    13u64 => "32-bit fixed point",
    18u64 => "16-bit linear with emphasis",
    19u64 => "16-bit linear compressed",
    20u64 => "16-bit linear with emphasis and compression",
    21u64 => "Music kit DSP commands",
    23u64 => "4-bit ISDN u-law compressed (CCITT G.721 ADPCM)",
    24u64 => "ITU-T G.722 ADPCM",
    25u64 => "ITU-T G.723 3-bit ADPCM",
    26u64 => "ITU-T G.723 5-bit ADPCM",
    27u64 => "8-bit ISDN A-law",
};

fn audio_data_field(tree: &FieldTree, set: FieldSetId) -> Result<FieldSpec> {
    let data_size = tree.value_of_ready(set, "data_size")?.as_u64().unwrap_or(0) as u32;
    Ok(FieldSpec::leaf("audio_data", LeafKind::RawBytes(data_size)).with_description("Audio data"))
}

struct AuProducer;

impl Producer for AuProducer {
    fn next(&mut self, tree: &FieldTree, set: FieldSetId) -> Result<Option<FieldSpec>> {
        let len = tree.len(set);
        Ok(match len {
            0 => Some(
                FieldSpec::leaf("signature", LeafKind::StringFixed { nbytes: 4, charset: Charset::Ascii, strip: None })
                    .with_description("Format signature (\".snd\")"),
            ),
            1 => Some(FieldSpec::leaf("data_ofs", LeafKind::UInt32).with_description("Data offset")),
            2 => Some(FieldSpec::leaf("data_size", LeafKind::UInt32).with_description("Data size")),
            3 => Some(
                FieldSpec::leaf("codec", LeafKind::Enum { inner: Box::new(LeafKind::UInt32), mapping: &CODEC_NAME })
                    .with_description("Audio codec"),
            ),
            4 => Some(FieldSpec::leaf("sample_rate", LeafKind::UInt32).with_description("Number of samples/second")),
            5 => Some(FieldSpec::leaf("channels", LeafKind::UInt32).with_description("Number of interleaved channels")),
            6 => {
                let data_ofs = tree.value_of_ready(set, "data_ofs")?.as_u64().unwrap_or(0);
                let consumed_bytes = tree.current_size(set) / 8;
                if data_ofs > consumed_bytes {
                    let info_len = (data_ofs - consumed_bytes) as u32;
                    Some(
                        FieldSpec::leaf(
                            "info",
                            LeafKind::StringFixed { nbytes: info_len, charset: Charset::Ascii, strip: Some(vec![b' ', 0]) },
                        )
                        .with_description("Information"),
                    )
                } else {
                    Some(audio_data_field(tree, set)?)
                }
            }
            7 => {
                let name_at_6 = tree.name(FieldLocation::Child { parent: set, index: 6 });
                if name_at_6 == "info" { Some(audio_data_field(tree, set)?) } else { None }
            }
            _ => None,
        })
    }
}

pub struct AuFile;

impl FormatParser for AuFile {
    fn tags() -> ParserTags {
        ParserTags {
            id: "au",
            name: "Sun/NeXT audio",
            file_ext: &["au", "snd"],
            mime: &["audio/basic"],
            magic: &[(b".snd", 0)],
            min_size_bits: Some(24 * 8),
            description: "Sun/NeXT audio",
        }
    }

    fn root_endian() -> Endian {
        Endian::Big
    }

    fn root_producer(_stream: &InputStream) -> Box<dyn Producer> {
        Box::new(AuProducer)
    }

    fn validate(tree: &mut FieldTree) -> Result<()> {
        let root = tree.root();
        tree.read_first_fields(root, 6)?;
        let signature = tree.value_of(root, "signature")?;
        if signature.as_str() != Some(".snd") {
            return Err(CoreError::match_error("au: wrong file signature"));
        }
        let channels = tree.value_of(root, "channels")?.as_u64().unwrap_or(0);
        if channels != 1 && channels != 2 {
            return Err(CoreError::match_error("au: invalid number of channels"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserOptions;
    use crate::parser;

    fn sample_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b".snd");
        bytes.extend_from_slice(&24u32.to_be_bytes()); // data_ofs
        bytes.extend_from_slice(&32u32.to_be_bytes()); // data_size
        bytes.extend_from_slice(&1u32.to_be_bytes()); // codec
        bytes.extend_from_slice(&8000u32.to_be_bytes()); // sample_rate
        bytes.extend_from_slice(&1u32.to_be_bytes()); // channels
        bytes.extend(std::iter::repeat(0xAAu8).take(32)); // audio_data
        bytes
    }

    #[test]
    fn header_fields_match_the_sample() {
        let stream = InputStream::from_bytes(sample_bytes(), Endian::Big, "test.au");
        let mut tree = parser::open::<AuFile>(stream, ParserOptions::default()).unwrap();
        let root = tree.root();
        tree.feed_all(root).unwrap();

        assert_eq!(tree.value_of(root, "signature").unwrap().as_str(), Some(".snd"));
        assert_eq!(tree.value_of(root, "data_ofs").unwrap().as_u64(), Some(24));
        assert_eq!(tree.value_of(root, "data_size").unwrap().as_u64(), Some(32));
        assert_eq!(tree.value_of(root, "sample_rate").unwrap().as_u64(), Some(8000));
        assert_eq!(tree.value_of(root, "channels").unwrap().as_u64(), Some(1));

        let codec_loc = tree.resolve(root, "codec").unwrap();
        assert_eq!(tree.display(codec_loc).unwrap(), "8-bit ISDN u-law");
        assert_eq!(tree.current_size(root), (24 + 32) * 8);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut bytes = sample_bytes();
        bytes[0] = b'x';
        let stream = InputStream::from_bytes(bytes, Endian::Big, "test.au");
        assert!(parser::open::<AuFile>(stream, ParserOptions::default()).is_err());
    }
}
