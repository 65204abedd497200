//! Extended-precision (80-bit) float as a three-field composite.
//!
//! `Float32`/`Float64` are direct stream reads ([`crate::field::LeafKind`]
//! handles both); the 80-bit extended format used by some audio/font
//! containers has no native Rust or hardware representation, so it's built
//! the way `hachoir_parser`'s `field/float.py` `FloatX80` factory does it:
//! a sign bit, a 15-bit biased exponent, and a 64-bit mantissa with an
//! *explicit* integer bit (unlike binary32/64's implicit leading one),
//! exposed as three sibling leaves under one field set rather than as a
//! single opaque value.

use crate::endian::Endian;
use crate::error::Result;
use crate::field::LeafKind;
use crate::producer::{FieldSpec, Producer, StepProducer};
use crate::tree::{FieldSetId, FieldTree};

/// A `FieldSpec` for an 80-bit extended float composite named `name`:
/// children `sign` (1 bit), `exponent` (15 bits), `mantissa` (64 bits).
pub fn float80(name: impl Into<String>) -> FieldSpec {
    let producer: Box<dyn Producer> = Box::new(StepProducer::new(
        |_tree: &FieldTree, _set: FieldSetId, step: u32| {
            Ok(match step {
                0 => Some(FieldSpec::leaf("sign", LeafKind::Bit)),
                1 => Some(FieldSpec::leaf("exponent", LeafKind::Bits(15))),
                2 => Some(FieldSpec::leaf("mantissa", LeafKind::UInt64)),
                _ => None,
            })
        },
    ));
    FieldSpec::set(name, producer, Some(80))
}

/// Reconstruct the `f64` approximation of an already-materialized
/// [`float80`] field set's value from its three sub-fields.
pub fn decode_float80(tree: &mut FieldTree, set: FieldSetId) -> Result<f64> {
    tree.feed_all(set)?;
    let sign = tree.value_of(set, "sign")?.as_u64().unwrap_or(0);
    let exponent = tree.value_of(set, "exponent")?.as_u64().unwrap_or(0);
    let mantissa = tree.value_of(set, "mantissa")?.as_u64().unwrap_or(0);

    if exponent == 0 && mantissa == 0 {
        return Ok(if sign == 1 { -0.0 } else { 0.0 });
    }
    // Explicit integer bit: significand is mantissa / 2^63, not 1.mantissa.
    let significand = mantissa as f64 / (1u64 << 63) as f64;
    let unbiased_exponent = exponent as i32 - 16383;
    let magnitude = significand * 2f64.powi(unbiased_exponent);
    Ok(if sign == 1 { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserOptions;
    use crate::stream::InputStream;
    use crate::tree::FieldLocation;

    #[test]
    fn float80_one_point_zero_round_trips() {
        // sign=0, exponent=16383 (bias), mantissa=1<<63 (explicit integer bit set, no fraction) => 1.0
        let bytes = vec![0x3f, 0xff, 0x80, 0, 0, 0, 0, 0, 0, 0];
        let stream = InputStream::from_bytes(bytes, Endian::Big, "test");
        let options = ParserOptions::default();
        let root_producer: Box<dyn Producer> = Box::new(StepProducer::new(|_tree: &FieldTree, _set, step| {
            Ok(match step {
                0 => Some(float80("value")),
                _ => None,
            })
        }));
        let mut tree = FieldTree::new(stream, options, "root", None, Endian::Big, root_producer, None);
        let root = tree.root();
        tree.feed_all(root).unwrap();
        let set_id = match tree.resolve(root, "value").unwrap() {
            FieldLocation::Set(id) => id,
            _ => panic!("expected a field set"),
        };
        let value = decode_float80(&mut tree, set_id).unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }
}
