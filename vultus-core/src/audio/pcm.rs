//! PCM16 ⇄ f32 conversion and wire byte layout.
//!
//! The scaling is intentionally asymmetric: negative samples scale by 32768,
//! non-negative by 32767. This uses the full i16 range and matches the
//! service's reference encoder bit-for-bit, so it must not be "fixed" to a
//! symmetric scale. The inverse divides by 32768, which makes the round
//! trip approximate for positive values (within one quantisation step).

/// Convert device-native f32 samples in [-1, 1] to wire i16 samples.
///
/// Out-of-range input is clamped first; the conversion itself cannot fail.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32_768.0) as i16
            } else {
                (s * 32_767.0) as i16
            }
        })
        .collect()
}

/// Convert wire i16 samples back to f32 in [-1, 1).
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32_768.0).collect()
}

/// Serialise i16 samples as little-endian bytes (outbound frame payload).
pub fn i16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Parse little-endian bytes as i16 samples.
///
/// An odd trailing byte (truncated network read) is ignored rather than
/// treated as an error — one clipped sample must not break the stream.
pub fn le_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_is_exact() {
        assert_eq!(f32_to_i16(&[0.0]), vec![0]);
        assert_eq!(i16_to_f32(&[0]), vec![0.0]);
    }

    #[test]
    fn full_scale_is_asymmetric() {
        let encoded = f32_to_i16(&[1.0, -1.0]);
        assert_eq!(encoded, vec![32_767, -32_768]);

        let decoded = i16_to_f32(&encoded);
        // +1.0 maps to 32767/32768, not back to exactly 1.0 — by contract.
        assert_abs_diff_eq!(decoded[0], 32_767.0 / 32_768.0, epsilon = 1e-7);
        assert_abs_diff_eq!(decoded[1], -1.0, epsilon = 1e-7);
    }

    #[test]
    fn out_of_range_input_clamps() {
        assert_eq!(f32_to_i16(&[2.5, -3.0]), vec![32_767, -32_768]);
    }

    #[test]
    fn round_trip_within_quantisation_error() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 500.0) - 1.0).collect();
        let decoded = i16_to_f32(&f32_to_i16(&samples));
        for (orig, round) in samples.iter().zip(&decoded) {
            // Truncating encode plus the 32767/32768 scale mismatch costs
            // up to two quantisation steps near full scale.
            assert!(
                (orig - round).abs() <= 2.0 / 32_768.0 + f32::EPSILON,
                "orig={orig} round={round}"
            );
        }
    }

    #[test]
    fn byte_layout_is_little_endian() {
        let bytes = i16_to_le_bytes(&[0x1234, -1]);
        assert_eq!(bytes, vec![0x34, 0x12, 0xFF, 0xFF]);
        assert_eq!(le_bytes_to_i16(&bytes), vec![0x1234, -1]);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        assert_eq!(le_bytes_to_i16(&[0x00, 0x01, 0xAB]), vec![256]);
    }
}
