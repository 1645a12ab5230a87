//! PCM16 quantization and base64 framing for the wire
//!
//! The upstream provider expects little-endian 16-bit signed PCM carried as
//! base64 text inside `input_audio_buffer.append` messages.

use base64::Engine;

/// Quantize one sample to PCM16.
///
/// Scaling is asymmetric on purpose: positive samples scale by 32767 and
/// negative by 32768, so both range boundaries map onto representable values.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a raw sample buffer as base64 little-endian PCM16.
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_frame(encoded: &str) -> Vec<i16> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn test_boundary_values() {
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32768);
        assert_eq!(quantize(0.0), 0);
    }

    #[test]
    fn test_out_of_range_samples_clamp() {
        assert_eq!(quantize(1.5), 32767);
        assert_eq!(quantize(-2.0), -32768);
    }

    #[test]
    fn test_round_trip_reproduces_quantized_values() {
        let samples: Vec<f32> = vec![-1.0, -0.75, -0.5, -0.25, 0.0, 0.25, 0.5, 0.75, 1.0];
        let decoded = decode_frame(&encode_frame(&samples));

        assert_eq!(decoded.len(), samples.len());
        for (sample, value) in samples.iter().zip(&decoded) {
            // Exact match with the quantizer, within 1 LSB of ideal scaling
            assert_eq!(*value, quantize(*sample));
            let ideal = if *sample < 0.0 {
                sample * 32768.0
            } else {
                sample * 32767.0
            };
            assert!((*value as f32 - ideal).abs() <= 1.0);
        }
    }

    #[test]
    fn test_encoding_is_little_endian() {
        // 0.5 * 32767 = 16383 = 0x3FFF
        let decoded = decode_frame(&encode_frame(&[0.5]));
        assert_eq!(decoded, vec![16383]);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encode_frame(&[0.5]))
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0x3F]);
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(encode_frame(&[]), "");
    }
}
