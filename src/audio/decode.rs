//! Decoding of raw wire chunks into typed samples.
//!
//! Clients send little-endian 16-bit PCM at a fixed 16kHz mono; no format
//! negotiation or resampling happens here.

use crate::error::{Result, ScribeError};

/// Decode a raw byte chunk into 16-bit samples.
///
/// # Errors
/// Returns `ScribeError::MalformedAudio` if the chunk is empty or its byte
/// length is not a multiple of 2.
pub fn decode_chunk(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.is_empty() {
        return Err(ScribeError::MalformedAudio {
            message: "empty chunk".to_string(),
        });
    }
    if bytes.len() % 2 != 0 {
        return Err(ScribeError::MalformedAudio {
            message: format!("odd byte length {}", bytes.len()),
        });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Convert i16 audio samples to f32 normalized to [-1.0, 1.0).
///
/// The backend expects floating-point amplitude; 16-bit PCM samples range
/// from -32768 to 32767.
pub fn normalize(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Root-mean-square level of a sample slice, normalized to 0.0..=1.0.
///
/// Used by the live capture loop for noise-floor calibration and speech
/// detection.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian_pairs() {
        // 0x0100 = 256, 0xFFFF = -1
        let bytes = [0x00, 0x01, 0xFF, 0xFF];
        let samples = decode_chunk(&bytes).unwrap();
        assert_eq!(samples, vec![256, -1]);
    }

    #[test]
    fn test_decode_rejects_empty_chunk() {
        let result = decode_chunk(&[]);
        assert!(matches!(result, Err(ScribeError::MalformedAudio { .. })));
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let result = decode_chunk(&[0x00, 0x01, 0xFF]);
        match result {
            Err(ScribeError::MalformedAudio { message }) => {
                assert!(message.contains("3"), "message should name the length");
            }
            other => panic!("expected MalformedAudio, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_roundtrips_extremes() {
        let bytes = i16::MIN
            .to_le_bytes()
            .iter()
            .chain(i16::MAX.to_le_bytes().iter())
            .copied()
            .collect::<Vec<u8>>();
        assert_eq!(decode_chunk(&bytes).unwrap(), vec![i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_normalize_range() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let converted = normalize(&samples);

        assert_eq!(converted.len(), samples.len());
        assert_eq!(converted[0], 0.0);
        assert!((converted[1] - 0.5).abs() < 0.01);
        assert!((converted[2] + 0.5).abs() < 0.01);
        assert!((converted[3] - 0.999969).abs() < 0.01);
        assert_eq!(converted[4], -1.0);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_rms_level_silence_is_zero() {
        assert_eq!(rms_level(&vec![0i16; 1600]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn test_rms_level_full_scale() {
        let level = rms_level(&vec![i16::MAX; 1600]);
        assert!((level - 1.0).abs() < 0.001, "got {}", level);
    }

    #[test]
    fn test_rms_level_monotonic_in_amplitude() {
        let quiet = rms_level(&vec![500i16; 1600]);
        let loud = rms_level(&vec![8000i16; 1600]);
        assert!(loud > quiet);
    }
}
