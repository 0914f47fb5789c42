//! Perceptual fingerprints (blurhash strings) for sampled frames.
//!
//! The codec itself comes from the `blurhash` crate. This module adds the
//! grammar check used by the recording store to reject malformed hashes.

use thiserror::Error;

/// Default component grid used by the capture loop.
pub const DEFAULT_COMPONENTS_X: u32 = 4;
pub const DEFAULT_COMPONENTS_Y: u32 = 4;
/// Contrast boost applied when decoding a preview.
pub const DEFAULT_PUNCH: f32 = 1.5;

const BASE83_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz#$%*+,-.:;=?@[]^_{|}~";
const MIN_HASH_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("pixel buffer has {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("blurhash codec failed: {0}")]
    Codec(String),
}

/// Encode an RGBA pixel buffer into a blurhash with `grid_x` by `grid_y` components.
pub fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    grid_x: u32,
    grid_y: u32,
) -> Result<String, FingerprintError> {
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(FingerprintError::BufferSize {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }

    blurhash::encode(grid_x, grid_y, width, height, pixels)
        .map_err(|err| FingerprintError::Codec(err.to_string()))
}

/// Decode a blurhash back into a `width` x `height` RGBA preview.
pub fn decode(hash: &str, width: u32, height: u32, punch: f32) -> Result<Vec<u8>, FingerprintError> {
    blurhash::decode(hash, width, height, punch)
        .map_err(|err| FingerprintError::Codec(err.to_string()))
}

/// Check a string against the blurhash grammar: a base83 size flag that fixes
/// the component grid, and a total length of `4 + 2 * x * y` base83 digits.
pub fn is_valid(hash: &str) -> bool {
    let bytes = hash.as_bytes();
    if bytes.len() < MIN_HASH_LEN {
        return false;
    }

    if !bytes.iter().all(|byte| BASE83_ALPHABET.contains(byte)) {
        return false;
    }

    let Some(size_flag) = base83_digit(bytes[0]) else {
        return false;
    };
    let components_y = size_flag / 9 + 1;
    let components_x = size_flag % 9 + 1;

    bytes.len() == 4 + 2 * components_x * components_y
}

fn base83_digit(byte: u8) -> Option<usize> {
    BASE83_ALPHABET.iter().position(|candidate| *candidate == byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x * 255 / width) as u8, (y * 255 / height) as u8, 96, 255]);
            }
        }
        pixels
    }

    #[test]
    fn accepts_reference_hashes() {
        assert!(is_valid("LEHV6nWB2yk8pyo0adR*.7kCMdnj"));
        assert!(is_valid("LGF5]+Yk^6#M@-5c,1J5@[or[Q6."));
    }

    #[test]
    fn rejects_wrong_length_and_alphabet() {
        assert!(!is_valid(""));
        assert!(!is_valid("LEHV6"));
        assert!(!is_valid("LEHV6nWB2yk8pyo0adR*.7kCMdn"));
        assert!(!is_valid("LEHV6nWB2yk8pyo0adR*.7kCMdn\""));
        assert!(!is_valid("not a blurhash at all, clearly"));
    }

    #[test]
    fn encoded_hash_passes_validation_and_decodes() {
        let pixels = gradient(32, 16);
        let hash = encode(&pixels, 32, 16, DEFAULT_COMPONENTS_X, DEFAULT_COMPONENTS_Y).unwrap();

        assert_eq!(hash.len(), 4 + 2 * 4 * 4);
        assert!(is_valid(&hash));

        let preview = decode(&hash, 8, 4, DEFAULT_PUNCH).unwrap();
        assert_eq!(preview.len(), 8 * 4 * 4);
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let err = encode(&[0u8; 12], 4, 4, 4, 4).unwrap_err();
        assert!(matches!(err, FingerprintError::BufferSize { expected: 64, .. }));
    }
}
