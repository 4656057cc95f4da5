use super::FingerprintError;
use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, HasherConfig};
use std::io::{BufRead, Seek};

/// Side of the hash grid, 8x8 bits fill a `u64`.
const HASH_SIDE: u32 = 8;

/// DCT-based perceptual hash of an encoded image.
///
/// The image format is sniffed from the content. Visually similar images produce digests
/// with a small Hamming distance.
pub fn perceptual_digest<R: BufRead + Seek>(reader: R) -> Result<u64, FingerprintError> {
    let image = ImageReader::new(reader).with_guessed_format()?.decode()?;
    Ok(perceptual_digest_of(&image))
}

/// Mean hash over the low DCT frequencies, first hash byte in the most significant bits.
pub fn perceptual_digest_of(image: &DynamicImage) -> u64 {
    let hasher = HasherConfig::new()
        .hash_size(HASH_SIDE, HASH_SIDE)
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .to_hasher();
    hasher
        .hash_image(image)
        .as_bytes()
        .iter()
        .fold(0u64, |digest, byte| (digest << 8) | u64::from(*byte))
}

/// Number of differing bits between two digests.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::test_images::{encode, waves};
    use image::ImageFormat;
    use std::io::Cursor;

    #[test]
    fn decoded_png_matches_in_memory_digest() {
        let image = waves(64, 1.0, 2.0, 0.3, 0);
        let png = perceptual_digest(Cursor::new(encode(&image, ImageFormat::Png))).unwrap();
        assert_eq!(png, perceptual_digest_of(&image));
        assert_ne!(png, 0);
    }

    #[test]
    fn brightness_shift_keeps_digest_close() {
        let a = perceptual_digest_of(&waves(64, 1.0, 2.0, 0.3, 0));
        let b = perceptual_digest_of(&waves(64, 1.0, 2.0, 0.3, 6));
        assert!(hamming_distance(a, b) <= 5, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn rescaled_image_stays_close() {
        let a = perceptual_digest_of(&waves(128, 1.0, 2.0, 0.3, 0));
        let b = perceptual_digest_of(&waves(96, 1.0, 2.0, 0.3, 0));
        assert!(hamming_distance(a, b) <= 10, "distance {}", hamming_distance(a, b));
    }

    #[test]
    fn different_structure_is_far_apart() {
        let a = perceptual_digest_of(&waves(64, 1.0, 2.0, 0.3, 0));
        let c = perceptual_digest_of(&waves(64, 3.0, 0.5, 2.1, 0));
        assert!(hamming_distance(a, c) > 5, "distance {}", hamming_distance(a, c));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result = perceptual_digest(Cursor::new(b"definitely not an image".to_vec()));
        assert!(result.is_err());
    }

    #[test]
    fn hamming_distance_counts_bits() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0b1011, 0b0001), 2);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
    }
}
