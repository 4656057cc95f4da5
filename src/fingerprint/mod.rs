//! Content fingerprints: a cryptographic digest for exact matching and a perceptual
//! digest for near-duplicate detection.

mod perceptual;
#[cfg(test)]
pub(crate) mod test_images;

pub use perceptual::{hamming_distance, perceptual_digest, perceptual_digest_of};

use sha2::{Digest, Sha256};
use std::io::{self, Read};

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to read image data: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// SHA-256 of the whole stream, lowercase hex. Consumes the reader.
pub fn content_digest<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
