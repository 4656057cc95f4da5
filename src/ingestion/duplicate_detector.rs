use crate::artwork_store::{Artwork, ArtworkStore, CatalogResult};
use crate::fingerprint::hamming_distance;
use std::sync::Arc;

/// Largest Hamming distance at which two perceptual digests count as the same picture.
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarArtwork {
    pub artwork: Artwork,
    pub distance: u32,
}

/// Looks up catalogued artworks matching a fingerprint.
///
/// Similarity is a linear scan over every stored perceptual digest.
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn ArtworkStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn ArtworkStore>) -> Self {
        Self { store }
    }

    pub fn check_exact_duplicate(&self, content_digest: &str) -> CatalogResult<Option<Artwork>> {
        self.store.find_by_content_digest(content_digest)
    }

    /// Artworks within `max_distance` of `perceptual_digest`, closest first, ties by id.
    ///
    /// Zero is the "not computed" marker and never matches anything.
    pub fn check_similar(
        &self,
        perceptual_digest: u64,
        max_distance: u32,
    ) -> CatalogResult<Vec<SimilarArtwork>> {
        if perceptual_digest == 0 {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(u32, i64)> = self
            .store
            .list_perceptual_digests()?
            .into_iter()
            .filter(|(_, digest)| *digest != 0)
            .map(|(id, digest)| (hamming_distance(perceptual_digest, digest), id))
            .filter(|(distance, _)| *distance <= max_distance)
            .collect();
        candidates.sort_unstable();

        let mut matches = Vec::with_capacity(candidates.len());
        for (distance, id) in candidates {
            // Deleted between the scan and this read.
            if let Some(artwork) = self.store.get_artwork(id)? {
                matches.push(SimilarArtwork { artwork, distance });
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork_store::{NewArtwork, SqliteArtworkStore};

    fn detector_with(digests: &[(&str, Option<u64>)]) -> (DuplicateDetector, Arc<SqliteArtworkStore>) {
        let store = Arc::new(SqliteArtworkStore::in_memory().unwrap());
        for (content, phash) in digests {
            store
                .create_artwork(&NewArtwork {
                    file_id: format!("f-{}", content),
                    url: String::new(),
                    thumbnail_url: String::new(),
                    content_digest: content.to_string(),
                    perceptual_digest: *phash,
                    tags: vec![],
                })
                .unwrap();
        }
        (DuplicateDetector::new(store.clone()), store)
    }

    #[test]
    fn exact_match_by_content_digest() {
        let (detector, _) = detector_with(&[("h1", None), ("h2", None)]);
        assert_eq!(
            detector.check_exact_duplicate("h2").unwrap().unwrap().id,
            2
        );
        assert!(detector.check_exact_duplicate("h3").unwrap().is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        let base = 0xF0F0_F0F0_F0F0_F0F0u64;
        let (detector, _) = detector_with(&[
            ("five", Some(base ^ 0b11111)),
            ("six", Some(base ^ 0b111111)),
        ]);

        let found = detector.check_similar(base, 5).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].artwork.content_digest, "five");
        assert_eq!(found[0].distance, 5);
    }

    #[test]
    fn ordered_by_distance_then_id() {
        let base = 0x0123_4567_89AB_CDEFu64;
        let (detector, _) = detector_with(&[
            ("d3-a", Some(base ^ 0b111)),
            ("d1", Some(base ^ 0b1)),
            ("d3-b", Some(base ^ 0b111 << 8)),
            ("d0", Some(base)),
        ]);

        let found = detector.check_similar(base, 5).unwrap();
        let order: Vec<(i64, u32)> = found.iter().map(|m| (m.artwork.id, m.distance)).collect();
        assert_eq!(order, vec![(4, 0), (2, 1), (1, 3), (3, 3)]);
    }

    #[test]
    fn absent_digests_never_match() {
        let (detector, _) = detector_with(&[("none", None)]);
        assert!(detector.check_similar(1, 64).unwrap().is_empty());
        assert!(detector.check_similar(0, 64).unwrap().is_empty());
    }

    #[test]
    fn deleted_records_are_ignored() {
        let (detector, store) = detector_with(&[("h1", Some(42))]);
        store.soft_delete_artwork(1).unwrap();
        assert!(detector.check_similar(42, 0).unwrap().is_empty());
        assert!(detector.check_exact_duplicate("h1").unwrap().is_none());
    }
}
