//! Per-document cache of image content hashes.
//!
//! Watermarks, logos and banner strips are embedded once per page, so the same
//! bytes show up again and again. [`DedupState`] remembers which hashes have
//! been seen once and which are confirmed repeats.
//!
//! A fresh state is built for every document and passed by `&mut` into the
//! classifier; it is never shared across requests. Only the sequential
//! extract phase touches it, so no locking is needed.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Hex-encoded SHA-256 of an image's raw bytes.
pub type ContentHash = String;

/// Outcome of recording an image hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Never seen before; now remembered as `seen`.
    First,
    /// Seen exactly once before; now promoted to `junk`.
    FirstRepeat,
    /// Already confirmed junk.
    Junk,
}

#[derive(Debug, Default, Clone)]
pub struct DedupState {
    seen: HashSet<ContentHash>,
    junk: HashSet<ContentHash>,
}

impl DedupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(bytes: &[u8]) -> ContentHash {
        hex::encode(Sha256::digest(bytes))
    }

    /// Record one occurrence of `bytes` and report which occurrence it was.
    pub fn observe(&mut self, bytes: &[u8]) -> Sighting {
        let hash = Self::hash(bytes);
        if self.junk.contains(&hash) {
            return Sighting::Junk;
        }
        if self.seen.contains(&hash) {
            self.junk.insert(hash);
            return Sighting::FirstRepeat;
        }
        self.seen.insert(hash);
        Sighting::First
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn junk_count(&self) -> usize {
        self.junk.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sightings_progress_first_repeat_junk() {
        let mut state = DedupState::new();
        let logo = b"logo-bytes";
        assert_eq!(state.observe(logo), Sighting::First);
        assert_eq!(state.observe(logo), Sighting::FirstRepeat);
        assert_eq!(state.observe(logo), Sighting::Junk);
        assert_eq!(state.observe(logo), Sighting::Junk);
        assert_eq!(state.seen_count(), 1);
        assert_eq!(state.junk_count(), 1);
    }

    #[test]
    fn distinct_bytes_do_not_collide() {
        let mut state = DedupState::new();
        assert_eq!(state.observe(b"a"), Sighting::First);
        assert_eq!(state.observe(b"b"), Sighting::First);
        assert_eq!(state.seen_count(), 2);
        assert_eq!(state.junk_count(), 0);
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            DedupState::hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
