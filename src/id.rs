//! ID generation for saved roadmaps.

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix of every saved roadmap id.
pub const ROADMAP_ID_PREFIX: &str = "rm-";

/// Generate a unique roadmap ID.
/// Format: "rm-" + 10 hex chars of SHA256(title + timestamp + random)
pub fn generate_id(title: &str, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(created_at.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    hasher.update(rand::rng().random::<[u8; 8]>());
    let hash = hasher.finalize();
    let prefix = u64::from_be_bytes([0, 0, 0, hash[0], hash[1], hash[2], hash[3], hash[4]]);
    format!("{}{:010x}", ROADMAP_ID_PREFIX, prefix)
}

/// True if `id` has the shape produced by [`generate_id`].
pub fn is_roadmap_id(id: &str) -> bool {
    id.strip_prefix(ROADMAP_ID_PREFIX)
        .is_some_and(|hex| hex.len() == 10 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("Learn Rust", Utc::now());
        assert!(id.starts_with("rm-"));
        assert_eq!(id.len(), 13);
        assert!(is_roadmap_id(&id));
    }

    #[test]
    fn test_generate_id_uniqueness() {
        let now = Utc::now();
        assert_ne!(generate_id("Same title", now), generate_id("Same title", now));
    }

    #[test]
    fn test_is_roadmap_id() {
        assert!(is_roadmap_id("rm-00ff00ff00"));
        assert!(!is_roadmap_id("eg-00ff00ff00"));
        assert!(!is_roadmap_id("rm-xyz"));
        assert!(!is_roadmap_id("rm-00ff00ff00ff"));
    }
}
