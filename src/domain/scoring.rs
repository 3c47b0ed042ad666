//! Weighting policy for the score ledger.
//!
//! A like is worth [`LIKE_WEIGHT`]. Reads pass two throttles before they reach
//! the ledger: a viewer (identified by the hash of their IP address) is counted
//! at most once per post inside [`READ_DEDUP_WINDOW`], and only every
//! [`READ_DECIMATION`]th counted view of a post produces a `READ` event worth
//! [`READ_WEIGHT`].

use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::domain::types::ScoreKind;

pub const LIKE_WEIGHT: f64 = 5.0;
pub const READ_WEIGHT: f64 = 0.75;
pub const READ_DECIMATION: i64 = 10;
pub const READ_DEDUP_WINDOW: Duration = Duration::hours(24);

pub fn weight_of(kind: ScoreKind) -> f64 {
    match kind {
        ScoreKind::Like => LIKE_WEIGHT,
        ScoreKind::Read => READ_WEIGHT,
    }
}

/// Whether the view that brought the counter to `views` earns a `READ` event.
pub fn read_score_due(views: i64) -> bool {
    views > 0 && views % READ_DECIMATION == 0
}

/// Oldest read timestamp that still suppresses a repeat view at `now`.
///
/// Only counted reads anchor the window; suppressed repeats are
/// never stored, so they cannot slide it forward.
pub fn dedup_cutoff(now: OffsetDateTime) -> OffsetDateTime {
    now - READ_DEDUP_WINDOW
}

/// Stable, non-reversible identity for a client address.
pub fn hash_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.trim().as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_every_tenth_view_scores() {
        let scored: Vec<i64> = (1..=30).filter(|views| read_score_due(*views)).collect();
        assert_eq!(scored, vec![10, 20, 30]);
        assert!(!read_score_due(0));
    }

    #[test]
    fn ip_hash_is_stable_and_opaque() {
        let first = hash_ip("203.0.113.7");
        assert_eq!(first, hash_ip(" 203.0.113.7 "));
        assert_ne!(first, hash_ip("203.0.113.8"));
        assert_eq!(first.len(), 64);
        assert!(!first.contains("203"));
    }

    #[test]
    fn weights_follow_the_taxonomy() {
        assert_eq!(weight_of(ScoreKind::Like), 5.0);
        assert_eq!(weight_of(ScoreKind::Read), 0.75);
    }
}
