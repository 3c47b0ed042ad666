//! Windowed aggregation of the score ledger.

use std::{cmp::Ordering, collections::HashMap};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::entities::{RankedPost, ScoreEvent};
use crate::domain::types::Timeframe;

/// Start of the trailing window ending at `now`.
///
/// The window rolls with `now` rather than starting at a calendar midnight.
pub fn window_start(now: OffsetDateTime, timeframe: Timeframe) -> OffsetDateTime {
    now - Duration::days(timeframe.days())
}

/// Ordering used by the trending ranking: score descending, then post id descending.
pub fn rank_order(a: &RankedPost, b: &RankedPost) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.post_id.cmp(&a.post_id))
}

/// Sum event weights per post for events created strictly after `since`.
///
/// Posts without a qualifying event are absent from the result.
pub fn aggregate<'a>(
    events: impl IntoIterator<Item = &'a ScoreEvent>,
    since: OffsetDateTime,
) -> Vec<RankedPost> {
    let mut totals: HashMap<Uuid, f64> = HashMap::new();
    for event in events {
        if event.created_at > since {
            *totals.entry(event.post_id).or_insert(0.0) += event.weight;
        }
    }

    let mut ranked: Vec<RankedPost> = totals
        .into_iter()
        .map(|(post_id, score)| RankedPost { post_id, score })
        .collect();
    ranked.sort_by(rank_order);
    ranked
}
