//! Ordered membership of posts inside a series.
//!
//! A series is a dense, zero-based sequence: with `n` members the stored
//! indices are exactly `0..n`. [`SeriesOrder`] keeps the members as an explicit
//! array so every index is derived from the array position and the invariant
//! cannot drift.

use uuid::Uuid;

use crate::domain::entities::SeriesPosition;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesOrder {
    series_id: Uuid,
    posts: Vec<Uuid>,
}

/// Neighbours of a post inside its series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbours {
    pub previous: Option<Uuid>,
    pub next: Option<Uuid>,
}

impl SeriesOrder {
    pub fn new(series_id: Uuid) -> Self {
        Self {
            series_id,
            posts: Vec::new(),
        }
    }

    /// Rebuild an order from persisted rows, rejecting gaps and duplicates.
    pub fn from_positions(
        series_id: Uuid,
        mut positions: Vec<SeriesPosition>,
    ) -> Result<Self, DomainError> {
        if let Some(foreign) = positions.iter().find(|row| row.series_id != series_id) {
            return Err(DomainError::invariant(format!(
                "position for post `{}` belongs to series `{}`",
                foreign.post_id, foreign.series_id
            )));
        }
        positions.sort_by_key(|row| row.index);
        check_contiguous(positions.iter().map(|row| row.index))?;

        Ok(Self {
            series_id,
            posts: positions.into_iter().map(|row| row.post_id).collect(),
        })
    }

    pub fn series_id(&self) -> Uuid {
        self.series_id
    }

    pub fn post_ids(&self) -> &[Uuid] {
        &self.posts
    }

    pub fn contains(&self, post_id: Uuid) -> bool {
        self.posts.contains(&post_id)
    }

    pub fn index_of(&self, post_id: Uuid) -> Option<i32> {
        self.posts
            .iter()
            .position(|candidate| *candidate == post_id)
            .map(to_index)
    }

    pub fn post_at(&self, index: i32) -> Option<Uuid> {
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.posts.get(slot).copied())
    }

    /// The index the next appended post will receive.
    pub fn tail_index(&self) -> i32 {
        to_index(self.posts.len())
    }

    /// Place `post_id` at the tail. Existing entries keep their indices.
    pub fn append(&mut self, post_id: Uuid) -> Result<SeriesPosition, DomainError> {
        if self.contains(post_id) {
            return Err(DomainError::AlreadyInSeries { post_id });
        }
        let index = self.tail_index();
        self.posts.push(post_id);
        Ok(SeriesPosition {
            series_id: self.series_id,
            post_id,
            index,
        })
    }

    /// Remove the entry at `index`; every later entry moves down by one.
    pub fn remove_at(&mut self, index: i32) -> Result<Uuid, DomainError> {
        let slot = usize::try_from(index)
            .ok()
            .filter(|slot| *slot < self.posts.len())
            .ok_or(DomainError::IndexOutOfRange {
                index,
                len: self.posts.len(),
            })?;
        Ok(self.posts.remove(slot))
    }

    pub fn positions(&self) -> Vec<SeriesPosition> {
        self.posts
            .iter()
            .enumerate()
            .map(|(slot, post_id)| SeriesPosition {
                series_id: self.series_id,
                post_id: *post_id,
                index: to_index(slot),
            })
            .collect()
    }

    pub fn neighbours(&self, post_id: Uuid) -> Option<Neighbours> {
        let slot = self.posts.iter().position(|candidate| *candidate == post_id)?;
        Some(Neighbours {
            previous: slot.checked_sub(1).map(|prev| self.posts[prev]),
            next: self.posts.get(slot + 1).copied(),
        })
    }
}

/// Verify that sorted `indices` are exactly `0..n`.
pub fn check_contiguous(indices: impl IntoIterator<Item = i32>) -> Result<(), DomainError> {
    for (expected, actual) in indices.into_iter().enumerate() {
        if actual != to_index(expected) {
            return Err(DomainError::invariant(format!(
                "series index {actual} found where {expected} was expected"
            )));
        }
    }
    Ok(())
}

fn to_index(slot: usize) -> i32 {
    i32::try_from(slot).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: u128) -> Vec<Uuid> {
        (1..=count).map(Uuid::from_u128).collect()
    }

    #[test]
    fn appends_receive_consecutive_indices() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let indices: Vec<i32> = ids(3)
            .into_iter()
            .map(|post| order.append(post).expect("append").index)
            .collect();

        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn removing_from_the_middle_shifts_later_entries() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let posts = ids(4);
        for post in &posts {
            order.append(*post).expect("append");
        }

        let removed = order.remove_at(1).expect("remove index 1");

        assert_eq!(removed, posts[1]);
        assert_eq!(order.post_ids(), &[posts[0], posts[2], posts[3]]);
        let indices: Vec<i32> = order.positions().iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn removing_the_tail_is_a_pure_delete() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let posts = ids(2);
        for post in &posts {
            order.append(*post).expect("append");
        }

        order.remove_at(1).expect("remove tail");
        assert_eq!(order.index_of(posts[0]), Some(0));
        assert_eq!(order.tail_index(), 1);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        order.append(Uuid::new_v4()).expect("append");

        assert_eq!(
            order.remove_at(3),
            Err(DomainError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert!(order.remove_at(-1).is_err());
    }

    #[test]
    fn duplicate_membership_is_rejected() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let post = Uuid::new_v4();
        order.append(post).expect("first append");

        assert_eq!(
            order.append(post),
            Err(DomainError::AlreadyInSeries { post_id: post })
        );
    }

    #[test]
    fn gaps_in_persisted_rows_are_reported() {
        let series_id = Uuid::new_v4();
        let rows = vec![
            SeriesPosition {
                series_id,
                post_id: Uuid::new_v4(),
                index: 0,
            },
            SeriesPosition {
                series_id,
                post_id: Uuid::new_v4(),
                index: 2,
            },
        ];

        let err = SeriesOrder::from_positions(series_id, rows).expect_err("gap detected");
        assert!(matches!(err, DomainError::Invariant { .. }));
    }

    #[test]
    fn neighbours_cover_both_ends() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let posts = ids(3);
        for post in &posts {
            order.append(*post).expect("append");
        }

        let first = order.neighbours(posts[0]).expect("member");
        assert_eq!(first.previous, None);
        assert_eq!(first.next, Some(posts[1]));

        let last = order.neighbours(posts[2]).expect("member");
        assert_eq!(last.previous, Some(posts[1]));
        assert_eq!(last.next, None);
    }

    #[test]
    fn any_sequence_of_operations_keeps_indices_contiguous() {
        let mut order = SeriesOrder::new(Uuid::new_v4());
        let mut next_id = 0u128;
        // deterministic mix of appends and removals
        for step in 0..200u32 {
            let len = order.post_ids().len();
            if step % 3 == 2 && len > 0 {
                let index = (step as usize * 7 % len) as i32;
                order.remove_at(index).expect("in range");
            } else {
                next_id += 1;
                order.append(Uuid::from_u128(next_id)).expect("fresh post");
            }
            check_contiguous(order.positions().iter().map(|row| row.index))
                .expect("contiguous after every step");
        }
    }
}
