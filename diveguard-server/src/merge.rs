//! K-way head merge across sensor streams.
//!
//! Each stream contributes at most one pending head. The earliest head is
//! released first; ties go to the lower stream index, so streams are listed
//! in the order their same-time measurements should apply.

use diveguard_core::{Measurement, Timestamp};

pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}

impl Timestamped for Measurement {
    fn timestamp(&self) -> Timestamp {
        Measurement::timestamp(self)
    }
}

#[derive(Debug)]
pub struct HeadMerge<T> {
    heads: Vec<Option<T>>,
}

impl<T: Timestamped> HeadMerge<T> {
    pub fn new(streams: usize) -> Self {
        HeadMerge {
            heads: (0..streams).map(|_| None).collect(),
        }
    }

    /// Fill an empty head slot from `next`. A filled slot is left alone.
    pub fn refill(&mut self, stream: usize, next: impl FnOnce() -> Option<T>) {
        if let Some(slot) = self.heads.get_mut(stream) {
            if slot.is_none() {
                *slot = next();
            }
        }
    }

    /// True when every stream has a pending head.
    pub fn is_complete(&self) -> bool {
        self.heads.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.heads.iter().all(Option::is_none)
    }

    pub fn pending(&self) -> usize {
        self.heads.iter().filter(|h| h.is_some()).count()
    }

    /// Release the earliest head with its stream index.
    pub fn pop(&mut self) -> Option<(usize, T)> {
        let mut earliest: Option<(usize, Timestamp)> = None;
        for (i, head) in self.heads.iter().enumerate() {
            if let Some(item) = head {
                let ts = item.timestamp();
                if earliest.map_or(true, |(_, best)| ts < best) {
                    earliest = Some((i, ts));
                }
            }
        }
        let (stream, _) = earliest?;
        self.heads[stream].take().map(|item| (stream, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, PartialEq)]
    struct Item(f64, &'static str);

    impl Timestamped for Item {
        fn timestamp(&self) -> Timestamp {
            self.0
        }
    }

    #[test]
    fn test_merges_in_timestamp_order() {
        let mut streams = vec![
            VecDeque::from(vec![Item(1.0, "a"), Item(4.0, "a")]),
            VecDeque::from(vec![Item(0.5, "b"), Item(2.0, "b"), Item(3.0, "b")]),
            VecDeque::from(vec![Item(2.0, "c")]),
        ];
        let mut merge = HeadMerge::new(streams.len());
        let mut order = Vec::new();
        loop {
            for (i, stream) in streams.iter_mut().enumerate() {
                merge.refill(i, || stream.pop_front());
            }
            match merge.pop() {
                Some((_, item)) => order.push((item.0, item.1)),
                None => break,
            }
        }
        assert_eq!(
            order,
            vec![
                (0.5, "b"),
                (1.0, "a"),
                (2.0, "b"),
                (2.0, "c"),
                (3.0, "b"),
                (4.0, "a")
            ]
        );
    }

    #[test]
    fn test_refill_keeps_pending_head() {
        let mut merge = HeadMerge::new(2);
        merge.refill(0, || Some(Item(5.0, "first")));
        merge.refill(0, || Some(Item(1.0, "second")));
        assert_eq!(merge.pending(), 1);
        assert!(!merge.is_complete());
        assert_eq!(merge.pop(), Some((0, Item(5.0, "first"))));
        assert!(merge.is_empty());
        assert_eq!(merge.pop(), None);
    }
}
