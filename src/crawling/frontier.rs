//! Page frontiers: the order in which fetched pages are expanded.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Pending pages, stored as indices into the crawl path.
#[derive(Debug)]
pub(crate) enum Frontier {
    Fifo(VecDeque<usize>),
    Lifo(Vec<usize>),
    /// Highest priority first; equal priorities leave in insertion order.
    Priority {
        heap: BinaryHeap<(i64, Reverse<u64>, usize)>,
        pushed: u64,
    },
}

impl Frontier {
    pub(crate) fn fifo() -> Self {
        Frontier::Fifo(VecDeque::new())
    }

    pub(crate) fn lifo() -> Self {
        Frontier::Lifo(Vec::new())
    }

    pub(crate) fn priority() -> Self {
        Frontier::Priority {
            heap: BinaryHeap::new(),
            pushed: 0,
        }
    }

    /// `priority` is ignored by the FIFO and LIFO frontiers.
    pub(crate) fn push(&mut self, index: usize, priority: i64) {
        match self {
            Frontier::Fifo(queue) => queue.push_back(index),
            Frontier::Lifo(stack) => stack.push(index),
            Frontier::Priority { heap, pushed } => {
                heap.push((priority, Reverse(*pushed), index));
                *pushed += 1;
            }
        }
    }

    pub(crate) fn pop(&mut self) -> Option<usize> {
        match self {
            Frontier::Fifo(queue) => queue.pop_front(),
            Frontier::Lifo(stack) => stack.pop(),
            Frontier::Priority { heap, .. } => heap.pop().map(|(_, _, index)| index),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Frontier::Fifo(queue) => queue.is_empty(),
            Frontier::Lifo(stack) => stack.is_empty(),
            Frontier::Priority { heap, .. } => heap.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut frontier: Frontier, items: &[(usize, i64)]) -> Vec<usize> {
        for (index, priority) in items {
            frontier.push(*index, *priority);
        }
        let mut out = Vec::new();
        while let Some(index) = frontier.pop() {
            out.push(index);
        }
        assert!(frontier.is_empty());
        out
    }

    #[test]
    fn test_orders() {
        let items = [(0, 0), (1, -1), (2, 0), (3, 5)];
        assert_eq!(drain(Frontier::fifo(), &items), vec![0, 1, 2, 3]);
        assert_eq!(drain(Frontier::lifo(), &items), vec![3, 2, 1, 0]);
        assert_eq!(drain(Frontier::priority(), &items), vec![3, 0, 2, 1]);
    }
}
