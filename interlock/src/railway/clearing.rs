use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;
use std::cmp::Ordering;

use super::{Dist, SectionId};

/// Release a section once the agent has travelled past `distance`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClearSection {
    pub distance: Dist,
    pub section: SectionId,
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct QueuedClear {
    distance: OrderedFloat<f64>,
    id: usize,
    section: SectionId,
}

impl Ord for QueuedClear {
    fn cmp(&self, other: &QueuedClear) -> Ordering {
        // Flipped to turn the (maximum) BinaryHeap into a minimum heap.
        other.distance.cmp(&self.distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedClear {
    fn partial_cmp(&self, other: &QueuedClear) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deferred clearing actions of one agent, keyed to its cumulative distance
/// travelled rather than to time.
#[derive(Debug, Default, Clone)]
pub struct ClearingQueue {
    queue: BinaryHeap<QueuedClear>,
    id_counter: usize,
    last: Option<OrderedFloat<f64>>,
}

impl ClearingQueue {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, action: ClearSection) {
        let distance = OrderedFloat(action.distance);
        self.queue.push(QueuedClear {
            distance,
            id: self.id_counter,
            section: action.section,
        });
        self.id_counter += 1;
        if self.last.map(|l| distance > l).unwrap_or(true) {
            self.last = Some(distance);
        }
    }

    /// Largest clearing distance inserted and not yet taken.
    pub fn last_distance(&self) -> Option<Dist> {
        self.last.map(|l| l.0)
    }

    pub fn next_distance(&self) -> Option<Dist> {
        self.queue.peek().map(|q| q.distance.0)
    }

    /// Removes and returns every action due at `distance`, in order.
    pub fn due(&mut self, distance: Dist) -> Vec<ClearSection> {
        let target = OrderedFloat(distance);
        let mut out = Vec::new();
        while let Some(&QueuedClear { distance: d, .. }) = self.queue.peek() {
            if d > target {
                break;
            }
            if let Some(q) = self.queue.pop() {
                out.push(ClearSection { distance: q.distance.0, section: q.section });
            }
        }
        if self.queue.is_empty() {
            self.last = None;
        }
        out
    }

    /// Drops pending actions for a section released by other means.
    pub fn remove_section(&mut self, section: SectionId) {
        let items = ::std::mem::replace(&mut self.queue, BinaryHeap::new());
        self.queue = items.into_iter().filter(|q| q.section != section).collect();
        self.last = self.queue.iter().map(|q| q.distance).max();
    }

    pub fn pending(&self) -> Vec<ClearSection> {
        let mut v: Vec<&QueuedClear> = self.queue.iter().collect();
        v.sort_by(|a, b| b.cmp(a));
        v.into_iter().map(|q| ClearSection { distance: q.distance.0, section: q.section }).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.last = None;
    }
}

#[test]
fn test_ordering() {
    let mut q = ClearingQueue::new();
    q.insert(ClearSection { distance: 123.0, section: 0 });
    q.insert(ClearSection { distance: 0.0, section: 1 });
    q.insert(ClearSection { distance: 122.0, section: 2 });
    assert_eq!(q.last_distance(), Some(123.0));
    assert_eq!(q.next_distance(), Some(0.0));
    assert_eq!(q.pending().iter().map(|c| c.section).collect::<Vec<_>>(), vec![1, 2, 0]);

    let due = q.due(122.5);
    assert_eq!(due.iter().map(|c| c.section).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(q.len(), 1);
    assert_eq!(q.due(200.0)[0].section, 0);
    assert!(q.is_empty());
    assert_eq!(q.last_distance(), None);
}

#[test]
fn test_equal_distances_keep_insertion_order() {
    let mut q = ClearingQueue::new();
    q.insert(ClearSection { distance: 10.0, section: 5 });
    q.insert(ClearSection { distance: 10.0, section: 3 });
    q.remove_section(7);
    let due = q.due(10.0);
    assert_eq!(due.iter().map(|c| c.section).collect::<Vec<_>>(), vec![5, 3]);
}
