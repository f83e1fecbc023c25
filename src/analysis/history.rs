use std::collections::VecDeque;

/// Bounded FIFO of recent RMS values
///
/// Pushing past capacity evicts the oldest value, so `len() <= capacity()`
/// always holds.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// History pre-filled with `capacity` copies of `value`
    pub fn seeded(capacity: usize, value: f64) -> Self {
        let mut history = Self::new(capacity);
        history.fill(value);
        history
    }

    /// Push a value, returning the evicted one if the history was full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        evicted
    }

    /// Mean of the stored values, 0.0 when empty
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Replace the contents with `capacity` copies of `value`
    pub fn fill(&mut self, value: f64) {
        self.values.clear();
        self.values.extend(std::iter::repeat(value).take(self.capacity));
    }
}
