use std::collections::VecDeque;

/// Least-recently-used ordering of values.
///
/// Head is the least recently enqueued value, tail the most recent. Enqueueing a value that is
/// already present moves it to the tail instead of duplicating it. The structure knows nothing
/// about what the values mean; pools use it to pick recycling victims.
#[derive(Clone, Debug)]
pub struct EvictionOrder<T> {
    items: VecDeque<T>,
}

impl<T> Default for EvictionOrder<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T: PartialEq> EvictionOrder<T> {
    /// Create an empty ordering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to the tail, moving it there if it is already present.
    pub fn enqueue(&mut self, value: T) {
        // Linear scan: pools hold a handful of entries.
        if let Some(pos) = self.items.iter().position(|v| *v == value) {
            self.items.remove(pos);
        }
        self.items.push_back(value);
    }

    /// Remove and return the head value, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Head value without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Withdraw `value` wherever it sits. Returns `true` when it was present.
    pub fn remove(&mut self, value: &T) -> bool {
        match self.items.iter().position(|v| v == value) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Return `true` when `value` is tracked.
    pub fn contains(&self, value: &T) -> bool {
        self.items.iter().any(|v| v == value)
    }

    /// Number of tracked values.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Return `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resource/order.rs"]
mod tests;
