use std::collections::VecDeque;
use std::fmt;

/// Bounded FIFO: newest item at the back, oldest dropped once `capacity` is
/// reached.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    /// A zero capacity is bumped to one so the latest item is always kept.
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);

        Self {
            deque: VecDeque::with_capacity(cap),
            capacity: cap,
        }
    }

    /// Appends `item` as the newest element, returning the evicted oldest one.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let poped = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };

        self.deque.push_back(item);

        poped
    }

    /// Changes the capacity, dropping the oldest items that no longer fit.
    pub fn set_capacity(&mut self, cap: usize) {
        self.capacity = cap.max(1);

        while self.deque.len() > self.capacity {
            self.deque.pop_front();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() >= self.capacity
    }

    #[inline]
    pub fn last(&self) -> Option<&T> {
        self.deque.back()
    }

    /// `n`-th item counting from the newest (`0` is the newest).
    #[inline]
    pub fn nth_back(&self, n: usize) -> Option<&T> {
        let idx = self.deque.len().checked_sub(n + 1)?;
        self.deque.get(idx)
    }

    /// Oldest to newest.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_on_overflow() {
        let mut q = CircularQueue::with_capacity(3);

        assert_eq!(q.push(1), None);
        assert_eq!(q.push(2), None);
        assert_eq!(q.push(3), None);
        assert_eq!(q.push(4), Some(1));

        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(q.last(), Some(&4));
        assert_eq!(q.nth_back(2), Some(&2));
        assert_eq!(q.nth_back(3), None);
    }

    #[test]
    fn shrinking_keeps_newest() {
        let mut q = CircularQueue::with_capacity(5);
        for i in 0..5 {
            q.push(i);
        }

        q.set_capacity(2);

        assert_eq!(q.len(), 2);
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn zero_capacity_keeps_latest() {
        let mut q = CircularQueue::with_capacity(0);
        q.push('a');
        q.push('b');

        assert_eq!(q.len(), 1);
        assert_eq!(q.last(), Some(&'b'));
    }
}
