//! The sliding window of materialized entries behind a result set.

use std::collections::VecDeque;
use std::ops::Index;

/// Ordered sequence with cheap batch insertion and truncation at both ends.
///
/// Logical index 0 is the head. Prepending shifts every existing index; the
/// owner is responsible for adjusting its window offset to match.
#[derive(Debug, Clone)]
pub struct WindowedCache<T> {
    items: VecDeque<T>,
}

impl<T> Default for WindowedCache<T> {
    fn default() -> Self {
        WindowedCache {
            items: VecDeque::new(),
        }
    }
}

impl<T> WindowedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<T>) -> Self {
        WindowedCache {
            items: entries.into(),
        }
    }

    /// Extend the tail
    pub fn append_all(&mut self, entries: Vec<T>) {
        self.items.extend(entries);
    }

    /// Extend the head, keeping the batch's own order
    pub fn prepend_all(&mut self, entries: Vec<T>) {
        self.items.reserve(entries.len());
        for entry in entries.into_iter().rev() {
            self.items.push_front(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Drop `count` entries from the head
    pub fn truncate_front(&mut self, count: usize) {
        let count = count.min(self.items.len());
        self.items.drain(..count);
    }

    /// Drop `count` entries from the tail
    pub fn truncate_back(&mut self, count: usize) {
        let keep = self.items.len().saturating_sub(count);
        self.items.truncate(keep);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Index<usize> for WindowedCache<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(cache: &WindowedCache<u32>) -> Vec<u32> {
        cache.iter().copied().collect()
    }

    #[test]
    fn test_append_and_prepend() {
        let mut cache = WindowedCache::from_entries(vec![3, 4]);
        cache.append_all(vec![5, 6]);
        cache.prepend_all(vec![1, 2]);

        assert_eq!(contents(&cache), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(cache[0], 1);
        assert_eq!(cache.get(6), None);
    }

    #[test]
    fn test_truncate_both_ends() {
        let mut cache = WindowedCache::from_entries((0..10).collect());
        cache.truncate_front(3);
        cache.truncate_back(2);
        assert_eq!(contents(&cache), vec![3, 4, 5, 6, 7]);

        cache.truncate_front(100);
        assert!(cache.is_empty());
        cache.truncate_back(1);
        assert_eq!(cache.len(), 0);
    }
}
