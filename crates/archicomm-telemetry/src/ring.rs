// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded circular storage for metric samples.

/// A circular buffer with a capacity fixed at construction.
///
/// Once full, every push overwrites the oldest element. Storage is never
/// grown past the capacity.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    index: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` elements (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    /// Pushes a value, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.index] = value;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    /// Number of elements currently stored.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.data.len() < self.capacity {
            // Not wrapped yet: storage order is chronological.
            0
        } else {
            self.index
        };
        let (left, right) = self.data.split_at(split);
        right.iter().chain(left.iter())
    }

    /// Most recently pushed element.
    pub fn latest(&self) -> Option<&T> {
        if self.data.is_empty() {
            return None;
        }
        let last = (self.index + self.capacity - 1) % self.capacity;
        self.data.get(last)
    }

    /// Drops every element.
    pub fn clear(&mut self) {
        self.data.clear();
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_push_and_iter() {
        let mut rb = RingBuffer::new(3);
        rb.push(1.0);
        rb.push(2.0);
        rb.push(3.0);
        rb.push(4.0); // Overwrites 1.0

        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(rb.count(), 3);
        assert_eq!(rb.latest(), Some(&4.0));
    }

    #[test]
    fn test_ring_buffer_partial_fill_is_chronological() {
        let mut rb = RingBuffer::new(5);
        rb.push(1);
        rb.push(2);
        let values: Vec<i32> = rb.iter().copied().collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(rb.latest(), Some(&2));
    }

    #[test]
    fn test_ring_buffer_never_exceeds_capacity() {
        let mut rb = RingBuffer::new(100);
        for i in 0..1_000 {
            rb.push(i);
        }
        assert_eq!(rb.count(), 100);
        assert_eq!(rb.iter().next(), Some(&900));
        assert_eq!(rb.latest(), Some(&999));
    }

    #[test]
    fn test_ring_buffer_zero_capacity_is_promoted() {
        let mut rb = RingBuffer::new(0);
        rb.push('a');
        rb.push('b');
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), vec!['b']);
    }

    #[test]
    fn test_ring_buffer_clear() {
        let mut rb = RingBuffer::new(2);
        rb.push(1);
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.latest(), None);
    }
}
