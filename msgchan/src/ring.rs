// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fixed capacity lock-free ring of fixed-size elements.

use crossbeam::queue::ArrayQueue;
use tracing::trace;

/// Errors which can occur while creating a [`RingBuffer`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RingError {
    /// A ring must hold at least one element.
    #[error("ring '{0}' can not be created with zero capacity")]
    ZeroCapacity(String),
}

/// A bounded multi-producer / multi-consumer FIFO of `T`.
///
/// Elements are copied in and out by value, the same way an element ring stores fixed-size
/// objects rather than references to them. Bulk operations never block and report how many
/// elements were actually moved; elements past the reported count are left untouched.
pub struct RingBuffer<T> {
    name: String,
    queue: ArrayQueue<T>,
}

impl<T: Copy> RingBuffer<T> {
    /// Create a new ring able to hold `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::ZeroCapacity`] if `capacity` is zero.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, RingError> {
        let name = name.into();
        if capacity == 0 {
            return Err(RingError::ZeroCapacity(name));
        }
        if !capacity.is_power_of_two() {
            trace!("ring {name} capacity {capacity} is not a power of two");
        }
        Ok(RingBuffer {
            name,
            queue: ArrayQueue::new(capacity),
        })
    }

    /// Copy as many of `items` as fit into the ring, in order.
    ///
    /// Returns the number of leading elements of `items` which were enqueued.
    pub fn enqueue_burst(&self, items: &[T]) -> usize {
        let mut count = 0;
        for item in items {
            if self.queue.push(*item).is_err() {
                break;
            }
            count += 1;
        }
        count
    }

    /// Move up to `max` elements out of the ring and append them to `out`.
    ///
    /// Returns the number of elements appended.
    pub fn dequeue_burst(&self, out: &mut Vec<T>, max: usize) -> usize {
        let mut count = 0;
        while count < max {
            match self.queue.pop() {
                Some(item) => {
                    out.push(item);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Total number of elements the ring can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of elements currently in the ring.
    #[must_use]
    pub fn count(&self) -> usize {
        self.queue.len()
    }

    /// Number of free slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.count()
    }

    /// Name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("name", &self.name)
            .field("capacity", &self.queue.capacity())
            .field("count", &self.queue.len())
            .finish()
    }
}
