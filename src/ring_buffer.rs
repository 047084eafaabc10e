use crate::error::FleetError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Bounded drop-oldest queue shared between a grabber thread and a detection task.
///
/// Pushing never blocks: when the queue is full the oldest item is evicted
/// and handed back to the caller so it can be counted.
pub struct RingBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Created frame queue with capacity {}", capacity);

        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an item, evicting and returning the oldest one if the queue is full
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };

        if evicted.is_some() {
            trace!("Frame queue full, evicted oldest item");
        }

        evicted
    }

    /// Remove the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued item, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }
}

/// Builder for creating frame queues with validated configuration
pub struct RingBufferBuilder {
    capacity: Option<usize>,
}

impl RingBufferBuilder {
    pub fn new() -> Self {
        Self { capacity: None }
    }

    /// Set the queue capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn build<T>(self) -> Result<RingBuffer<T>, FleetError> {
        let capacity = self
            .capacity
            .ok_or_else(|| FleetError::system("Frame queue capacity must be specified"))?;

        if capacity == 0 {
            return Err(FleetError::system(
                "Frame queue capacity must be greater than 0",
            ));
        }

        Ok(RingBuffer::new(capacity))
    }
}

impl Default for RingBufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}
