use std::collections::VecDeque;

use log::debug;

use crate::types::{
    JoinedSample, LocationSample, PressureSample, StepSample, TimestampMs, Timestamped,
};

/// Items kept per sensor type before the oldest is evicted
pub const RING_CAPACITY: usize = 100;

/// Maximum timestamp gap when attaching pressure/steps to a location fix
pub const JOIN_WINDOW_MS: i64 = 3_000;

/// Fixed-capacity FIFO of timestamped sensor readings
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Timestamped> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest item when full.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Item whose timestamp is nearest to `timestamp`, if within `window_ms`.
    /// On equal gaps the older item wins.
    pub fn closest(&self, timestamp: TimestampMs, window_ms: i64) -> Option<&T> {
        self.items
            .iter()
            .map(|item| ((item.timestamp() - timestamp).abs(), item))
            .filter(|(gap, _)| *gap <= window_ms)
            .min_by_key(|(gap, _)| *gap)
            .map(|(_, item)| item)
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Session-scoped sensor buffers plus the nearest-timestamp joiner.
///
/// The platform's background delivery path is the only writer; the fusion
/// pipeline reads through [`SampleStore::on_new_location`].
#[derive(Clone, Debug)]
pub struct SampleStore {
    locations: RingBuffer<LocationSample>,
    pressures: RingBuffer<PressureSample>,
    steps: RingBuffer<StepSample>,
    join_window_ms: i64,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::with_window(JOIN_WINDOW_MS)
    }

    pub fn with_window(join_window_ms: i64) -> Self {
        SampleStore {
            locations: RingBuffer::new(RING_CAPACITY),
            pressures: RingBuffer::new(RING_CAPACITY),
            steps: RingBuffer::new(RING_CAPACITY),
            join_window_ms,
        }
    }

    pub fn push_pressure(&mut self, sample: PressureSample) {
        self.pressures.push(sample);
    }

    pub fn push_steps(&mut self, sample: StepSample) {
        self.steps.push(sample);
    }

    /// Store a location fix and attach the nearest pressure and step readings.
    pub fn on_new_location(&mut self, location: LocationSample) -> JoinedSample {
        let timestamp = location.timestamp;
        let pressure = self
            .pressures
            .closest(timestamp, self.join_window_ms)
            .cloned();
        let steps = self.steps.closest(timestamp, self.join_window_ms).cloned();

        if pressure.is_none() || steps.is_none() {
            debug!(
                "join at {}: pressure={} steps={}",
                timestamp,
                pressure.is_some(),
                steps.is_some()
            );
        }

        self.locations.push(location.clone());

        JoinedSample {
            timestamp,
            location,
            pressure,
            steps,
        }
    }

    pub fn locations(&self) -> &RingBuffer<LocationSample> {
        &self.locations
    }

    pub fn pressures(&self) -> &RingBuffer<PressureSample> {
        &self.pressures
    }

    pub fn steps(&self) -> &RingBuffer<StepSample> {
        &self.steps
    }

    /// Clear all queues (called whenever sensing starts or stops)
    pub fn reset(&mut self) {
        self.locations.clear();
        self.pressures.clear();
        self.steps.clear();
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}
