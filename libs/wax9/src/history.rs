use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::error::HistoryError;
use crate::sample::Sample;

/// Samples kept by default, about a dozen seconds at the default output rate.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(120).unwrap();

/// Fixed-capacity sample ring, newest first.
///
/// `unread` counts pushes since the last [`SampleHistory::drain`] and never exceeds `len`,
/// so the unread samples are always indices `0..unread`.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<Sample>,
    capacity: NonZeroUsize,
    unread: usize,
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SampleHistory {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.get()),
            capacity,
            unread: 0,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity.get() {
            self.samples.pop_back();
        }
        self.samples.push_front(sample);
        self.unread = (self.unread + 1).min(self.samples.len());
    }

    /// Returns the number of samples pushed since the last drain and marks them read.
    pub fn drain(&mut self) -> usize {
        std::mem::take(&mut self.unread)
    }

    pub fn mark_as_read(&mut self) {
        self.unread = 0;
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn at(&self, index: usize) -> Result<&Sample, HistoryError> {
        self.samples.get(index).ok_or(HistoryError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Sample> + DoubleEndedIterator {
        self.samples.iter()
    }

    /// The samples pushed since the last drain, newest first.
    pub fn unread_samples(&self) -> impl ExactSizeIterator<Item = &Sample> + DoubleEndedIterator {
        self.samples.range(..self.unread)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn has_readings(&self) -> bool {
        !self.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.unread = 0;
    }
}
