use std::sync::Mutex;

/// Monotonic sequence shared by concurrent workers
///
/// Every call to [`SequenceCounter::next`] runs under the counter's own lock,
/// so two callers can never receive the same number. The counter is an
/// owned value handed to whoever allocates from it; tests build their own.
#[derive(Debug)]
pub struct SequenceCounter {
    next: Mutex<u64>,
}

impl SequenceCounter {
    /// Creates a counter whose first allocation returns `start`
    pub fn new(start: u64) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }

    /// Allocates the next number
    pub fn next(&self) -> u64 {
        // A poisoned lock still holds a valid counter value
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let value = *next;
        *next += 1;
        value
    }

    /// Number the next allocation would return
    pub fn peek(&self) -> u64 {
        *self.next.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ensures the next allocation returns at least `floor`
    pub fn raise_to(&self, floor: u64) {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        if *next < floor {
            *next = floor;
        }
    }
}
