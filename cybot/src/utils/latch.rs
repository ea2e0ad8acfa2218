use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be claimed exactly once until it is reset.
///
/// [`fire`](Self::fire) returns `true` to exactly one caller, however many
/// race for it.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim the latch. Returns `true` if this call set it.
    pub fn fire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the latch as already fired
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}
