//! Single-slot resize mailbox.
//!
//! Window-system size changes arrive on the host's UI thread while the frame
//! loop may be running elsewhere. [`PendingResize`] holds at most one request:
//! each new request overwrites the previous one and the frame loop consumes
//! the latest with [`PendingResize::take`]. Nothing is ever queued.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::Size;

const EMPTY: u64 = u64::MAX;

/// Latest-wins resize request slot, shareable across threads.
#[derive(Debug)]
pub struct PendingResize {
    // width in the high half, height in the low half
    slot: AtomicU64,
}

fn pack(size: Size) -> u64 {
    // u32::MAX x u32::MAX would collide with EMPTY
    let width = size.width.min(u32::MAX - 1) as u64;
    (width << 32) | size.height as u64
}

fn unpack(raw: u64) -> Size {
    Size::new((raw >> 32) as u32, raw as u32)
}

impl PendingResize {
    pub const fn new() -> Self {
        Self {
            slot: AtomicU64::new(EMPTY),
        }
    }

    /// Record `size` as the target size, replacing any unconsumed request.
    pub fn request(&self, size: Size) {
        self.slot.store(pack(size), Ordering::Release);
    }

    /// Put back a request that could not be serviced, unless a newer one has
    /// arrived in the meantime. Returns whether `size` was stored.
    pub fn restore(&self, size: Size) -> bool {
        self.slot
            .compare_exchange(EMPTY, pack(size), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consume the latest request, leaving the slot empty.
    pub fn take(&self) -> Option<Size> {
        match self.slot.swap(EMPTY, Ordering::AcqRel) {
            EMPTY => None,
            raw => Some(unpack(raw)),
        }
    }

    /// Look at the latest request without consuming it.
    pub fn peek(&self) -> Option<Size> {
        match self.slot.load(Ordering::Acquire) {
            EMPTY => None,
            raw => Some(unpack(raw)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.peek().is_some()
    }
}

impl Default for PendingResize {
    fn default() -> Self {
        Self::new()
    }
}
