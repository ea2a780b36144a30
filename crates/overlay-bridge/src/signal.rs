//! Frame signal bridge: guest "new frame" callbacks to host repaints.
//!
//! The guest's update callback can fire on any thread. [`FrameSignal`] turns
//! it into at most one pending repaint:
//!
//! - on the host's render thread it asks for a normal, coalesced update;
//! - on any other thread it posts a non-blocking "draw soon" request.
//!
//! Any number of callbacks before the next frame collapse into a single
//! scheduled repaint. The frame loop clears the flag with
//! [`FrameSignal::take_pending`] right before it draws, so a callback that
//! races a frame is served either by that frame or by the next one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::trace;

use crate::guest::UpdateCallback;

/// How a host gets asked for another frame.
pub trait RepaintScheduler: Send + Sync {
    /// Called on the host's render thread. Hosts usually mark the item dirty
    /// and let their own scheduling coalesce.
    fn request_update(&self);

    /// Called from any other thread. Must not block and must not draw:
    /// only make sure a frame happens soon.
    fn post_update(&self);
}

impl<S: RepaintScheduler + ?Sized> RepaintScheduler for Arc<S> {
    fn request_update(&self) {
        (**self).request_update()
    }

    fn post_update(&self) {
        (**self).post_update()
    }
}

/// Observable state of a [`FrameSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Idle,
    RepaintRequested,
}

/// Coalescing repaint flag shared between the guest callback and the host.
pub struct FrameSignal {
    pending: AtomicBool,
    render_thread: Mutex<Option<ThreadId>>,
    scheduler: Box<dyn RepaintScheduler>,
    notifications: AtomicU64,
    scheduled: AtomicU64,
}

impl FrameSignal {
    pub fn new(scheduler: impl RepaintScheduler + 'static) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicBool::new(false),
            render_thread: Mutex::new(None),
            scheduler: Box::new(scheduler),
            notifications: AtomicU64::new(0),
            scheduled: AtomicU64::new(0),
        })
    }

    /// Record the calling thread as the host's render thread.
    pub fn bind_render_thread(&self) {
        let mut slot = self
            .render_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(thread::current().id());
    }

    fn on_render_thread(&self) -> bool {
        let slot = self
            .render_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot == Some(thread::current().id())
    }

    /// The guest has a new frame. Never blocks.
    pub fn notify(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        if self.on_render_thread() {
            trace!("repaint requested on render thread");
            self.scheduler.request_update();
        } else {
            trace!("repaint posted from foreign thread");
            self.scheduler.post_update();
        }
    }

    /// Clear the pending flag before drawing. Returns whether a repaint was
    /// pending.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn state(&self) -> SignalState {
        if self.pending.load(Ordering::Acquire) {
            SignalState::RepaintRequested
        } else {
            SignalState::Idle
        }
    }

    /// Callbacks received so far.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Repaints actually handed to the scheduler so far.
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// An update callback for the guest. It holds the signal weakly, so a
    /// callback outliving the bridge does nothing.
    pub fn callback(self: &Arc<Self>) -> UpdateCallback {
        let signal: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(signal) = signal.upgrade() {
                signal.notify();
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Single-slot mailbox
// ---------------------------------------------------------------------------

/// [`RepaintScheduler`] writing into a single-slot channel, for hosts
/// without a queued-invocation primitive of their own.
#[derive(Debug, Clone)]
pub struct MailboxScheduler {
    tx: SyncSender<()>,
}

impl MailboxScheduler {
    fn send(&self) {
        match self.tx.try_send(()) {
            // full: a wake-up is already waiting
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => trace!("repaint mailbox closed"),
        }
    }
}

impl RepaintScheduler for MailboxScheduler {
    fn request_update(&self) {
        self.send();
    }

    fn post_update(&self) {
        self.send();
    }
}

/// Receiving end of a repaint mailbox, polled by the host's frame loop.
#[derive(Debug)]
pub struct RepaintMailbox {
    rx: Receiver<()>,
}

impl RepaintMailbox {
    /// A connected scheduler and mailbox.
    pub fn channel() -> (MailboxScheduler, RepaintMailbox) {
        let (tx, rx) = mpsc::sync_channel(1);
        (MailboxScheduler { tx }, RepaintMailbox { rx })
    }

    /// Consume a pending wake-up without waiting.
    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Wait up to `timeout` for a wake-up.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Counting {
        local: AtomicU64,
        posted: AtomicU64,
    }

    impl RepaintScheduler for Counting {
        fn request_update(&self) {
            self.local.fetch_add(1, Ordering::SeqCst);
        }

        fn post_update(&self) {
            self.posted.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn storm_on_render_thread_coalesces_to_one_local_update() {
        let counts = Arc::new(Counting::default());
        let signal = FrameSignal::new(Arc::clone(&counts));
        signal.bind_render_thread();

        for _ in 0..100 {
            signal.notify();
        }
        assert_eq!(signal.state(), SignalState::RepaintRequested);
        assert_eq!(counts.local.load(Ordering::SeqCst), 1);
        assert_eq!(counts.posted.load(Ordering::SeqCst), 0);
        assert_eq!(signal.notifications(), 100);

        assert!(signal.take_pending());
        assert_eq!(signal.state(), SignalState::Idle);
        assert!(!signal.take_pending());
    }

    #[test]
    fn foreign_threads_post_exactly_once_per_frame() {
        let counts = Arc::new(Counting::default());
        let signal = FrameSignal::new(Arc::clone(&counts));
        signal.bind_render_thread();

        let callback = signal.callback();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let callback = Arc::clone(&callback);
                thread::spawn(move || {
                    for _ in 0..50 {
                        callback();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(counts.posted.load(Ordering::SeqCst), 1);
        assert_eq!(counts.local.load(Ordering::SeqCst), 0);
        assert_eq!(signal.scheduled(), 1);
    }

    #[test]
    fn request_after_frame_starts_schedules_another() {
        let counts = Arc::new(Counting::default());
        let signal = FrameSignal::new(Arc::clone(&counts));
        signal.notify();
        assert!(signal.take_pending());
        signal.notify();
        assert_eq!(signal.scheduled(), 2);
        assert_eq!(signal.state(), SignalState::RepaintRequested);
    }

    #[test]
    fn callback_outliving_the_signal_is_inert() {
        let signal = FrameSignal::new(Counting::default());
        let callback = signal.callback();
        drop(signal);
        callback();
    }

    #[test]
    fn mailbox_holds_a_single_wakeup() {
        let (scheduler, mailbox) = RepaintMailbox::channel();
        scheduler.post_update();
        scheduler.post_update();
        scheduler.request_update();
        assert!(mailbox.try_take());
        assert!(!mailbox.try_take());
        assert!(!mailbox.wait(Duration::from_millis(1)));
    }
    proptest! {
        #[test]
        fn any_number_of_callbacks_schedules_one_repaint_per_frame(
            bursts in prop::collection::vec(1usize..200, 1..8),
        ) {
            let counts = Arc::new(Counting::default());
            let signal = FrameSignal::new(Arc::clone(&counts));
            signal.bind_render_thread();

            for (frame, &burst) in bursts.iter().enumerate() {
                for _ in 0..burst {
                    signal.notify();
                }
                prop_assert_eq!(signal.scheduled(), frame as u64 + 1);
                prop_assert_eq!(signal.state(), SignalState::RepaintRequested);
                prop_assert!(signal.take_pending());
            }
            prop_assert_eq!(counts.local.load(Ordering::SeqCst), bursts.len() as u64);
            prop_assert_eq!(signal.notifications(), bursts.iter().sum::<usize>() as u64);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn foreign_callbacks_post_once_until_drawn(burst in 1usize..200) {
            let counts = Arc::new(Counting::default());
            let signal = FrameSignal::new(Arc::clone(&counts));
            signal.bind_render_thread();

            let callback = signal.callback();
            thread::spawn(move || {
                for _ in 0..burst {
                    callback();
                }
            })
            .join()
            .unwrap();

            prop_assert_eq!(signal.scheduled(), 1);
            prop_assert_eq!(counts.posted.load(Ordering::SeqCst), 1);
            prop_assert_eq!(counts.local.load(Ordering::SeqCst), 0);
        }
    }
}
