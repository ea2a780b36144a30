//! Dedicated render thread for guests that drive their own presentation.
//!
//! Each iteration of the loop:
//!
//! 1. drains guest events without blocking (`Shutdown`/`EndOfStream` stop
//!    the loop),
//! 2. services the pending resize,
//! 3. acquires a presentable image with a bounded wait,
//! 4. lets the guest render into it,
//! 5. presents it and reports the present to the guest.
//!
//! Failed acquires and presents skip the frame and back off; nothing short
//! of a lost device stops the loop. Shutdown is cooperative: the main thread
//! raises a flag the loop checks every iteration, then waits a bounded time
//! for the thread to finish. The guest context is destroyed on the render
//! thread; the swapchain is handed back to the caller so GPU objects are
//! released only after the thread is gone.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use overlay_core::{BridgeConfig, BridgeError, PendingResize, Result, Size};
use overlay_interop::{AcquireError, PresentBackend, RecoveryAction, Swapchain};
use tracing::{debug, error, info, trace, warn};

use crate::context::GuestRenderContext;
use crate::guest::{GuestEvent, GuestRenderer, HostContextDescriptor};
use crate::signal::{FrameSignal, RepaintScheduler};

/// Why the render loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The shutdown flag was raised.
    Shutdown,
    /// The guest reported a terminal event.
    GuestEnded(GuestEvent),
    /// The GPU device is unusable.
    Fatal(BridgeError),
}

/// What the render thread hands back when it finishes.
pub struct RenderLoopOutcome<B: PresentBackend> {
    pub exit: LoopExit,
    /// Still alive; dropping it releases views and the swapchain.
    pub swapchain: Swapchain<B>,
}

/// Counters the render loop updates as it runs.
#[derive(Debug, Default)]
pub struct FrameStats {
    presented: AtomicU64,
    skipped: AtomicU64,
    rebuilds: AtomicU64,
}

impl FrameStats {
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    /// Iterations that ended without a present.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Swapchain rebuilds after the initial build.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }
}

// The loop renders every iteration and is paced by acquire, so guest
// updates need no extra wake-up.
struct Paced;

impl RepaintScheduler for Paced {
    fn request_update(&self) {}

    fn post_update(&self) {}
}

/// Sends on drop, so the owner learns about exits by panic too.
struct ExitNotice(SyncSender<()>);

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

struct RenderLoop<R: GuestRenderer, B: PresentBackend> {
    renderer: R,
    context: GuestRenderContext<R::Context>,
    swapchain: Swapchain<B>,
    signal: Arc<FrameSignal>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<FrameStats>,
    acquire_timeout: Duration,
    retry_backoff: Duration,
}

impl<R: GuestRenderer, B: PresentBackend> RenderLoop<R, B> {
    fn run(mut self) -> RenderLoopOutcome<B> {
        let exit = self.frames();
        self.context.destroy();
        info!(
            presented = self.stats.presented(),
            skipped = self.stats.skipped(),
            "render loop stopped: {exit:?}"
        );
        RenderLoopOutcome {
            exit,
            swapchain: self.swapchain,
        }
    }

    fn frames(&mut self) -> LoopExit {
        let flip_y = self.context.api().flips_vertically();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return LoopExit::Shutdown;
            }

            while let Some(event) = self.renderer.poll_event() {
                if event.ends_playback() {
                    return LoopExit::GuestEnded(event);
                }
                debug!(?event, "guest event");
            }

            match self.swapchain.service_resize() {
                Ok(Some(extent)) => {
                    self.stats.rebuilds.fetch_add(1, Ordering::Relaxed);
                    debug!(%extent, "swapchain resized");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("swapchain rebuild failed, retrying: {err}");
                    self.skip();
                    continue;
                }
            }

            let frame = match self.swapchain.acquire(self.acquire_timeout) {
                Ok(frame) => frame,
                Err(err) => {
                    if let Some(exit) = self.recover(err) {
                        return exit;
                    }
                    continue;
                }
            };

            self.signal.take_pending();
            if let Err(err) = self.context.render(&frame.target, flip_y) {
                // the image is acquired and must still go back to the surface
                warn!("guest render failed: {err}");
            }

            match self.swapchain.present(&frame) {
                Ok(()) => {
                    self.context.notify_presented();
                    self.stats.presented.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    if let Some(exit) = self.recover(err) {
                        return exit;
                    }
                }
            }
        }
    }

    fn recover(&mut self, err: AcquireError) -> Option<LoopExit> {
        match err.action() {
            RecoveryAction::Fatal => {
                error!("presentation failed fatally: {err}");
                Some(LoopExit::Fatal(err.into()))
            }
            RecoveryAction::Rebuild => {
                debug!("{err}, rebuilding before next frame");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                None
            }
            RecoveryAction::Retry => {
                trace!("{err}, retrying");
                self.skip();
                None
            }
        }
    }

    fn skip(&self) {
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        thread::sleep(self.retry_backoff);
    }
}

/// Handle to a running render thread.
pub struct RenderThread<B: PresentBackend> {
    handle: Option<JoinHandle<RenderLoopOutcome<B>>>,
    exited: Receiver<()>,
    shutdown: Arc<AtomicBool>,
    pending: Arc<PendingResize>,
    stats: Arc<FrameStats>,
    shutdown_timeout: Duration,
}

impl<B: PresentBackend + 'static> RenderThread<B> {
    /// Start the loop. The guest context is created on the new thread before
    /// this returns; a creation failure is returned here and the thread is
    /// joined.
    pub fn spawn<R>(
        renderer: R,
        host: HostContextDescriptor,
        swapchain: Swapchain<B>,
        config: &BridgeConfig,
    ) -> Result<Self>
    where
        R: GuestRenderer + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(FrameStats::default());
        let pending = swapchain.pending_resize();
        let (started_tx, started_rx) = mpsc::sync_channel::<Result<()>>(1);
        let (exit_tx, exited) = mpsc::sync_channel(1);

        let acquire_timeout = config.acquire_timeout;
        let retry_backoff = config.retry_backoff;
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("overlay-render".into())
            .spawn(move || {
                let _notice = ExitNotice(exit_tx);
                let mut renderer = renderer;
                let signal = FrameSignal::new(Paced);
                signal.bind_render_thread();
                let context = match GuestRenderContext::create(&mut renderer, &host, signal.callback()) {
                    Ok(context) => {
                        let _ = started_tx.send(Ok(()));
                        context
                    }
                    Err(err) => {
                        let _ = started_tx.send(Err(err));
                        return RenderLoopOutcome {
                            exit: LoopExit::Shutdown,
                            swapchain,
                        };
                    }
                };
                RenderLoop {
                    renderer,
                    context,
                    swapchain,
                    signal,
                    shutdown: thread_shutdown,
                    stats: thread_stats,
                    acquire_timeout,
                    retry_backoff,
                }
                .run()
            })
            .map_err(|err| BridgeError::backend(format!("spawning render thread: {err}")))?;

        let started = started_rx
            .recv()
            .unwrap_or_else(|_| Err(BridgeError::backend("render thread exited during startup")));
        if let Err(err) = started {
            let _ = handle.join();
            return Err(err);
        }
        info!("render thread started");

        Ok(Self {
            handle: Some(handle),
            exited,
            shutdown,
            pending,
            stats,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

impl<B: PresentBackend> RenderThread<B> {
    /// Latest-wins resize request, picked up at the top of the next
    /// iteration. Callable from any thread via [`pending_resize`](Self::pending_resize).
    pub fn request_resize(&self, size: Size) {
        self.pending.request(size);
    }

    pub fn pending_resize(&self) -> Arc<PendingResize> {
        Arc::clone(&self.pending)
    }

    pub fn stats(&self) -> Arc<FrameStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the loop has stopped on its own (guest event or fatal error).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Raise the shutdown flag and wait, at most the configured shutdown
    /// timeout, for the thread to exit.
    ///
    /// On timeout the thread is left running detached and an error is
    /// returned; GPU objects it references must then not be destroyed.
    pub fn shutdown(mut self) -> Result<RenderLoopOutcome<B>> {
        self.stop()
    }

    fn stop(&mut self) -> Result<RenderLoopOutcome<B>> {
        let handle = self
            .handle
            .take()
            .ok_or(BridgeError::InvalidState("render thread already joined"))?;
        self.shutdown.store(true, Ordering::Release);

        match self.exited.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                error!(timeout = ?self.shutdown_timeout, "render thread did not stop in time");
                return Err(BridgeError::InvalidState("render thread did not stop in time"));
            }
        }
        let outcome = handle
            .join()
            .map_err(|_| BridgeError::backend("render thread panicked"))?;
        debug!("render thread joined");
        Ok(outcome)
    }
}

impl<B: PresentBackend> Drop for RenderThread<B> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // the returned swapchain is dropped here, after the join
            let _ = self.stop();
        }
    }
}
