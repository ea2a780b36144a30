//! Compositor-level embedding over a headless display and presenter.

mod common;

use std::time::Duration;

use common::{vulkan_host, wait_until, CountingGuest};
use overlay_bridge::{BridgeConfig, LoopExit, SubsurfaceOverlay};
use overlay_core::{Offset, Size, StackingRelation, SurfaceExtents, SyncMode};
use overlay_interop::headless::{DisplayOp, HeadlessDisplay, HeadlessPresenter};

const PATIENCE: Duration = Duration::from_secs(5);

fn config() -> BridgeConfig {
    BridgeConfig::default()
        .with_acquire_timeout(Duration::from_millis(50))
        .with_retry_backoff(Duration::from_millis(1))
}

fn presenter() -> HeadlessPresenter {
    HeadlessPresenter::new(SurfaceExtents::up_to(Size::new(3840, 2160)))
        .with_frame_interval(Duration::from_millis(2))
}

#[test]
fn child_is_stacked_below_before_anything_is_presented() {
    let display = HeadlessDisplay::new();
    let log = display.log();
    let parent = display.host_surface();
    let presenter = presenter();
    let ledger = presenter.ledger();
    let (guest, recorder) = CountingGuest::with_recorder();

    let mut presented_to = None;
    let overlay = SubsurfaceOverlay::start(
        display,
        parent,
        &config(),
        |_, child| {
            presented_to = Some(*child);
            Ok(presenter)
        },
        guest,
        vulkan_host(),
    )
    .unwrap();

    let child = presented_to.unwrap();
    assert_ne!(child, parent);
    assert_eq!(
        log.ops(),
        vec![
            DisplayOp::CreateSurface(child),
            DisplayOp::CreateSubsurface { child, parent },
            DisplayOp::SetPosition(Offset::ORIGIN),
            DisplayOp::Place(StackingRelation::Below, parent),
            DisplayOp::SetSyncMode(SyncMode::Independent),
            DisplayOp::Commit(child),
            DisplayOp::Roundtrip,
        ]
    );

    assert!(wait_until(PATIENCE, || recorder.presents() >= 3));
    assert!(overlay.is_running());
    assert_eq!(ledger.live_swapchains(), 1);
}

#[test]
fn shutdown_releases_in_dependency_order() {
    let display = HeadlessDisplay::new();
    let log = display.log();
    let parent = display.host_surface();
    let presenter = presenter();
    let ledger = presenter.ledger();
    let (guest, recorder) = CountingGuest::with_recorder();

    let overlay = SubsurfaceOverlay::start(
        display,
        parent,
        &config(),
        |_, _| Ok(presenter),
        guest,
        vulkan_host(),
    )
    .unwrap();
    overlay.resize(Size::new(1920, 1080));
    assert!(wait_until(PATIENCE, || {
        recorder.last_render().map(|(size, _)| size) == Some(Size::new(1920, 1080))
    }));

    let exit = overlay.shutdown().unwrap();
    assert!(matches!(exit, LoopExit::Shutdown));
    assert_eq!(recorder.freed(), 1);
    assert_eq!(ledger.live_swapchains(), 0);
    assert_eq!(ledger.live_views(), 0);
    assert_eq!(log.live_surfaces(), 0);
    assert_eq!(log.live_subsurfaces(), 0);

    let ops = log.ops();
    assert!(matches!(
        &ops[ops.len() - 2..],
        [DisplayOp::DestroySubsurface(_), DisplayOp::DestroySurface(_)]
    ));
}

#[test]
fn configured_offset_and_restack_reach_the_display() {
    let display = HeadlessDisplay::new();
    let log = display.log();
    let parent = display.host_surface();
    let presenter = presenter();
    let (guest, _recorder) = CountingGuest::with_recorder();
    let config = config().with_subsurface_offset(Offset::new(0, 48));

    let mut overlay =
        SubsurfaceOverlay::start(display, parent, &config, |_, _| Ok(presenter), guest, vulkan_host())
            .unwrap();
    overlay.restack(StackingRelation::Above);
    assert_eq!(overlay.stack().unwrap().config().relation, StackingRelation::Above);

    let ops = log.ops();
    assert!(ops.contains(&DisplayOp::SetPosition(Offset::new(0, 48))));
    assert_eq!(ops.last(), Some(&DisplayOp::Place(StackingRelation::Above, parent)));
}

#[test]
fn refused_subsurface_fails_before_any_gpu_work() {
    let display = HeadlessDisplay::new().refuse_subsurfaces();
    let log = display.log();
    let parent = display.host_surface();
    let presenter = presenter();
    let ledger = presenter.ledger();
    let (guest, recorder) = CountingGuest::with_recorder();

    let result = SubsurfaceOverlay::start(
        display,
        parent,
        &config(),
        |_, _| Ok(presenter),
        guest,
        vulkan_host(),
    );
    assert!(result.is_err());
    assert_eq!(ledger.swapchains_created(), 0);
    assert_eq!(recorder.created(), 0);
    assert_eq!(log.live_surfaces(), 0);
}

#[test]
fn guest_creation_failure_tears_everything_down() {
    let display = HeadlessDisplay::new();
    let log = display.log();
    let parent = display.host_surface();
    let presenter = presenter();
    let ledger = presenter.ledger();
    let (guest, recorder) = CountingGuest::with_recorder();
    recorder.fail_creation();

    let result = SubsurfaceOverlay::start(
        display,
        parent,
        &config(),
        |_, _| Ok(presenter),
        guest,
        vulkan_host(),
    );
    assert!(result.is_err());
    assert_eq!(ledger.live_swapchains(), 0);
    assert_eq!(log.live_surfaces(), 0);
}
