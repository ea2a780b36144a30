//! In-process embedding: pipeline hooks driven by a fake host.

mod common;

use std::sync::Arc;
use std::thread;

use common::{CountingGuest, FakeHost};
use overlay_bridge::{
    BridgeError, FrameSignal, HookPlan, PipelineHooks, PipelineStage, RepaintMailbox, SignalState,
};
use overlay_core::Size;

const FRAME: [PipelineStage; 3] = [
    PipelineStage::Synchronize,
    PipelineStage::BeforeRendering,
    PipelineStage::AfterPresent,
];

fn frame(hooks: &mut PipelineHooks<CountingGuest>, host: &mut FakeHost) {
    for stage in FRAME {
        hooks.on_stage(stage, host).unwrap();
    }
}

fn attach(plan: HookPlan) -> (PipelineHooks<CountingGuest>, FakeHost, common::Recorder, RepaintMailbox) {
    let (guest, recorder) = CountingGuest::with_recorder();
    let (scheduler, mailbox) = RepaintMailbox::channel();
    let hooks = PipelineHooks::attach(guest, plan, FrameSignal::new(scheduler));
    let host = FakeHost::new(recorder.clone());
    (hooks, host, recorder, mailbox)
}

#[test]
fn guest_context_waits_for_a_valid_host_context() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    host.context_valid = false;
    frame(&mut hooks, &mut host);
    assert!(!hooks.has_context());
    assert_eq!(recorder.render_count(), 0);

    host.context_valid = true;
    for _ in 0..10 {
        frame(&mut hooks, &mut host);
    }
    assert_eq!(recorder.created(), 1);
    assert_eq!(hooks.contexts_created(), 1);
    assert_eq!(host.underlay_prepared, 1);
    assert_eq!(recorder.render_count(), 10);
    assert_eq!(recorder.presents(), 10);
}

#[test]
fn render_size_is_window_size_times_pixel_ratio() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    host.window = Size::new(640, 360);
    host.dpr = 2.0;
    frame(&mut hooks, &mut host);
    assert_eq!(hooks.target_size(), Some(Size::new(1280, 720)));
    assert_eq!(recorder.last_render().unwrap().0, Size::new(1280, 720));

    host.window = Size::new(960, 540);
    frame(&mut hooks, &mut host);
    assert_eq!(recorder.last_render().unwrap().0, Size::new(1920, 1080));
}

#[test]
fn minimized_window_skips_rendering() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    host.window = Size::new(0, 360);
    frame(&mut hooks, &mut host);
    assert!(hooks.has_context());
    assert_eq!(recorder.render_count(), 0);
}

#[test]
fn invalidate_recreate_cycles_pair_every_create_with_one_free() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    for cycle in 1..=5 {
        frame(&mut hooks, &mut host);
        assert_eq!(recorder.created(), cycle);
        hooks.invalidate(&mut host);
        // freed and host told before invalidate returned
        assert_eq!(recorder.freed(), cycle);
        assert_eq!(host.invalidations, cycle);
        assert!(!hooks.has_context());
    }
    hooks.invalidate(&mut host);
    assert_eq!(recorder.freed(), 5);
    assert_eq!(recorder.freed_with_callback(), 0);
    assert_eq!(host.invalidations, 6);
    assert_eq!(host.underlay_prepared, 1);
}

#[test]
fn detach_frees_and_ignores_later_stages() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);
    hooks.detach();
    frame(&mut hooks, &mut host);
    assert!(!hooks.is_attached());
    assert_eq!(recorder.created(), 1);
    assert_eq!(recorder.freed(), 1);
    assert_eq!(recorder.render_count(), 1);
    // the host context outlives a detach
    assert_eq!(host.invalidations, 0);
}

#[test]
fn dropping_the_hooks_frees_the_context() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);
    drop(hooks);
    assert_eq!(recorder.freed(), 1);
    assert_eq!(recorder.freed_with_callback(), 0);
}

#[test]
fn split_stage_brackets_the_draw_and_restores_state() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::split_stage());
    hooks.on_stage(PipelineStage::Synchronize, &mut host).unwrap();
    hooks.on_stage(PipelineStage::BeforeRendering, &mut host).unwrap();
    assert!(hooks.has_context());
    assert!(recorder.trail().is_empty());

    hooks.on_stage(PipelineStage::RenderPassRecording, &mut host).unwrap();
    assert_eq!(recorder.trail(), vec!["begin", "save", "render", "restore", "end"]);
}

#[test]
fn single_stage_saves_state_without_bracketing() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);
    assert_eq!(recorder.trail(), vec!["save", "render", "restore"]);
}

#[test]
fn flip_follows_the_api_unless_overridden() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);
    // the fake host hands out Vulkan contexts
    assert!(!recorder.last_render().unwrap().1);

    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage().with_flip_y(true));
    frame(&mut hooks, &mut host);
    assert!(recorder.last_render().unwrap().1);
}

#[test]
fn creation_failure_is_reported() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    recorder.fail_creation();
    let err = hooks
        .on_stage(PipelineStage::BeforeRendering, &mut host)
        .unwrap_err();
    assert!(matches!(err, BridgeError::ContextCreation(_)));
    assert!(!hooks.has_context());
}

#[test]
fn callback_storm_schedules_one_repaint_per_frame() {
    let (mut hooks, mut host, recorder, mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);

    let storms: Vec<_> = (0..4)
        .map(|_| {
            let recorder = recorder.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    assert!(recorder.fire_update());
                }
            })
        })
        .collect();
    for storm in storms {
        storm.join().unwrap();
    }

    let signal = Arc::clone(hooks.signal());
    assert_eq!(signal.notifications(), 1000);
    assert_eq!(signal.scheduled(), 1);
    assert_eq!(signal.state(), SignalState::RepaintRequested);
    assert!(mailbox.try_take());
    assert!(!mailbox.try_take());

    frame(&mut hooks, &mut host);
    assert_eq!(signal.state(), SignalState::Idle);

    recorder.fire_update();
    assert_eq!(signal.scheduled(), 2);
    assert!(mailbox.try_take());
}

#[test]
fn updates_after_invalidation_go_nowhere() {
    let (mut hooks, mut host, recorder, _mailbox) = attach(HookPlan::single_stage());
    frame(&mut hooks, &mut host);
    hooks.invalidate(&mut host);
    assert!(!recorder.fire_update());
    assert_eq!(hooks.signal().notifications(), 0);
}
