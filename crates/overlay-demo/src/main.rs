//! Plays a media source through the compositor-level overlay on headless
//! backends: a recording display server and a fake presentation engine
//! paced like a 60 Hz FIFO queue.
//!
//! A real Wayland host swaps both fakes for the `wayland` and `vulkan`
//! backends of `overlay-interop`: wrap the toolkit's connection with
//! `WaylandDisplay::from_foreign_display`, take the parent through
//! `foreign_surface`, and build the presenter inside the `start` closure so it
//! targets the freshly created child:
//!
//! ```ignore
//! let display = unsafe { WaylandDisplay::from_foreign_display(wl_display)? };
//! let parent = unsafe { display.foreign_surface(wl_surface)? };
//! let overlay = SubsurfaceOverlay::start(display, parent, &config, |display, child| unsafe {
//!     VulkanPresenter::from_wayland(device, display.display_ptr(), WaylandDisplay::surface_ptr(child))
//! }, guest, host)?;
//! ```

mod pattern;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use overlay_bridge::{HostContextDescriptor, LoopExit, SubsurfaceOverlay};
use overlay_core::logging::{init_logging, LoggingConfig};
use overlay_core::{BridgeConfig, ColorSpace, FormatPreference, PixelFormat, Size, SurfaceExtents};
use overlay_core::VulkanHandles;
use overlay_interop::headless::{HeadlessDisplay, HeadlessPresenter};
use overlay_interop::SurfaceFormat;
use tracing::{info, warn};

use crate::pattern::TestPattern;

#[derive(Parser)]
#[command(
    name = "overlay-demo",
    version,
    about = "Render a media source underneath a host window"
)]
struct Cli {
    /// Media file or URL to play
    #[arg()]
    media: Option<String>,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 3)]
    seconds: u64,

    /// End of stream after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Initial window size, WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    size: Size,

    /// Resize the window to WIDTHxHEIGHT halfway through
    #[arg(long, value_parser = parse_size)]
    resize: Option<Size>,

    /// Prefer an HDR10 swapchain format
    #[arg(long)]
    hdr: bool,
}

fn parse_size(raw: &str) -> std::result::Result<Size, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("{v:?}: {e}"));
    Ok(Size::new(parse(w)?, parse(h)?))
}

fn headless_presenter() -> HeadlessPresenter {
    HeadlessPresenter::new(SurfaceExtents::up_to(Size::new(7680, 4320)))
        .with_formats(vec![
            SurfaceFormat::SDR_FALLBACK,
            SurfaceFormat {
                format: PixelFormat::A2Bgr10Unorm,
                color_space: ColorSpace::Hdr10St2084,
            },
        ])
        .with_frame_interval(Duration::from_micros(16_667))
}

// Placeholder handles: the pattern guest never dereferences them.
fn headless_device() -> HostContextDescriptor {
    HostContextDescriptor::Vulkan(VulkanHandles {
        instance: 0,
        physical_device: 0,
        device: 0,
        queue: 0,
        queue_family: 0,
        get_instance_proc_addr: 0,
        features: 0,
        device_extensions: Vec::new(),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(media) = cli.media else {
        let program = std::env::args().next().unwrap_or_else(|| "overlay-demo".into());
        eprintln!("Usage: {program} <video-file>");
        std::process::exit(1);
    };

    init_logging(LoggingConfig {
        env_filter: None,
        with_thread_names: true,
    });

    let mut config = BridgeConfig::from_env().with_initial_size(cli.size);
    if cli.hdr {
        config = config.with_format_preference(FormatPreference::Hdr10);
    }
    info!(?config, "starting overlay");

    let display = HeadlessDisplay::new();
    let parent = display.host_surface();
    let presenter = headless_presenter();
    let ledger = presenter.ledger();
    let guest = TestPattern::new(media, cli.frames);
    let rendered = guest.rendered();

    let overlay = SubsurfaceOverlay::start(
        display,
        parent,
        &config,
        |_, _| Ok(presenter),
        guest,
        headless_device(),
    )?;
    let stats = overlay.stats();

    let started = Instant::now();
    let run_for = Duration::from_secs(cli.seconds);
    let mut resize = cli.resize;
    while overlay.is_running() && started.elapsed() < run_for {
        if started.elapsed() >= run_for / 2 {
            if let Some(size) = resize.take() {
                info!(%size, "resizing window");
                overlay.resize(size);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let exit = overlay.shutdown()?;
    if let LoopExit::Fatal(err) = exit {
        return Err(err.into());
    }

    let (presented, skipped) = stats
        .map(|stats| (stats.presented(), stats.skipped()))
        .unwrap_or_default();
    info!(
        rendered = rendered.load(Ordering::Relaxed),
        presented,
        skipped,
        swapchains = ledger.swapchains_created(),
        elapsed = ?started.elapsed(),
        "playback finished"
    );
    if ledger.live_swapchains() != 0 || ledger.live_views() != 0 {
        warn!(
            swapchains = ledger.live_swapchains(),
            views = ledger.live_views(),
            "GPU objects outstanding after shutdown"
        );
    }
    Ok(())
}
