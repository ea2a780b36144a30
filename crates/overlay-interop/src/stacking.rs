//! Child surfaces stacked relative to the host's surface.
//!
//! In the compositor-level variant the guest does not draw into the host's
//! surface at all. It gets its own native surface, parented under the host's
//! at a fixed offset, with an explicit stacking relation and sync mode. For a
//! video underlay the relation must be [`StackingRelation::Below`] (host UI
//! composites on top) and the mode [`SyncMode::Independent`] (the guest's
//! frame rate is not tied to the host's repaint rate). Both are kept as
//! configured defaults rather than hard-coded so a host can opt out
//! explicitly.

use std::fmt;

use overlay_core::{BridgeConfig, Offset, Result, StackingRelation, SyncMode};
use tracing::{debug, info};

/// The display-server primitives surface stacking needs.
pub trait DisplayServer {
    type Surface: Clone + fmt::Debug;
    type Subsurface: fmt::Debug;

    fn create_surface(&mut self) -> Result<Self::Surface>;

    /// Make `child` a subsurface of `parent`.
    fn create_subsurface(
        &mut self,
        child: &Self::Surface,
        parent: &Self::Surface,
    ) -> Result<Self::Subsurface>;

    /// Position relative to the parent's origin.
    fn set_position(&mut self, subsurface: &Self::Subsurface, offset: Offset);

    /// Restack the subsurface directly above or below `sibling`.
    fn place(
        &mut self,
        subsurface: &Self::Subsurface,
        relation: StackingRelation,
        sibling: &Self::Surface,
    );

    fn set_sync_mode(&mut self, subsurface: &Self::Subsurface, mode: SyncMode);

    fn commit(&mut self, surface: &Self::Surface);

    /// Block until the server has processed every request sent so far.
    fn roundtrip(&mut self) -> Result<()>;

    fn destroy_subsurface(&mut self, subsurface: Self::Subsurface);

    fn destroy_surface(&mut self, surface: Self::Surface);
}

/// Offset, relation and sync mode for a child surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackingConfig {
    pub offset: Offset,
    pub relation: StackingRelation,
    pub sync_mode: SyncMode,
}

impl From<&BridgeConfig> for StackingConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            offset: config.subsurface_offset,
            relation: config.stacking,
            sync_mode: config.sync_mode,
        }
    }
}

/// A parent (host) surface with one child (guest) surface stacked against it.
pub struct SurfaceStack<D: DisplayServer> {
    display: D,
    parent: D::Surface,
    child: Option<(D::Surface, D::Subsurface)>,
    config: StackingConfig,
}

impl<D: DisplayServer> SurfaceStack<D> {
    /// Create the child surface and relate it to `parent`.
    ///
    /// Ends with a commit on the child and a round-trip, so the relation is
    /// applied server-side before either surface receives content.
    pub fn establish(mut display: D, parent: D::Surface, config: StackingConfig) -> Result<Self> {
        let child = display.create_surface()?;
        let subsurface = match display.create_subsurface(&child, &parent) {
            Ok(subsurface) => subsurface,
            Err(err) => {
                display.destroy_surface(child);
                return Err(err);
            }
        };

        display.set_position(&subsurface, config.offset);
        display.place(&subsurface, config.relation, &parent);
        display.set_sync_mode(&subsurface, config.sync_mode);
        display.commit(&child);

        let mut stack = Self {
            display,
            parent,
            child: Some((child, subsurface)),
            config,
        };
        stack.display.roundtrip()?;

        info!(
            offset = ?config.offset,
            relation = ?config.relation,
            sync = ?config.sync_mode,
            "child surface stacked"
        );
        Ok(stack)
    }

    pub fn parent(&self) -> &D::Surface {
        &self.parent
    }

    /// The guest's surface; `None` after [`teardown`](Self::teardown).
    pub fn child(&self) -> Option<&D::Surface> {
        self.child.as_ref().map(|(surface, _)| surface)
    }

    pub fn config(&self) -> StackingConfig {
        self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Move the child. Takes effect with the parent's next commit.
    pub fn set_offset(&mut self, offset: Offset) {
        if let Some((_, subsurface)) = &self.child {
            self.display.set_position(subsurface, offset);
            self.config.offset = offset;
        }
    }

    /// Restack the child. Takes effect with the parent's next commit.
    pub fn restack(&mut self, relation: StackingRelation) {
        if let Some((_, subsurface)) = &self.child {
            self.display.place(subsurface, relation, &self.parent);
            self.config.relation = relation;
        }
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        if let Some((_, subsurface)) = &self.child {
            self.display.set_sync_mode(subsurface, mode);
            self.config.sync_mode = mode;
        }
    }

    /// Destroy the subsurface relation, then the child surface. Idempotent.
    ///
    /// Anything presenting to the child (a swapchain) must be gone first.
    pub fn teardown(&mut self) {
        if let Some((surface, subsurface)) = self.child.take() {
            self.display.destroy_subsurface(subsurface);
            self.display.destroy_surface(surface);
            debug!("child surface destroyed");
        }
    }
}

impl<D: DisplayServer> Drop for SurfaceStack<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DisplayOp, HeadlessDisplay};

    #[test]
    fn establish_relates_then_commits_then_roundtrips() {
        let display = HeadlessDisplay::new();
        let log = display.log();
        let parent = display.host_surface();
        let stack = SurfaceStack::establish(display, parent, StackingConfig::default()).unwrap();
        let child = *stack.child().unwrap();

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
    }

    #[test]
    fn custom_offset_and_relation_are_applied() {
        let display = HeadlessDisplay::new();
        let log = display.log();
        let parent = display.host_surface();
        let config = StackingConfig {
            offset: Offset::new(12, -4),
            relation: StackingRelation::Above,
            sync_mode: SyncMode::Synced,
        };
        let stack = SurfaceStack::establish(display, parent, config).unwrap();
        assert_eq!(stack.config(), config);
        let ops = log.ops();
        assert!(ops.contains(&DisplayOp::SetPosition(Offset::new(12, -4))));
        assert!(ops.contains(&DisplayOp::Place(StackingRelation::Above, parent)));
        assert!(ops.contains(&DisplayOp::SetSyncMode(SyncMode::Synced)));
    }

    #[test]
    fn failed_subsurface_destroys_the_child() {
        let display = HeadlessDisplay::new().refuse_subsurfaces();
        let log = display.log();
        let parent = display.host_surface();
        assert!(SurfaceStack::establish(display, parent, StackingConfig::default()).is_err());
        assert_eq!(log.live_surfaces(), 0);
    }

    #[test]
    fn teardown_is_idempotent_and_runs_on_drop() {
        let display = HeadlessDisplay::new();
        let log = display.log();
        let parent = display.host_surface();
        let mut stack = SurfaceStack::establish(display, parent, StackingConfig::default()).unwrap();
        stack.teardown();
        stack.teardown();
        drop(stack);
        assert_eq!(log.live_surfaces(), 0);
        assert_eq!(log.live_subsurfaces(), 0);
    }
}
