//! Stacking relation and synchronization mode of a child surface.

/// Where the child (guest) surface sits relative to its parent (host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StackingRelation {
    /// Child is drawn over the parent.
    Above,
    /// Child is drawn under the parent: the guest provides the background and
    /// the host's UI composites on top of it.
    #[default]
    Below,
}

/// Whether the child's visible updates are gated by the parent's commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncMode {
    /// Child state is applied only when the parent commits.
    Synced,
    /// Child content updates on its own commits. Required for media playback:
    /// otherwise the guest's frame rate is capped at the host's repaint rate.
    #[default]
    Independent,
}
