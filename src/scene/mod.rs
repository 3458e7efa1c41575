//! Hierarchical transform graph with lazily resolved world transforms.
//!
//! Nodes live in a [`SceneGraph`] arena and are addressed by [`NodeKey`].
//! Mutating a node marks it (and every descendant) stale; derived values are
//! recomputed on read or by an explicit update pass, touching only the nodes
//! that changed.

mod graph;
mod node;
mod scheduler;
mod transform;

pub use graph::SceneGraph;
pub use node::{NodeUpdateState, SceneNode};
pub use scheduler::UpdateScheduler;

slotmap::new_key_type! {
    pub struct NodeKey;
}

/// Reference frame for relative translations and rotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransformSpace {
    /// The node's own axes.
    Local,
    /// The parent's axes. Falls back to world axes for a root.
    #[default]
    Parent,
    World,
}
