use super::NodeKey;
use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub(crate) struct NodeFlags: u8 {
        /// Derived transform is out of date with respect to local or ancestor state.
        const NEEDS_PARENT_UPDATE = 1 << 0;
        /// Every child must be revisited by the next update pass.
        const NEEDS_CHILD_UPDATE = 1 << 1;
        /// Parent already holds this node in its pending set.
        const PARENT_NOTIFIED = 1 << 2;
        const QUEUED_FOR_UPDATE = 1 << 3;
        const TRANSFORM_STALE = 1 << 4;
        const INHERIT_ORIENTATION = 1 << 5;
        const INHERIT_SCALE = 1 << 6;
    }
}

/// Where a node sits in the update protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeUpdateState {
    Clean,
    SelfDirty,
    PropagatingDirty,
    QueuedForDeferredUpdate,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub(crate) name: Arc<str>,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: BTreeMap<Arc<str>, NodeKey>,
    pub(crate) children_to_update: HashSet<NodeKey>,
    pub(crate) flags: NodeFlags,

    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,
    pub(crate) scale: Vec3,

    pub(crate) derived_position: Vec3,
    pub(crate) derived_orientation: Quat,
    pub(crate) derived_scale: Vec3,
    pub(crate) cached_transform: Mat4,
}

impl SceneNode {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            parent: None,
            children: BTreeMap::new(),
            children_to_update: HashSet::new(),
            flags: NodeFlags::INHERIT_ORIENTATION
                | NodeFlags::INHERIT_SCALE
                | NodeFlags::NEEDS_PARENT_UPDATE
                | NodeFlags::TRANSFORM_STALE,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
            derived_position: Vec3::ZERO,
            derived_orientation: Quat::IDENTITY,
            derived_scale: Vec3::ONE,
            cached_transform: Mat4::IDENTITY,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Position relative to the parent.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn inherit_orientation(&self) -> bool {
        self.flags.contains(NodeFlags::INHERIT_ORIENTATION)
    }

    pub fn inherit_scale(&self) -> bool {
        self.flags.contains(NodeFlags::INHERIT_SCALE)
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.children.values().copied()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn needs_update(&self) -> bool {
        self.flags.contains(NodeFlags::NEEDS_PARENT_UPDATE)
    }

    pub fn pending_children(&self) -> usize {
        self.children_to_update.len()
    }

    pub fn update_state(&self) -> NodeUpdateState {
        if self.flags.contains(NodeFlags::QUEUED_FOR_UPDATE) {
            NodeUpdateState::QueuedForDeferredUpdate
        } else if !self.flags.contains(NodeFlags::NEEDS_PARENT_UPDATE) {
            NodeUpdateState::Clean
        } else if self.flags.contains(NodeFlags::PARENT_NOTIFIED) {
            NodeUpdateState::PropagatingDirty
        } else {
            NodeUpdateState::SelfDirty
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::NEEDS_PARENT_UPDATE)
    }

    /// Whether an update pass starting here would recompute anything.
    pub(crate) fn has_pending_update(&self) -> bool {
        self.is_dirty() || self.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) || !self.children_to_update.is_empty()
    }
}
