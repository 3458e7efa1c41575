use super::node::{NodeFlags, NodeUpdateState, SceneNode};
use super::scheduler::UpdateScheduler;
use super::NodeKey;
use crate::error::SceneError;
use glam::{Quat, Vec3};
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    pub(crate) nodes: SlotMap<NodeKey, SceneNode>,
    roots: BTreeSet<NodeKey>,
    scheduler: UpdateScheduler,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&SceneNode, SceneError> {
        self.nodes.get(key).ok_or(SceneError::NodeNotFound)
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(key).ok_or(SceneError::NodeNotFound)
    }

    pub(crate) fn name_of(&self, key: NodeKey) -> String {
        self.nodes.get(key).map(|node| node.name.to_string()).unwrap_or_default()
    }

    pub fn name(&self, key: NodeKey) -> Result<&str, SceneError> {
        Ok(self.node(key)?.name())
    }

    pub fn parent(&self, key: NodeKey) -> Result<Option<NodeKey>, SceneError> {
        Ok(self.node(key)?.parent)
    }

    pub fn num_children(&self, key: NodeKey) -> Result<usize, SceneError> {
        Ok(self.node(key)?.children.len())
    }

    /// Parentless nodes in key order.
    pub fn roots(&self) -> Vec<NodeKey> {
        self.roots.iter().copied().collect()
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn node_state(&self, key: NodeKey) -> Result<NodeUpdateState, SceneError> {
        Ok(self.node(key)?.update_state())
    }

    /// Creates a detached root node.
    pub fn create_node(&mut self, name: &str) -> NodeKey {
        let key = self.nodes.insert(SceneNode::new(Arc::from(name)));
        self.roots.insert(key);
        log::trace!("created scene node '{name}'");
        key
    }

    /// Creates a node under `parent` with the given local placement.
    pub fn create_child(
        &mut self,
        parent: NodeKey,
        name: &str,
        translate: Vec3,
        rotate: Quat,
    ) -> Result<NodeKey, SceneError> {
        self.node(parent)?;
        let key = self.create_node(name);
        let attached = self
            .set_position(key, translate)
            .and_then(|()| self.set_orientation(key, rotate))
            .and_then(|()| self.add_child(parent, key));
        if let Err(err) = attached {
            self.roots.remove(&key);
            self.nodes.remove(key);
            return Err(err);
        }
        Ok(key)
    }

    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), SceneError> {
        let parent_node = self.node(parent)?;
        let child_node = self.node(child)?;
        if let Some(current) = child_node.parent {
            return Err(SceneError::AlreadyParented {
                child: child_node.name.to_string(),
                parent: self.name_of(current),
            });
        }
        if parent_node.children.contains_key(&child_node.name) {
            return Err(SceneError::DuplicateChildName {
                parent: parent_node.name.to_string(),
                name: child_node.name.to_string(),
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::WouldCycle {
                parent: parent_node.name.to_string(),
                child: child_node.name.to_string(),
            });
        }

        let name = child_node.name.clone();
        self.node_mut(parent)?.children.insert(name, child);
        self.set_parent(child, Some(parent));
        Ok(())
    }

    /// Child at `index` in name order.
    pub fn child(&self, parent: NodeKey, index: usize) -> Result<NodeKey, SceneError> {
        let node = self.node(parent)?;
        node.children.values().nth(index).copied().ok_or_else(|| SceneError::ChildIndexOutOfBounds {
            parent: node.name.to_string(),
            index,
            len: node.children.len(),
        })
    }

    pub fn child_by_name(&self, parent: NodeKey, name: &str) -> Result<NodeKey, SceneError> {
        let node = self.node(parent)?;
        node.children.get(name).copied().ok_or_else(|| SceneError::ChildNotFound {
            parent: node.name.to_string(),
            name: name.to_string(),
        })
    }

    pub fn remove_child_at(&mut self, parent: NodeKey, index: usize) -> Result<NodeKey, SceneError> {
        let child = self.child(parent, index)?;
        self.detach(parent, child)?;
        Ok(child)
    }

    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<NodeKey, SceneError> {
        let parent_node = self.node(parent)?;
        let child_node = self.node(child)?;
        if child_node.parent != Some(parent) {
            return Err(SceneError::NotAChild {
                parent: parent_node.name.to_string(),
                child: child_node.name.to_string(),
            });
        }
        self.detach(parent, child)?;
        Ok(child)
    }

    pub fn remove_child_by_name(&mut self, parent: NodeKey, name: &str) -> Result<NodeKey, SceneError> {
        let child = self.child_by_name(parent, name)?;
        self.detach(parent, child)?;
        Ok(child)
    }

    /// Detaches every child of `parent`; each becomes a root.
    pub fn remove_all_children(&mut self, parent: NodeKey) -> Result<Vec<NodeKey>, SceneError> {
        let node = self.node_mut(parent)?;
        let children: Vec<NodeKey> = std::mem::take(&mut node.children).into_values().collect();
        node.children_to_update.clear();
        for &child in &children {
            self.set_parent(child, None);
        }
        Ok(children)
    }

    /// Removes `key` from the graph. Its children are kept as roots.
    pub fn destroy_node(&mut self, key: NodeKey) -> Result<(), SceneError> {
        self.remove_all_children(key)?;
        if let Some(parent) = self.node(key)?.parent {
            self.detach(parent, key)?;
        }
        self.scheduler.remove(key);
        self.roots.remove(&key);
        self.nodes.remove(key);
        Ok(())
    }

    /// Removes `key` and all of its descendants.
    pub fn destroy_subtree(&mut self, key: NodeKey) -> Result<usize, SceneError> {
        if let Some(parent) = self.node(key)?.parent {
            self.detach(parent, key)?;
        }
        let mut stack: SmallVec<[NodeKey; 16]> = SmallVec::new();
        stack.push(key);
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children.into_values());
                self.scheduler.remove(current);
                self.roots.remove(&current);
                removed += 1;
            }
        }
        log::debug!("destroyed {removed} scene nodes");
        Ok(removed)
    }

    fn detach(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), SceneError> {
        self.cancel_update(parent, child);
        let name = self.node(child)?.name.clone();
        self.node_mut(parent)?.children.remove(&name);
        self.set_parent(child, None);
        Ok(())
    }

    fn set_parent(&mut self, key: NodeKey, parent: Option<NodeKey>) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = parent;
            if parent.is_some() {
                self.roots.remove(&key);
            } else {
                self.roots.insert(key);
            }
            node.flags.remove(NodeFlags::PARENT_NOTIFIED);
            self.need_update(key, false);
        }
    }

    fn is_ancestor_or_self(&self, candidate: NodeKey, mut key: NodeKey) -> bool {
        loop {
            if key == candidate {
                return true;
            }
            match self.nodes.get(key).and_then(|node| node.parent) {
                Some(parent) => key = parent,
                None => return false,
            }
        }
    }

    /// Marks `key` stale and asks its ancestors to revisit it on the next
    /// update pass. With `force_parent_update` the parent is notified even if
    /// it already was during this dirty episode.
    pub fn need_update(&mut self, key: NodeKey, force_parent_update: bool) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.flags |= NodeFlags::NEEDS_PARENT_UPDATE | NodeFlags::NEEDS_CHILD_UPDATE | NodeFlags::TRANSFORM_STALE;
        node.children_to_update.clear();

        let notify = match node.parent {
            Some(parent) if force_parent_update || !node.flags.contains(NodeFlags::PARENT_NOTIFIED) => {
                node.flags.insert(NodeFlags::PARENT_NOTIFIED);
                Some(parent)
            }
            _ => None,
        };

        self.invalidate_descendants(key);
        if let Some(parent) = notify {
            self.request_update(parent, key, force_parent_update);
        }
    }

    /// Registers `child` in `parent`'s pending set and bubbles the request up
    /// once per dirty episode.
    pub fn request_update(&mut self, parent: NodeKey, child: NodeKey, force_parent_update: bool) {
        let (mut current, mut pending) = (parent, child);
        while let Some(node) = self.nodes.get_mut(current) {
            if node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) {
                return;
            }
            node.children_to_update.insert(pending);
            match node.parent {
                Some(grandparent) if force_parent_update || !node.flags.contains(NodeFlags::PARENT_NOTIFIED) => {
                    node.flags.insert(NodeFlags::PARENT_NOTIFIED);
                    pending = current;
                    current = grandparent;
                }
                _ => return,
            }
        }
    }

    /// Withdraws `child` from `parent`'s pending set, unwinding the
    /// notification chain once nothing below an ancestor is pending.
    pub fn cancel_update(&mut self, parent: NodeKey, child: NodeKey) {
        let (mut current, mut pending) = (parent, child);
        while let Some(node) = self.nodes.get_mut(current) {
            node.children_to_update.remove(&pending);
            if !node.children_to_update.is_empty() || node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE) {
                return;
            }
            let Some(grandparent) = node.parent else {
                return;
            };
            node.flags.remove(NodeFlags::PARENT_NOTIFIED);
            pending = current;
            current = grandparent;
        }
    }

    /// Defers `need_update(key, true)` to the next flush.
    pub fn queue_need_update(&mut self, key: NodeKey) -> Result<(), SceneError> {
        let node = self.node_mut(key)?;
        if !node.flags.contains(NodeFlags::QUEUED_FOR_UPDATE) {
            node.flags.insert(NodeFlags::QUEUED_FOR_UPDATE);
            self.scheduler.push(key);
        }
        Ok(())
    }

    pub fn process_queued_updates(&mut self) -> usize {
        let queued = self.scheduler.take();
        let mut flushed = 0;
        for key in queued {
            if let Some(node) = self.nodes.get_mut(key) {
                node.flags.remove(NodeFlags::QUEUED_FOR_UPDATE);
                self.need_update(key, true);
                flushed += 1;
            }
        }
        if flushed > 0 {
            log::debug!("flushed {flushed} queued scene node updates");
        }
        flushed
    }

    // A stale node implies stale descendants; stop at subtrees already stale.
    fn invalidate_descendants(&mut self, key: NodeKey) {
        let mut stack: SmallVec<[NodeKey; 16]> = SmallVec::new();
        if let Some(node) = self.nodes.get(key) {
            stack.extend(node.children.values().copied());
        }
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            if node.is_dirty() {
                continue;
            }
            node.flags |= NodeFlags::NEEDS_PARENT_UPDATE | NodeFlags::TRANSFORM_STALE;
            stack.extend(node.children.values().copied());
        }
    }

    /// Brings `key`'s derived state up to date, recomputing the stale part of
    /// its ancestor chain top-down.
    pub(crate) fn resolve(&mut self, key: NodeKey) -> Result<(), SceneError> {
        let mut chain: SmallVec<[NodeKey; 16]> = SmallVec::new();
        let mut current = Some(key);
        while let Some(k) = current {
            let node = self.node(k)?;
            if !node.is_dirty() {
                break;
            }
            chain.push(k);
            current = node.parent;
        }
        for &k in chain.iter().rev() {
            self.update_from_parent(k);
        }
        Ok(())
    }

    // Assumes the parent is already resolved.
    fn update_from_parent(&mut self, key: NodeKey) {
        let parent = self
            .nodes
            .get(key)
            .and_then(|node| node.parent)
            .and_then(|parent| self.nodes.get(parent))
            .map(|p| (p.derived_orientation, p.derived_scale, p.derived_position));
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        match parent {
            Some((orientation, scale, position)) => {
                node.derived_orientation = if node.inherit_orientation() {
                    orientation * node.orientation
                } else {
                    node.orientation
                };
                node.derived_scale = if node.inherit_scale() { scale * node.scale } else { node.scale };
                node.derived_position = orientation * (scale * node.position) + position;
            }
            None => {
                node.derived_orientation = node.orientation;
                node.derived_scale = node.scale;
                node.derived_position = node.position;
            }
        }
        node.flags.remove(NodeFlags::NEEDS_PARENT_UPDATE);
        node.flags.insert(NodeFlags::TRANSFORM_STALE);
    }

    /// Batch update of `key`. Recomputes it when stale or when
    /// `parent_changed`; with `update_children` visits every child if the
    /// whole subtree changed, otherwise only the pending ones.
    pub fn update(&mut self, key: NodeKey, update_children: bool, parent_changed: bool) -> Result<(), SceneError> {
        if let Some(parent) = self.node(key)?.parent {
            self.resolve(parent)?;
        }
        self.update_node(key, update_children, parent_changed);
        Ok(())
    }

    fn update_node(&mut self, key: NodeKey, update_children: bool, parent_changed: bool) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        node.flags.remove(NodeFlags::PARENT_NOTIFIED);
        if node.is_dirty() || parent_changed {
            self.update_from_parent(key);
        }
        if !update_children {
            return;
        }

        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let all = parent_changed || node.flags.contains(NodeFlags::NEEDS_CHILD_UPDATE);
        let targets: SmallVec<[NodeKey; 8]> = if all {
            node.children.values().copied().collect()
        } else {
            node.children_to_update.iter().copied().collect()
        };
        node.children_to_update.clear();
        node.flags.remove(NodeFlags::NEEDS_CHILD_UPDATE);

        for child in targets {
            self.update_node(child, true, all);
        }
    }

    /// Flushes queued updates, then updates the roots that are stale or have
    /// pending descendants. Clean branches are not entered.
    pub fn update_all(&mut self) {
        self.process_queued_updates();
        let pending: SmallVec<[NodeKey; 8]> = self
            .roots
            .iter()
            .copied()
            .filter(|&root| self.nodes.get(root).is_some_and(SceneNode::has_pending_update))
            .collect();
        for root in pending {
            self.update_node(root, true, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_nodes_start_dirty_and_unparented() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        assert_eq!(graph.node_state(root).unwrap(), NodeUpdateState::SelfDirty);
        assert_eq!(graph.parent(root).unwrap(), None);
        assert_eq!(graph.roots(), vec![root]);
    }

    #[test]
    fn adding_child_notifies_parent_once() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let arm = graph.create_node("arm");
        graph.update_all();
        assert_eq!(graph.node_state(root).unwrap(), NodeUpdateState::Clean);

        graph.add_child(root, arm).unwrap();
        assert_eq!(graph.node_state(arm).unwrap(), NodeUpdateState::PropagatingDirty);
        assert_eq!(graph.node(root).unwrap().pending_children(), 1);

        graph.update_all();
        assert_eq!(graph.node_state(arm).unwrap(), NodeUpdateState::Clean);
        assert_eq!(graph.node(root).unwrap().pending_children(), 0);
    }

    #[test]
    fn cancel_update_unwinds_notification_chain() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let mid = graph.create_node("mid");
        let leaf = graph.create_node("leaf");
        graph.add_child(root, mid).unwrap();
        graph.add_child(mid, leaf).unwrap();
        graph.update_all();

        graph.need_update(leaf, false);
        assert_eq!(graph.node(mid).unwrap().pending_children(), 1);
        assert_eq!(graph.node(root).unwrap().pending_children(), 1);

        graph.remove_child(mid, leaf).unwrap();
        assert_eq!(graph.node(mid).unwrap().pending_children(), 0);
        assert_eq!(graph.node(root).unwrap().pending_children(), 0);
        assert!(graph.node(leaf).unwrap().is_root());
    }

    #[test]
    fn duplicate_sibling_names_are_rejected() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        graph.create_child(root, "hand", Vec3::ZERO, Quat::IDENTITY).unwrap();
        let err = graph.create_child(root, "hand", Vec3::X, Quat::IDENTITY).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateChildName { .. }));
        assert_eq!(graph.num_children(root).unwrap(), 1);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn adding_an_ancestor_is_a_cycle() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let child = graph.create_child(root, "child", Vec3::ZERO, Quat::IDENTITY).unwrap();
        let err = graph.add_child(child, root).unwrap_err();
        assert!(matches!(err, SceneError::WouldCycle { .. }));
        assert!(matches!(graph.add_child(root, root), Err(SceneError::WouldCycle { .. })));
    }

    #[test]
    fn child_lookup_by_index_follows_name_order() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let b = graph.create_child(root, "b", Vec3::ZERO, Quat::IDENTITY).unwrap();
        let a = graph.create_child(root, "a", Vec3::ZERO, Quat::IDENTITY).unwrap();
        assert_eq!(graph.child(root, 0).unwrap(), a);
        assert_eq!(graph.child(root, 1).unwrap(), b);
        assert!(matches!(
            graph.child(root, 2),
            Err(SceneError::ChildIndexOutOfBounds { index: 2, len: 2, .. })
        ));
        assert_eq!(graph.remove_child_at(root, 0).unwrap(), a);
        assert_eq!(graph.num_children(root).unwrap(), 1);
    }

    #[test]
    fn destroy_node_keeps_children_as_roots() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let mid = graph.create_child(root, "mid", Vec3::ZERO, Quat::IDENTITY).unwrap();
        let leaf = graph.create_child(mid, "leaf", Vec3::ZERO, Quat::IDENTITY).unwrap();

        graph.destroy_node(mid).unwrap();
        assert!(!graph.contains(mid));
        assert_eq!(graph.num_children(root).unwrap(), 0);
        assert_eq!(graph.parent(leaf).unwrap(), None);
        assert_eq!(graph.node(mid).unwrap_err(), SceneError::NodeNotFound);
    }

    #[test]
    fn destroy_subtree_removes_descendants() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let mid = graph.create_child(root, "mid", Vec3::ZERO, Quat::IDENTITY).unwrap();
        let leaf = graph.create_child(mid, "leaf", Vec3::ZERO, Quat::IDENTITY).unwrap();
        graph.queue_need_update(leaf).unwrap();

        assert_eq!(graph.destroy_subtree(mid).unwrap(), 2);
        assert!(!graph.contains(leaf));
        assert!(graph.scheduler().is_empty());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn root_set_follows_reparenting_and_destruction() {
        let mut graph = SceneGraph::new();
        let a = graph.create_node("a");
        let b = graph.create_node("b");
        let c = graph.create_child(a, "c", Vec3::ZERO, Quat::IDENTITY).unwrap();
        assert_eq!(graph.roots().len(), 2);
        assert!(!graph.roots().contains(&c));

        graph.add_child(a, b).unwrap();
        assert_eq!(graph.roots(), vec![a]);
        assert!(graph.create_child(a, "b", Vec3::ZERO, Quat::IDENTITY).is_err());
        assert_eq!(graph.roots(), vec![a]);

        graph.remove_all_children(a).unwrap();
        let mut roots = graph.roots();
        roots.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(roots, expected);

        graph.add_child(b, c).unwrap();
        graph.destroy_node(a).unwrap();
        assert_eq!(graph.roots(), vec![b]);
        graph.destroy_subtree(b).unwrap();
        assert!(graph.roots().is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn update_all_only_enters_changed_roots() {
        let mut graph = SceneGraph::new();
        let left = graph.create_node("left");
        let right = graph.create_node("right");
        let leaf = graph.create_child(right, "leaf", Vec3::X, Quat::IDENTITY).unwrap();
        graph.update_all();

        graph.set_position(right, Vec3::new(0.0, 4.0, 0.0)).unwrap();
        assert!(!graph.node(left).unwrap().has_pending_update());
        assert!(graph.node(right).unwrap().has_pending_update());

        graph.update_all();
        for key in [left, right, leaf] {
            assert_eq!(graph.node_state(key).unwrap(), NodeUpdateState::Clean);
            assert!(!graph.node(key).unwrap().has_pending_update());
        }
        assert_eq!(graph.node(leaf).unwrap().derived_position, Vec3::new(1.0, 4.0, 0.0));
    }

    #[test]
    fn queued_updates_flush_with_forced_propagation() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let child = graph.create_child(root, "child", Vec3::ZERO, Quat::IDENTITY).unwrap();
        graph.update_all();

        graph.queue_need_update(child).unwrap();
        graph.queue_need_update(child).unwrap();
        assert_eq!(graph.scheduler().len(), 1);
        assert_eq!(graph.node_state(child).unwrap(), NodeUpdateState::QueuedForDeferredUpdate);

        assert_eq!(graph.process_queued_updates(), 1);
        assert_eq!(graph.node_state(child).unwrap(), NodeUpdateState::PropagatingDirty);
        assert_eq!(graph.node(root).unwrap().pending_children(), 1);
    }
}
