use super::graph::SceneGraph;
use super::node::NodeFlags;
use super::{NodeKey, TransformSpace};
use crate::error::SceneError;
use glam::{Mat3, Mat4, Quat, Vec3};

fn valid_rotation(q: Quat) -> bool {
    q.is_finite() && q.length_squared() > 0.0
}

impl SceneGraph {
    fn invalid_position(&self, key: NodeKey) -> SceneError {
        SceneError::InvalidPosition { node: self.name_of(key) }
    }

    fn invalid_orientation(&self, key: NodeKey) -> SceneError {
        SceneError::InvalidOrientation { node: self.name_of(key) }
    }

    pub fn set_position(&mut self, key: NodeKey, position: Vec3) -> Result<(), SceneError> {
        self.node(key)?;
        if !position.is_finite() {
            return Err(self.invalid_position(key));
        }
        self.node_mut(key)?.position = position;
        self.need_update(key, false);
        Ok(())
    }

    /// Stores `orientation` normalized. Zero-length or non-finite input is
    /// rejected.
    pub fn set_orientation(&mut self, key: NodeKey, orientation: Quat) -> Result<(), SceneError> {
        self.node(key)?;
        if !valid_rotation(orientation) {
            return Err(self.invalid_orientation(key));
        }
        self.node_mut(key)?.orientation = orientation.normalize();
        self.need_update(key, false);
        Ok(())
    }

    pub fn set_scale(&mut self, key: NodeKey, scale: Vec3) -> Result<(), SceneError> {
        self.node(key)?;
        if !scale.is_finite() {
            return Err(SceneError::InvalidScale { node: self.name_of(key) });
        }
        self.node_mut(key)?.scale = scale;
        self.need_update(key, false);
        Ok(())
    }

    pub fn reset_orientation(&mut self, key: NodeKey) -> Result<(), SceneError> {
        self.set_orientation(key, Quat::IDENTITY)
    }

    pub fn set_inherit_orientation(&mut self, key: NodeKey, inherit: bool) -> Result<(), SceneError> {
        self.node_mut(key)?.flags.set(NodeFlags::INHERIT_ORIENTATION, inherit);
        self.need_update(key, false);
        Ok(())
    }

    pub fn set_inherit_scale(&mut self, key: NodeKey, inherit: bool) -> Result<(), SceneError> {
        self.node_mut(key)?.flags.set(NodeFlags::INHERIT_SCALE, inherit);
        self.need_update(key, false);
        Ok(())
    }

    /// Moves the node by `delta` expressed in `space`.
    pub fn translate(&mut self, key: NodeKey, delta: Vec3, space: TransformSpace) -> Result<(), SceneError> {
        let node = self.node(key)?;
        if !delta.is_finite() {
            return Err(self.invalid_position(key));
        }
        let (orientation, parent) = (node.orientation, node.parent);
        let offset = match (space, parent) {
            (TransformSpace::Local, _) => orientation * delta,
            (TransformSpace::World, Some(parent)) => self.convert_world_to_local_direction(parent, delta, true)?,
            (TransformSpace::World, None) | (TransformSpace::Parent, _) => delta,
        };
        let position = self.node(key)?.position + offset;
        self.set_position(key, position)
    }

    /// Moves along the given axes; `movement` holds the distance per axis.
    pub fn translate_along_axes(
        &mut self,
        key: NodeKey,
        axes: Mat3,
        movement: Vec3,
        space: TransformSpace,
    ) -> Result<(), SceneError> {
        self.translate(key, axes * movement, space)
    }

    pub fn rotate(&mut self, key: NodeKey, rotation: Quat, space: TransformSpace) -> Result<(), SceneError> {
        self.node(key)?;
        if !valid_rotation(rotation) {
            return Err(self.invalid_orientation(key));
        }
        let q = rotation.normalize();
        let current = self.node(key)?.orientation;
        let orientation = match space {
            TransformSpace::Parent => q * current,
            TransformSpace::Local => current * q,
            TransformSpace::World => {
                let derived = self.derived_orientation(key)?;
                current * derived.inverse() * q * derived
            }
        };
        self.set_orientation(key, orientation.normalize())
    }

    pub fn rotate_axis_angle(
        &mut self,
        key: NodeKey,
        axis: Vec3,
        angle: f32,
        space: TransformSpace,
    ) -> Result<(), SceneError> {
        self.node(key)?;
        let axis = match axis.try_normalize() {
            Some(axis) if angle.is_finite() => axis,
            _ => return Err(self.invalid_orientation(key)),
        };
        self.rotate(key, Quat::from_axis_angle(axis, angle), space)
    }

    /// Rotation about the Z axis of `space`.
    pub fn roll(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> Result<(), SceneError> {
        self.rotate_axis_angle(key, Vec3::Z, angle, space)
    }

    /// Rotation about the X axis of `space`.
    pub fn pitch(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> Result<(), SceneError> {
        self.rotate_axis_angle(key, Vec3::X, angle, space)
    }

    /// Rotation about the Y axis of `space`.
    pub fn yaw(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> Result<(), SceneError> {
        self.rotate_axis_angle(key, Vec3::Y, angle, space)
    }

    /// Multiplies the local scale component-wise.
    pub fn scale(&mut self, key: NodeKey, factor: Vec3) -> Result<(), SceneError> {
        let scale = self.node(key)?.scale * factor;
        self.set_scale(key, scale)
    }

    /// Columns are the node's local X, Y and Z axes in parent space.
    pub fn local_axes(&self, key: NodeKey) -> Result<Mat3, SceneError> {
        Ok(Mat3::from_quat(self.node(key)?.orientation))
    }

    pub fn derived_position(&mut self, key: NodeKey) -> Result<Vec3, SceneError> {
        self.resolve(key)?;
        Ok(self.node(key)?.derived_position)
    }

    pub fn derived_orientation(&mut self, key: NodeKey) -> Result<Quat, SceneError> {
        self.resolve(key)?;
        Ok(self.node(key)?.derived_orientation)
    }

    pub fn derived_scale(&mut self, key: NodeKey) -> Result<Vec3, SceneError> {
        self.resolve(key)?;
        Ok(self.node(key)?.derived_scale)
    }

    /// World transform built from the derived scale, orientation and position.
    pub fn full_transform(&mut self, key: NodeKey) -> Result<Mat4, SceneError> {
        self.resolve(key)?;
        let node = self.node_mut(key)?;
        if node.flags.contains(NodeFlags::TRANSFORM_STALE) {
            node.cached_transform = Mat4::from_scale_rotation_translation(
                node.derived_scale,
                node.derived_orientation,
                node.derived_position,
            );
            node.flags.remove(NodeFlags::TRANSFORM_STALE);
        }
        Ok(node.cached_transform)
    }

    /// Places the node at a world position. Roots take `position` directly.
    pub fn set_derived_position(&mut self, key: NodeKey, position: Vec3) -> Result<(), SceneError> {
        if !position.is_finite() {
            self.node(key)?;
            return Err(self.invalid_position(key));
        }
        let local = match self.node(key)?.parent {
            Some(parent) => self.convert_world_to_local_position(parent, position)?,
            None => position,
        };
        self.set_position(key, local)
    }

    pub fn set_derived_orientation(&mut self, key: NodeKey, orientation: Quat) -> Result<(), SceneError> {
        if !valid_rotation(orientation) {
            self.node(key)?;
            return Err(self.invalid_orientation(key));
        }
        let local = match self.node(key)?.parent {
            Some(parent) => self.convert_world_to_local_orientation(parent, orientation.normalize())?,
            None => orientation,
        };
        self.set_orientation(key, local)
    }

    pub fn convert_world_to_local_position(&mut self, key: NodeKey, world: Vec3) -> Result<Vec3, SceneError> {
        self.resolve(key)?;
        let node = self.node(key)?;
        Ok(node.derived_orientation.inverse() * (world - node.derived_position) / node.derived_scale)
    }

    pub fn convert_local_to_world_position(&mut self, key: NodeKey, local: Vec3) -> Result<Vec3, SceneError> {
        Ok(self.full_transform(key)?.transform_point3(local))
    }

    pub fn convert_world_to_local_direction(
        &mut self,
        key: NodeKey,
        world: Vec3,
        use_scale: bool,
    ) -> Result<Vec3, SceneError> {
        self.resolve(key)?;
        let node = self.node(key)?;
        let direction = node.derived_orientation.inverse() * world;
        Ok(if use_scale { direction / node.derived_scale } else { direction })
    }

    pub fn convert_local_to_world_direction(
        &mut self,
        key: NodeKey,
        local: Vec3,
        use_scale: bool,
    ) -> Result<Vec3, SceneError> {
        if use_scale {
            return Ok(self.full_transform(key)?.transform_vector3(local));
        }
        Ok(self.derived_orientation(key)? * local)
    }

    pub fn convert_world_to_local_orientation(&mut self, key: NodeKey, world: Quat) -> Result<Quat, SceneError> {
        Ok(self.derived_orientation(key)?.inverse() * world)
    }

    pub fn convert_local_to_world_orientation(&mut self, key: NodeKey, local: Quat) -> Result<Quat, SceneError> {
        Ok(self.derived_orientation(key)? * local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeUpdateState;
    use std::f32::consts::FRAC_PI_2;

    fn chain() -> (SceneGraph, NodeKey, NodeKey) {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let child = graph.create_child(root, "child", Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY).unwrap();
        (graph, root, child)
    }

    #[test]
    fn nan_inputs_are_rejected_without_mutation() {
        let (mut graph, root, _) = chain();
        graph.set_position(root, Vec3::new(3.0, 0.0, 0.0)).unwrap();
        let err = graph.set_position(root, Vec3::new(f32::NAN, 0.0, 0.0)).unwrap_err();
        assert_eq!(err, SceneError::InvalidPosition { node: "root".into() });
        assert_eq!(graph.node(root).unwrap().position(), Vec3::new(3.0, 0.0, 0.0));

        assert!(matches!(
            graph.set_orientation(root, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)),
            Err(SceneError::InvalidOrientation { .. })
        ));
        assert!(matches!(graph.set_scale(root, Vec3::splat(f32::INFINITY)), Err(SceneError::InvalidScale { .. })));
        assert!(matches!(
            graph.translate(root, Vec3::splat(f32::NAN), TransformSpace::Local),
            Err(SceneError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn translate_respects_transform_space() {
        let (mut graph, root, child) = chain();
        graph.set_orientation(root, Quat::from_rotation_z(FRAC_PI_2)).unwrap();
        graph.set_orientation(child, Quat::from_rotation_z(FRAC_PI_2)).unwrap();

        graph.translate(child, Vec3::X, TransformSpace::Parent).unwrap();
        assert!(graph.node(child).unwrap().position().abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));

        graph.translate(child, Vec3::X, TransformSpace::Local).unwrap();
        assert!(graph.node(child).unwrap().position().abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-5));

        let before = graph.derived_position(child).unwrap();
        graph.translate(child, Vec3::X, TransformSpace::World).unwrap();
        let after = graph.derived_position(child).unwrap();
        assert!((after - before).abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn world_translation_of_root_is_plain_addition() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        graph.set_orientation(root, Quat::from_rotation_y(FRAC_PI_2)).unwrap();
        graph.translate(root, Vec3::X, TransformSpace::World).unwrap();
        assert_eq!(graph.node(root).unwrap().position(), Vec3::X);
    }

    #[test]
    fn world_rotation_applies_about_global_axes() {
        let (mut graph, root, child) = chain();
        graph.set_orientation(root, Quat::from_rotation_x(FRAC_PI_2)).unwrap();
        graph.rotate(child, Quat::from_rotation_z(FRAC_PI_2), TransformSpace::World).unwrap();
        let expected = Quat::from_rotation_z(FRAC_PI_2) * Quat::from_rotation_x(FRAC_PI_2);
        let derived = graph.derived_orientation(child).unwrap();
        assert!(derived.abs_diff_eq(expected, 1e-5) || derived.abs_diff_eq(-expected, 1e-5));
    }

    #[test]
    fn yaw_matches_local_rotation_about_y() {
        let (mut graph, _, child) = chain();
        graph.yaw(child, FRAC_PI_2, TransformSpace::Local).unwrap();
        let axes = graph.local_axes(child).unwrap();
        assert!(axes.x_axis.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
        graph.reset_orientation(child).unwrap();
        assert_eq!(graph.node(child).unwrap().orientation(), Quat::IDENTITY);
    }

    #[test]
    fn roll_in_world_space_turns_about_global_z() {
        let (mut graph, root, child) = chain();
        graph.set_orientation(root, Quat::from_rotation_x(FRAC_PI_2)).unwrap();
        graph.roll(child, FRAC_PI_2, TransformSpace::World).unwrap();
        let expected = Quat::from_rotation_z(FRAC_PI_2) * Quat::from_rotation_x(FRAC_PI_2);
        let derived = graph.derived_orientation(child).unwrap();
        assert!(derived.abs_diff_eq(expected, 1e-5) || derived.abs_diff_eq(-expected, 1e-5));

        graph.reset_orientation(child).unwrap();
        graph.roll(child, FRAC_PI_2, TransformSpace::Local).unwrap();
        let local = graph.derived_orientation(child).unwrap();
        assert!(!local.abs_diff_eq(derived, 1e-3) && !local.abs_diff_eq(-derived, 1e-3));
    }

    #[test]
    fn scale_multiplies_and_is_inherited() {
        let (mut graph, root, child) = chain();
        graph.scale(root, Vec3::splat(2.0)).unwrap();
        assert!(graph.derived_position(child).unwrap().abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
        assert_eq!(graph.derived_scale(child).unwrap(), Vec3::splat(2.0));

        graph.set_inherit_scale(child, false).unwrap();
        assert_eq!(graph.derived_scale(child).unwrap(), Vec3::ONE);
    }

    #[test]
    fn disabling_orientation_inheritance_uses_local_orientation() {
        let (mut graph, root, child) = chain();
        graph.set_orientation(root, Quat::from_rotation_y(FRAC_PI_2)).unwrap();
        graph.set_inherit_orientation(child, false).unwrap();
        assert!(graph.derived_orientation(child).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
        // Position still follows the parent frame.
        assert!(graph.derived_position(child).unwrap().abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn reading_derived_state_cleans_the_ancestor_chain() {
        let (mut graph, root, child) = chain();
        graph.update_all();
        graph.set_position(root, Vec3::Y).unwrap();
        assert_eq!(graph.node_state(child).unwrap(), NodeUpdateState::SelfDirty);

        let position = graph.derived_position(child).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
        assert!(!graph.node(root).unwrap().needs_update());
        assert!(!graph.node(child).unwrap().needs_update());
    }

    #[test]
    fn derived_setters_convert_through_parent() {
        let (mut graph, root, child) = chain();
        graph.set_position(root, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        graph.set_orientation(root, Quat::from_rotation_z(FRAC_PI_2)).unwrap();

        graph.set_derived_position(child, Vec3::new(-2.0, 5.0, 0.0)).unwrap();
        assert!(graph.derived_position(child).unwrap().abs_diff_eq(Vec3::new(-2.0, 5.0, 0.0), 1e-5));
        assert!(graph.node(child).unwrap().position().abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

        let target = Quat::from_rotation_y(0.3);
        graph.set_derived_orientation(child, target).unwrap();
        assert!(graph.derived_orientation(child).unwrap().abs_diff_eq(target, 1e-5));

        graph.set_derived_position(root, Vec3::ONE).unwrap();
        assert_eq!(graph.node(root).unwrap().position(), Vec3::ONE);
    }

    #[test]
    fn direction_conversion_round_trips() {
        let (mut graph, root, child) = chain();
        graph.set_orientation(root, Quat::from_rotation_x(0.7)).unwrap();
        graph.set_scale(root, Vec3::new(1.0, 2.0, 4.0)).unwrap();
        let dir = Vec3::new(0.3, -1.0, 2.0);
        for use_scale in [false, true] {
            let world = graph.convert_local_to_world_direction(child, dir, use_scale).unwrap();
            let back = graph.convert_world_to_local_direction(child, world, use_scale).unwrap();
            assert!(back.abs_diff_eq(dir, 1e-4), "use_scale={use_scale}: {back:?}");
        }
    }
}
