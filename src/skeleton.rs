use glam::Mat4;
use std::collections::HashMap;
use std::sync::Arc;

/// Load-time node of the bone hierarchy. The structure never changes once the
/// skeleton is built; animation channels only override `transform` while
/// the hierarchy is walked.
#[derive(Clone, Debug)]
pub struct HierarchyNode {
    pub name: Arc<str>,
    pub transform: Mat4,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn new(name: impl Into<Arc<str>>, transform: Mat4) -> Self {
        Self { name: name.into(), transform, children: Vec::new() }
    }

    pub fn with_child(mut self, child: HierarchyNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: HierarchyNode) {
        self.children.push(child);
    }

    pub fn find(&self, name: &str) -> Option<&HierarchyNode> {
        self.depth_first().find(|node| node.name.as_ref() == name)
    }

    pub fn node_count(&self) -> usize {
        self.depth_first().count()
    }

    /// Pre-order traversal, parents before their children.
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst { stack: vec![self] }
    }
}

pub struct DepthFirst<'a> {
    stack: Vec<&'a HierarchyNode>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a HierarchyNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: Arc<str>,
    /// Inverse bind pose: mesh space to bone space.
    pub offset: Mat4,
    /// Pose from the last successful evaluation.
    pub final_transform: Mat4,
}

/// Name to bone slot table. Entries are only ever added.
#[derive(Clone, Debug, Default)]
pub struct BoneMap {
    indices: HashMap<Arc<str>, u32>,
}

impl BoneMap {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.indices.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn insert(&mut self, name: Arc<str>, index: u32) {
        self.indices.entry(name).or_insert(index);
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    root: HierarchyNode,
    bones: Vec<Bone>,
    bone_map: BoneMap,
    global_inverse_transform: Mat4,
}

impl Skeleton {
    /// The global inverse transform is the inverse of the root node's
    /// authored transform at bind time.
    pub fn new(root: HierarchyNode) -> Self {
        let global_inverse_transform = root.transform.inverse();
        Self { root, bones: Vec::new(), bone_map: BoneMap::default(), global_inverse_transform }
    }

    pub fn with_global_inverse_transform(mut self, transform: Mat4) -> Self {
        self.global_inverse_transform = transform;
        self
    }

    /// Returns the slot of `name`, allocating the next index on first
    /// encounter. A repeated registration keeps the original offset.
    pub fn register_bone(&mut self, name: &str, offset: Mat4) -> u32 {
        if let Some(index) = self.bone_map.get(name) {
            return index;
        }
        let index = self.bones.len() as u32;
        let name: Arc<str> = Arc::from(name);
        self.bones.push(Bone { name: Arc::clone(&name), offset, final_transform: Mat4::IDENTITY });
        self.bone_map.insert(name, index);
        index
    }

    pub fn root(&self) -> &HierarchyNode {
        &self.root
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: u32) -> Option<&Bone> {
        self.bones.get(index as usize)
    }

    pub fn bone_map(&self) -> &BoneMap {
        &self.bone_map
    }

    pub fn bone_index(&self, name: &str) -> Option<u32> {
        self.bone_map.get(name)
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn global_inverse_transform(&self) -> Mat4 {
        self.global_inverse_transform
    }

    /// Final transforms ordered by bone index.
    pub fn final_transforms(&self) -> Vec<Mat4> {
        self.bones.iter().map(|bone| bone.final_transform).collect()
    }

    pub(crate) fn commit_final_transforms(&mut self, palette: &[Mat4]) {
        for (bone, matrix) in self.bones.iter_mut().zip(palette) {
            bone.final_transform = *matrix;
        }
    }

    /// Palette produced when every node keeps its authored transform.
    pub fn bind_pose_palette(&self) -> Vec<Mat4> {
        let mut palette = vec![Mat4::IDENTITY; self.bones.len()];
        self.write_bind_pose(&self.root, Mat4::IDENTITY, &mut palette);
        palette
    }

    fn write_bind_pose(&self, node: &HierarchyNode, parent: Mat4, palette: &mut [Mat4]) {
        let global = parent * node.transform;
        if let Some(index) = self.bone_map.get(&node.name) {
            let bone = &self.bones[index as usize];
            palette[index as usize] = self.global_inverse_transform * global * bone.offset;
        }
        for child in &node.children {
            self.write_bind_pose(child, global, palette);
        }
    }
}
