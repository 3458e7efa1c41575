use crate::error::SkinningError;
use crate::skeleton::Skeleton;
use glam::{Mat4, Vec3};

pub const MAX_BONES_PER_VERTEX: usize = 4;

/// Up to four bone influences of one vertex, laid out the way the skinning
/// shader consumes them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VertexBoneData {
    pub ids: [u32; MAX_BONES_PER_VERTEX],
    pub weights: [f32; MAX_BONES_PER_VERTEX],
}

impl VertexBoneData {
    /// Stores the influence in the first slot whose weight is still zero.
    /// Returns `false` when all slots are taken.
    pub fn add_bone_data(&mut self, bone: u32, weight: f32) -> bool {
        match self.weights.iter().position(|w| *w == 0.0) {
            Some(slot) => {
                self.ids[slot] = bone;
                self.weights[slot] = weight;
                true
            }
            None => false,
        }
    }

    pub fn influence_count(&self) -> usize {
        self.weights.iter().filter(|w| **w != 0.0).count()
    }

    pub fn total_weight(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// One bone as reported by the importer for a single mesh.
#[derive(Clone, Debug)]
pub struct MeshBone {
    pub name: String,
    pub offset: Mat4,
    pub weights: Vec<(usize, f32)>,
}

/// Registers every mesh bone on the skeleton and gathers per-vertex
/// influences. Weights are taken as authored.
pub fn load_bone_weights(
    skeleton: &mut Skeleton,
    vertex_count: usize,
    bones: &[MeshBone],
) -> Result<Vec<VertexBoneData>, SkinningError> {
    let mut influences = vec![VertexBoneData::default(); vertex_count];
    for bone in bones {
        let index = skeleton.register_bone(&bone.name, bone.offset);
        for &(vertex, weight) in &bone.weights {
            let Some(data) = influences.get_mut(vertex) else {
                return Err(SkinningError::VertexOutOfRange {
                    bone: bone.name.clone(),
                    vertex,
                    vertex_count,
                });
            };
            if !data.add_bone_data(index, weight) {
                return Err(SkinningError::TooManyInfluences { vertex });
            }
        }
    }
    log::debug!("registered {} bones for a mesh of {} vertices", skeleton.num_bones(), vertex_count);
    Ok(influences)
}

/// CPU reference for the per-vertex blend the skinning shader performs.
pub fn skin_position(position: Vec3, data: &VertexBoneData, palette: &[Mat4]) -> Result<Vec3, SkinningError> {
    let mut blended = Vec3::ZERO;
    for (&id, &weight) in data.ids.iter().zip(data.weights.iter()) {
        if weight == 0.0 {
            continue;
        }
        let matrix = palette
            .get(id as usize)
            .ok_or(SkinningError::UnknownBone { index: id, palette_len: palette.len() })?;
        blended += matrix.transform_point3(position) * weight;
    }
    Ok(blended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::HierarchyNode;

    #[test]
    fn fifth_influence_is_rejected() {
        let mut data = VertexBoneData::default();
        for bone in 0..4 {
            assert!(data.add_bone_data(bone, 0.25), "slot available");
        }
        assert_eq!(data.influence_count(), 4);
        assert!(!data.add_bone_data(4, 0.1));
    }

    #[test]
    fn load_bone_weights_reuses_known_bones() {
        let mut skeleton = Skeleton::new(HierarchyNode::new("root", Mat4::IDENTITY));
        let bones = vec![
            MeshBone { name: "hip".into(), offset: Mat4::IDENTITY, weights: vec![(0, 1.0), (1, 0.5)] },
            MeshBone { name: "knee".into(), offset: Mat4::IDENTITY, weights: vec![(1, 0.5)] },
        ];
        let influences = load_bone_weights(&mut skeleton, 2, &bones).expect("weights load");
        assert_eq!(influences[0].ids[0], 0);
        assert_eq!(influences[1].ids[..2], [0, 1]);
        assert!((influences[1].total_weight() - 1.0).abs() < 1e-6);

        let again = vec![MeshBone { name: "knee".into(), offset: Mat4::IDENTITY, weights: vec![(0, 0.5)] }];
        let second = load_bone_weights(&mut skeleton, 1, &again).expect("second mesh");
        assert_eq!(second[0].ids[0], 1, "existing bone keeps its slot");
        assert_eq!(skeleton.num_bones(), 2);
    }

    #[test]
    fn too_many_influences_names_the_vertex() {
        let mut skeleton = Skeleton::new(HierarchyNode::new("root", Mat4::IDENTITY));
        let bones: Vec<MeshBone> = (0..5)
            .map(|i| MeshBone { name: format!("b{i}"), offset: Mat4::IDENTITY, weights: vec![(1, 0.2)] })
            .collect();
        let err = load_bone_weights(&mut skeleton, 2, &bones).unwrap_err();
        assert_eq!(err, SkinningError::TooManyInfluences { vertex: 1 });
    }

    #[test]
    fn out_of_range_vertex_is_reported() {
        let mut skeleton = Skeleton::new(HierarchyNode::new("root", Mat4::IDENTITY));
        let bones = vec![MeshBone { name: "hip".into(), offset: Mat4::IDENTITY, weights: vec![(3, 1.0)] }];
        let err = load_bone_weights(&mut skeleton, 2, &bones).unwrap_err();
        assert!(matches!(err, SkinningError::VertexOutOfRange { vertex: 3, vertex_count: 2, .. }));
    }

    #[test]
    fn skin_position_blends_weighted_matrices() {
        let palette = [Mat4::from_translation(Vec3::X), Mat4::from_translation(Vec3::Y)];
        let mut data = VertexBoneData::default();
        assert!(data.add_bone_data(0, 0.5));
        assert!(data.add_bone_data(1, 0.5));
        let skinned = skin_position(Vec3::ZERO, &data, &palette).unwrap();
        assert!((skinned - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);

        data.ids[1] = 7;
        assert!(matches!(
            skin_position(Vec3::ZERO, &data, &palette),
            Err(SkinningError::UnknownBone { index: 7, palette_len: 2 })
        ));
    }
}
