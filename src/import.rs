//! glTF adapter producing the hierarchy, bones, vertex influences and master
//! timeline the animator consumes.

use crate::animation::{AnimationTimeline, Interpolate, KeyTrack, Keyframe, NodeChannel};
use crate::skeleton::{HierarchyNode, Skeleton};
use crate::skinning::{load_bone_weights, MeshBone, VertexBoneData};
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec3};
use gltf::animation::util::{ReadOutputs, Rotations};
use gltf::animation::{Interpolation, Property};
use std::collections::BTreeMap;
use std::path::Path;

/// Name given to the synthetic root when a scene has several top-level nodes.
pub const SCENE_ROOT_NAME: &str = "scene_root";

/// glTF key times are seconds.
const GLTF_TICKS_PER_SECOND: f32 = 1.0;

#[derive(Clone, Debug)]
pub struct SkinnedMeshData {
    pub name: String,
    pub primitive: usize,
    pub material_index: Option<usize>,
    pub vertex_count: usize,
    pub positions: Vec<Vec3>,
    pub influences: Vec<VertexBoneData>,
}

pub struct RigAsset {
    pub skeleton: Skeleton,
    pub timeline: AnimationTimeline,
    pub meshes: Vec<SkinnedMeshData>,
}

pub fn load_rig_from_gltf(path: impl AsRef<Path>) -> Result<RigAsset> {
    let path_ref = path.as_ref();
    let (document, buffers, _) = gltf::import(path_ref)
        .with_context(|| format!("Failed to import GLTF rig from {}", path_ref.display()))?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("GLTF '{}' does not contain a scene", path_ref.display()))?;
    let mut roots: Vec<HierarchyNode> = scene.nodes().map(|node| build_hierarchy(&node)).collect();
    let root = match roots.len() {
        0 => bail!("GLTF '{}' scene has no nodes", path_ref.display()),
        1 => roots.remove(0),
        _ => {
            let mut root = HierarchyNode::new(SCENE_ROOT_NAME, Mat4::IDENTITY);
            for node in roots {
                root.push_child(node);
            }
            root
        }
    };
    let mut skeleton = Skeleton::new(root);

    for skin in document.skins() {
        let inverse_bind = read_inverse_bind(&skin, &buffers);
        for (index, joint) in skin.joints().enumerate() {
            let offset = inverse_bind.get(index).copied().unwrap_or(Mat4::IDENTITY);
            skeleton.register_bone(&node_name(&joint), offset);
        }
    }

    let mut meshes = Vec::new();
    for node in document.nodes() {
        let Some(mesh) = node.mesh() else {
            continue;
        };
        let skin = node.skin();
        let inverse_bind = skin.as_ref().map(|skin| read_inverse_bind(skin, &buffers)).unwrap_or_default();
        let joint_names: Vec<String> =
            skin.as_ref().map(|skin| skin.joints().map(|joint| node_name(&joint)).collect()).unwrap_or_default();
        let mesh_name = mesh.name().map(str::to_string).unwrap_or_else(|| format!("mesh_{}", mesh.index()));

        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let positions: Vec<Vec3> = reader
                .read_positions()
                .map(|iter| iter.map(Vec3::from_array).collect())
                .unwrap_or_default();
            let vertex_count = positions.len();

            let mut bones: Vec<MeshBone> = joint_names
                .iter()
                .enumerate()
                .map(|(index, name)| MeshBone {
                    name: name.clone(),
                    offset: inverse_bind.get(index).copied().unwrap_or(Mat4::IDENTITY),
                    weights: Vec::new(),
                })
                .collect();
            if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
                for (vertex, (ids, weights)) in joints.into_u16().zip(weights.into_f32()).enumerate() {
                    for (&joint, &weight) in ids.iter().zip(weights.iter()) {
                        if weight == 0.0 {
                            continue;
                        }
                        let bone = bones.get_mut(joint as usize).ok_or_else(|| {
                            anyhow!(
                                "Mesh '{}' vertex {} references joint {} outside its skin",
                                mesh_name,
                                vertex,
                                joint
                            )
                        })?;
                        bone.weights.push((vertex, weight));
                    }
                }
            }
            let influences = load_bone_weights(&mut skeleton, vertex_count, &bones)
                .with_context(|| format!("Failed to load bone weights for mesh '{mesh_name}'"))?;

            meshes.push(SkinnedMeshData {
                name: mesh_name.clone(),
                primitive: primitive.index(),
                material_index: primitive.material().index(),
                vertex_count,
                positions,
                influences,
            });
        }
    }

    let mut animations = document.animations();
    let timeline = match animations.next() {
        Some(animation) => {
            if animations.next().is_some() {
                log::warn!(
                    "GLTF '{}' contains multiple animations; only the first is used as the master timeline.",
                    path_ref.display()
                );
            }
            read_timeline(&document, &animation, &buffers)?
        }
        None => {
            log::info!("GLTF '{}' has no animation; only the bind pose is available.", path_ref.display());
            AnimationTimeline::new("bind_pose", GLTF_TICKS_PER_SECOND, 0.0)
        }
    };

    log::debug!(
        "imported rig '{}': {} nodes, {} bones, {} meshes, {} channels",
        path_ref.display(),
        skeleton.root().node_count(),
        skeleton.num_bones(),
        meshes.len(),
        timeline.channels.len()
    );
    Ok(RigAsset { skeleton, timeline, meshes })
}

fn node_name(node: &gltf::Node) -> String {
    node.name().map(str::to_string).unwrap_or_else(|| format!("node_{}", node.index()))
}

fn build_hierarchy(node: &gltf::Node) -> HierarchyNode {
    let mut out = HierarchyNode::new(node_name(node), mat4_from_gltf(node.transform().matrix()));
    for child in node.children() {
        out.push_child(build_hierarchy(&child));
    }
    out
}

fn read_inverse_bind(skin: &gltf::Skin, buffers: &[gltf::buffer::Data]) -> Vec<Mat4> {
    let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
    match reader.read_inverse_bind_matrices() {
        Some(matrices) => matrices.map(mat4_from_gltf).collect(),
        None => vec![Mat4::IDENTITY; skin.joints().count()],
    }
}

#[derive(Default)]
struct ChannelBuilder {
    translation: Option<Vec<Keyframe<Vec3>>>,
    rotation: Option<Vec<Keyframe<Quat>>>,
    scale: Option<Vec<Keyframe<Vec3>>>,
}

fn read_timeline(
    document: &gltf::Document,
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
) -> Result<AnimationTimeline> {
    let name = animation.name().map(str::to_string).unwrap_or_else(|| format!("animation_{}", animation.index()));
    let mut builders: BTreeMap<usize, ChannelBuilder> = BTreeMap::new();

    for channel in animation.channels() {
        let target = channel.target().node();
        match channel.sampler().interpolation() {
            Interpolation::Linear => {}
            Interpolation::Step => {
                log::debug!("animation '{}' node {}: step keys sampled linearly", name, target.index());
            }
            Interpolation::CubicSpline => {
                log::warn!(
                    "animation '{}' uses CubicSpline interpolation; skipping channel (node {}).",
                    name,
                    target.index()
                );
                continue;
            }
        }

        let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();
        if times.is_empty() {
            continue;
        }
        let Some(outputs) = reader.read_outputs() else {
            continue;
        };

        let builder = builders.entry(target.index()).or_default();
        match (channel.target().property(), outputs) {
            (Property::Translation, ReadOutputs::Translations(values)) => {
                let values: Vec<Vec3> = values.map(Vec3::from_array).collect();
                builder.translation = Some(build_keyframes(&name, &times, values)?);
            }
            (Property::Scale, ReadOutputs::Scales(values)) => {
                let values: Vec<Vec3> = values.map(Vec3::from_array).collect();
                builder.scale = Some(build_keyframes(&name, &times, values)?);
            }
            (Property::Rotation, ReadOutputs::Rotations(values)) => {
                builder.rotation = Some(build_keyframes(&name, &times, convert_rotations(values))?);
            }
            _ => {}
        }
    }

    let duration = builders
        .values()
        .flat_map(|builder| {
            [
                builder.translation.as_ref().and_then(|keys| keys.last()).map(|key| key.time),
                builder.rotation.as_ref().and_then(|keys| keys.last()).map(|key| key.time),
                builder.scale.as_ref().and_then(|keys| keys.last()).map(|key| key.time),
            ]
        })
        .flatten()
        .fold(0.0, f32::max);

    let mut timeline = AnimationTimeline::new(name.as_str(), GLTF_TICKS_PER_SECOND, duration);
    for (node_index, builder) in builders {
        let Some(node) = document.nodes().nth(node_index) else {
            continue;
        };
        let (t, r, s) = node.transform().decomposed();
        let rest_rotation = Quat::from_xyzw(r[0], r[1], r[2], r[3]).normalize();
        let positions = track_or_rest(builder.translation, Vec3::from_array(t), duration);
        let rotations = track_or_rest(builder.rotation, rest_rotation, duration);
        let scalings = track_or_rest(builder.scale, Vec3::from_array(s), duration);
        timeline.push_channel(NodeChannel::new(node_name(&node), positions, rotations, scalings));
    }
    Ok(timeline)
}

/// Missing tracks hold the rest value. Animated tracks are held at their
/// first and last key so that every time in `[0, duration]` is bracketed.
fn track_or_rest<T: Interpolate>(keys: Option<Vec<Keyframe<T>>>, rest: T, duration: f32) -> KeyTrack<T> {
    let Some(mut keys) = keys else {
        return KeyTrack::constant(rest);
    };
    if keys.len() > 1 {
        if let Some(first) = keys.first().copied() {
            if first.time > 0.0 {
                keys.insert(0, Keyframe::new(0.0, first.value));
            }
        }
        if let Some(last) = keys.last().copied() {
            if last.time < duration {
                keys.push(Keyframe::new(duration, last.value));
            }
        }
    }
    KeyTrack::new(keys)
}

fn build_keyframes<T>(animation: &str, times: &[f32], values: Vec<T>) -> Result<Vec<Keyframe<T>>> {
    if times.len() != values.len() {
        bail!(
            "Animation '{}' channel time/value count mismatch ({} vs {})",
            animation,
            times.len(),
            values.len()
        );
    }
    let mut frames: Vec<Keyframe<T>> = Vec::with_capacity(times.len());
    for (time, value) in times.iter().copied().zip(values) {
        if !time.is_finite() {
            bail!("Animation '{animation}' channel contains non-finite time value");
        }
        if time < 0.0 {
            bail!("Animation '{animation}' channel time cannot be negative");
        }
        if let Some(last) = frames.last_mut() {
            if time < last.time {
                bail!("Animation '{animation}' channel key times are not ascending");
            }
            if (time - last.time).abs() <= f32::EPSILON {
                last.value = value;
                continue;
            }
        }
        frames.push(Keyframe::new(time, value));
    }
    Ok(frames)
}

fn convert_rotations(rotations: Rotations) -> Vec<Quat> {
    rotations
        .into_f32()
        .map(|[x, y, z, w]| {
            let quat = Quat::from_xyzw(x, y, z, w);
            if quat.length_squared() > 0.0 {
                quat.normalize()
            } else {
                Quat::IDENTITY
            }
        })
        .collect()
}

fn mat4_from_gltf(matrix: [[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols_array_2d(&matrix)
}
