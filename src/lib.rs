pub mod animation;
pub mod config;
pub mod error;
pub mod import;
pub mod scene;
pub mod skeleton;
pub mod skinning;

pub use animation::{AnimationController, AnimatorSettings, ClipWindow, SkeletalAnimator};
pub use config::{RigConfig, RigConfigOverrides};
pub use error::{AnimationError, SceneError, SkinningError};
pub use import::{load_rig_from_gltf, RigAsset};
pub use scene::{NodeKey, SceneGraph, TransformSpace};
pub use skeleton::{HierarchyNode, Skeleton};
