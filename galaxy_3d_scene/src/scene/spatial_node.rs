/// SpatialNode: scene graph node with a lazily resolved world transform.
///
/// A node stores its transform relative to its parent. The world transform
/// is cached and only recomputed when a mutation has marked it dirty;
/// mutations go through `Scene`, which also propagates the dirty state to
/// descendants and queues owned drawables for octree reinsertion.

use glam::{Mat3, Mat4, Quat, Vec3};
use slotmap::new_key_type;
use super::drawable::DrawableKey;

new_key_type! {
    /// Stable handle to a SpatialNode in a Scene.
    pub struct NodeKey;
}

/// Reference frame for relative transform operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformSpace {
    /// The node's own rotated frame
    #[default]
    Local,
    /// The parent's frame (the space position/rotation/scale live in)
    Parent,
    /// World space
    World,
}

/// Forward direction of an unrotated node.
pub const NODE_FORWARD: Vec3 = Vec3::NEG_Z;

/// Scene graph node.
#[derive(Debug, Clone)]
pub struct SpatialNode {
    name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    pub(crate) world_transform: Mat4,
    pub(crate) world_dirty: bool,
    pub(crate) enabled: bool,
    pub(crate) drawable: Option<DrawableKey>,
    pub(crate) recompute_count: u64,
}

impl SpatialNode {
    pub(crate) fn new(name: &str, parent: Option<NodeKey>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world_transform: Mat4::IDENTITY,
            world_dirty: true,
            enabled: true,
            drawable: None,
            recompute_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Position in parent space.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Rotation in parent space.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Scale in parent space.
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Forward direction in parent space.
    pub fn direction(&self) -> Vec3 {
        self.rotation * NODE_FORWARD
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drawable owned by this node, if any.
    pub fn drawable(&self) -> Option<DrawableKey> {
        self.drawable
    }

    /// Whether the cached world transform is stale.
    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty
    }

    /// Cached world transform. May be stale; see `is_world_dirty`.
    pub fn cached_world_transform(&self) -> &Mat4 {
        &self.world_transform
    }

    /// Number of times the world transform was recomputed.
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    /// Transform relative to the parent.
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Rotation whose forward axis points along `direction`, with `up` as the
/// reference up vector. Returns `None` when the basis is degenerate.
pub fn look_rotation(direction: Vec3, up: Vec3) -> Option<Quat> {
    let forward = direction.try_normalize()?;
    let right = forward.cross(up).try_normalize()?;
    let true_up = right.cross(forward);
    let rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward));
    rotation.is_finite().then(|| rotation.normalize())
}

/// Rotation turning the forward axis onto `direction`.
pub fn direction_rotation(direction: Vec3) -> Option<Quat> {
    let direction = direction.try_normalize()?;
    Some(Quat::from_rotation_arc(NODE_FORWARD, direction))
}
