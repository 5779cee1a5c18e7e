/// Scene: owner of spatial nodes, their drawables and the octree.
///
/// Nodes and drawables live in two SlotMaps linked by keys: a node owns at
/// most one drawable, a drawable knows its owning node. Transform setters
/// only mark state dirty; world transforms resolve lazily on read, and
/// moved drawables wait in the reinsertion queue until the next update
/// pass (see `Updater`).

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use crate::config::SceneConfig;
use crate::error::{Error, Result};
use crate::math::Ray;
use crate::{engine_debug, engine_err};
use super::drawable::{Drawable, DrawableFlags, DrawableKey, DrawableKind, DrawableState};
use super::octree::{OctantId, Octree, OctreeEntry, RaycastResult};
use super::spatial_node::{direction_rotation, look_rotation, NodeKey, SpatialNode, TransformSpace};

/// A scene graph with a spatial index of its drawables.
pub struct Scene {
    /// Scene graph nodes
    pub(crate) nodes: SlotMap<NodeKey, SpatialNode>,
    /// Render records, one per node at most
    pub(crate) drawables: SlotMap<DrawableKey, Drawable>,
    /// Spatial index of attached drawables
    pub(crate) octree: Octree,
    /// Drawables waiting for the next update pass
    pub(crate) reinsert_queue: Vec<DrawableKey>,
    /// Drawables receiving the per-frame octree update call
    pub(crate) update_calls: FxHashSet<DrawableKey>,
    /// Current frame number, never 0
    frame_number: u16,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(config: &SceneConfig) -> Self {
        let octree = Octree::new(&config.octree);
        engine_debug!("galaxy3d::Scene", "Created scene, world {:?}", octree.world_bounds());
        Self {
            nodes: SlotMap::with_key(),
            drawables: SlotMap::with_key(),
            octree,
            reinsert_queue: Vec::new(),
            update_calls: FxHashSet::default(),
            frame_number: 1,
        }
    }

    // ===== FRAME =====

    pub fn frame_number(&self) -> u16 {
        self.frame_number
    }

    /// Step to the next frame number, skipping 0 on wrap.
    pub fn advance_frame(&mut self) -> u16 {
        self.frame_number = match self.frame_number.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.frame_number
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Number of drawables waiting for reinsertion.
    pub fn pending_reinsertions(&self) -> usize {
        self.reinsert_queue.len()
    }

    // ===== NODES =====

    /// Create a node, optionally under a parent.
    pub fn create_node(&mut self, name: &str, parent: Option<NodeKey>) -> Result<NodeKey> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(Error::InvalidNode(format!("Parent {:?} does not exist", parent)));
            }
        }
        let key = self.nodes.insert(SpatialNode::new(name, parent));
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.push(key);
        }
        Ok(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&SpatialNode> {
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &SpatialNode)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rename a node. Returns false if the key is invalid.
    pub fn set_node_name(&mut self, key: NodeKey, name: &str) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.set_name(name);
                true
            }
            None => false,
        }
    }

    /// First direct child with the given name.
    pub fn find_child(&self, parent: NodeKey, name: &str) -> Option<NodeKey> {
        self.nodes.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes.get(child).is_some_and(|node| node.name() == name))
    }

    /// Move a node under a new parent (or to the top level). The local
    /// transform is kept, so the world transform follows the new parent.
    pub fn set_parent(&mut self, key: NodeKey, parent: Option<NodeKey>) -> Result<()> {
        if !self.nodes.contains_key(key) {
            return Err(Error::InvalidNode(format!("Node {:?} does not exist", key)));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(Error::InvalidNode(format!("Parent {:?} does not exist", parent)));
            }
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == key {
                    return Err(Error::InvalidHierarchy(format!(
                        "Parenting {:?} under {:?} would create a cycle", key, parent)));
                }
                cursor = self.nodes.get(current).and_then(|node| node.parent);
            }
        }

        let old_parent = self.nodes.get(key).and_then(|node| node.parent);
        if let Some(old) = old_parent.and_then(|old| self.nodes.get_mut(old)) {
            old.children.retain(|&child| child != key);
        }
        if let Some(new) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            new.children.push(key);
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = parent;
        }
        self.mark_dirty(key);
        Ok(())
    }

    /// Remove a node and its whole subtree, drawables included.
    /// Returns false if the key is invalid.
    pub fn remove_node(&mut self, key: NodeKey) -> bool {
        let Some(node) = self.nodes.get(key) else { return false };
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.retain(|&child| child != key);
        }

        let mut pending = vec![key];
        let mut removed = 0usize;
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.remove(current) else { continue };
            pending.extend(node.children.iter().copied());
            if let Some(drawable) = node.drawable {
                self.destroy_drawable(drawable);
            }
            removed += 1;
        }
        engine_debug!("galaxy3d::Scene", "Removed {} node(s)", removed);
        true
    }

    /// Enable or disable a node. A disabled node's drawable leaves the
    /// octree; enabling inserts it again. Returns false if the key is
    /// invalid.
    pub fn set_enabled(&mut self, key: NodeKey, enabled: bool) -> bool {
        let Some(node) = self.nodes.get_mut(key) else { return false };
        if node.enabled == enabled {
            return true;
        }
        node.enabled = enabled;
        if let Some(drawable) = node.drawable {
            if enabled {
                self.attach_drawable(drawable);
            } else {
                self.detach_drawable(drawable);
            }
        }
        true
    }

    // ===== LOCAL TRANSFORM =====

    /// Apply a mutation to a node's local transform and mark it dirty.
    fn modify_transform<F>(&mut self, key: NodeKey, f: F) -> bool
    where
        F: FnOnce(&mut SpatialNode),
    {
        match self.nodes.get_mut(key) {
            Some(node) => {
                f(node);
                self.mark_dirty(key);
                true
            }
            None => false,
        }
    }

    pub fn set_position(&mut self, key: NodeKey, position: Vec3) -> bool {
        self.modify_transform(key, |node| node.position = position)
    }

    pub fn set_rotation(&mut self, key: NodeKey, rotation: Quat) -> bool {
        let rotation = rotation.normalize();
        self.modify_transform(key, |node| node.rotation = rotation)
    }

    /// Point the node's forward axis (-Z) along a parent-space direction.
    /// A zero direction is ignored.
    pub fn set_direction(&mut self, key: NodeKey, direction: Vec3) -> bool {
        match direction_rotation(direction) {
            Some(rotation) => self.set_rotation(key, rotation),
            None => self.nodes.contains_key(key),
        }
    }

    pub fn set_scale(&mut self, key: NodeKey, scale: Vec3) -> bool {
        self.modify_transform(key, |node| node.scale = scale)
    }

    pub fn set_transform(&mut self, key: NodeKey, position: Vec3, rotation: Quat, scale: Vec3) -> bool {
        let rotation = rotation.normalize();
        self.modify_transform(key, |node| {
            node.position = position;
            node.rotation = rotation;
            node.scale = scale;
        })
    }

    /// Move by a delta expressed in the given space.
    pub fn translate(&mut self, key: NodeKey, delta: Vec3, space: TransformSpace) -> bool {
        let Some(node) = self.nodes.get(key) else { return false };
        let offset = match space {
            TransformSpace::Local => node.rotation * delta,
            TransformSpace::Parent => delta,
            TransformSpace::World => match node.parent {
                Some(parent) => self.parent_inverse(parent).transform_vector3(delta),
                None => delta,
            },
        };
        self.modify_transform(key, |node| node.position += offset)
    }

    /// Rotate by a delta expressed in the given space.
    pub fn rotate(&mut self, key: NodeKey, delta: Quat, space: TransformSpace) -> bool {
        let Some(rotation) = self.rotated(key, delta, space) else { return false };
        self.modify_transform(key, |node| node.rotation = rotation)
    }

    /// Rotate around a point expressed in the given space; the position
    /// orbits the point.
    pub fn rotate_around(&mut self, key: NodeKey, point: Vec3, delta: Quat, space: TransformSpace) -> bool {
        let Some(node) = self.nodes.get(key) else { return false };
        let (old_rotation, old_position, parent) = (node.rotation, node.position, node.parent);
        let local = node.local_transform();
        let parent_space_point = match space {
            TransformSpace::Local => local.transform_point3(point),
            TransformSpace::Parent => point,
            TransformSpace::World => match parent {
                Some(parent) => self.parent_inverse(parent).transform_point3(point),
                None => point,
            },
        };
        let Some(rotation) = self.rotated(key, delta, space) else { return false };

        let relative = old_rotation.inverse() * (old_position - parent_space_point);
        let position = rotation * relative + parent_space_point;
        self.modify_transform(key, |node| {
            node.rotation = rotation;
            node.position = position;
        })
    }

    /// Rotate around the X axis of the given space. Angle in radians.
    pub fn pitch(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> bool {
        self.rotate(key, Quat::from_axis_angle(Vec3::X, angle), space)
    }

    /// Rotate around the Y axis of the given space. Angle in radians.
    pub fn yaw(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> bool {
        self.rotate(key, Quat::from_axis_angle(Vec3::Y, angle), space)
    }

    /// Rotate around the Z axis of the given space. Angle in radians.
    pub fn roll(&mut self, key: NodeKey, angle: f32, space: TransformSpace) -> bool {
        self.rotate(key, Quat::from_axis_angle(Vec3::Z, angle), space)
    }

    /// Turn the node to look at a target expressed in the given space,
    /// with `up` as the world up vector.
    ///
    /// Returns false, leaving the rotation unchanged, if the target
    /// coincides with the node's position or the direction is parallel to
    /// `up` (or the key is invalid).
    pub fn look_at(&mut self, key: NodeKey, target: Vec3, up: Vec3, space: TransformSpace) -> bool {
        let Some(parent) = self.nodes.get(key).map(|node| node.parent) else { return false };
        let world_target = match space {
            TransformSpace::Local => match self.world_transform(key) {
                Some(world) => world.transform_point3(target),
                None => return false,
            },
            TransformSpace::Parent => match parent.and_then(|parent| self.world_transform(parent)) {
                Some(world) => world.transform_point3(target),
                None => target,
            },
            TransformSpace::World => target,
        };
        let Some(position) = self.world_position(key) else { return false };

        match look_rotation(world_target - position, up) {
            Some(rotation) => self.set_world_rotation(key, rotation),
            None => false,
        }
    }

    /// Multiply the current scale.
    pub fn apply_scale(&mut self, key: NodeKey, factor: Vec3) -> bool {
        self.modify_transform(key, |node| node.scale *= factor)
    }

    /// Local rotation after applying a delta in the given space.
    fn rotated(&mut self, key: NodeKey, delta: Quat, space: TransformSpace) -> Option<Quat> {
        let node = self.nodes.get(key)?;
        let rotation = node.rotation;
        let has_parent = node.parent.is_some();
        let result = match space {
            TransformSpace::Local => rotation * delta,
            TransformSpace::Parent => delta * rotation,
            TransformSpace::World if has_parent => {
                let world_rotation = self.world_rotation(key)?;
                rotation * world_rotation.inverse() * delta * world_rotation
            }
            TransformSpace::World => delta * rotation,
        };
        Some(result.normalize())
    }

    fn parent_inverse(&mut self, parent: NodeKey) -> Mat4 {
        self.world_transform(parent).map_or(Mat4::IDENTITY, |world| world.inverse())
    }

    // ===== WORLD TRANSFORM =====

    pub fn set_world_position(&mut self, key: NodeKey, position: Vec3) -> bool {
        let Some(parent) = self.nodes.get(key).map(|node| node.parent) else { return false };
        let local = match parent {
            Some(parent) => self.parent_inverse(parent).transform_point3(position),
            None => position,
        };
        self.set_position(key, local)
    }

    pub fn set_world_rotation(&mut self, key: NodeKey, rotation: Quat) -> bool {
        let Some(parent) = self.nodes.get(key).map(|node| node.parent) else { return false };
        let local = match parent.and_then(|parent| self.world_rotation(parent)) {
            Some(parent_rotation) => parent_rotation.inverse() * rotation,
            None => rotation,
        };
        self.set_rotation(key, local)
    }

    /// Point the node's forward axis along a world-space direction.
    pub fn set_world_direction(&mut self, key: NodeKey, direction: Vec3) -> bool {
        let Some(parent) = self.nodes.get(key).map(|node| node.parent) else { return false };
        let local = match parent.and_then(|parent| self.world_rotation(parent)) {
            Some(parent_rotation) => parent_rotation.inverse() * direction,
            None => direction,
        };
        self.set_direction(key, local)
    }

    pub fn set_world_scale(&mut self, key: NodeKey, scale: Vec3) -> bool {
        let Some(parent) = self.nodes.get(key).map(|node| node.parent) else { return false };
        let local = match parent.and_then(|parent| self.world_scale(parent)) {
            Some(parent_scale) => scale / parent_scale,
            None => scale,
        };
        self.set_scale(key, local)
    }

    pub fn set_world_transform(&mut self, key: NodeKey, position: Vec3, rotation: Quat, scale: Vec3) -> bool {
        self.set_world_position(key, position)
            && self.set_world_rotation(key, rotation)
            && self.set_world_scale(key, scale)
    }

    /// World transform of a node, recomputing the dirty part of its
    /// ancestor chain first.
    pub fn world_transform(&mut self, key: NodeKey) -> Option<Mat4> {
        let mut dirty_chain = Vec::new();
        let mut base = Mat4::IDENTITY;
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            let node = self.nodes.get(current)?;
            if !node.world_dirty {
                base = node.world_transform;
                break;
            }
            dirty_chain.push(current);
            cursor = node.parent;
        }

        for &current in dirty_chain.iter().rev() {
            if let Some(node) = self.nodes.get_mut(current) {
                base *= node.local_transform();
                node.world_transform = base;
                node.world_dirty = false;
                node.recompute_count += 1;
            }
        }
        Some(base)
    }

    pub fn world_position(&mut self, key: NodeKey) -> Option<Vec3> {
        self.world_transform(key).map(|world| world.w_axis.truncate())
    }

    pub fn world_rotation(&mut self, key: NodeKey) -> Option<Quat> {
        self.world_transform(key).map(|world| {
            let (_, rotation, _) = world.to_scale_rotation_translation();
            rotation.normalize()
        })
    }

    pub fn world_scale(&mut self, key: NodeKey) -> Option<Vec3> {
        self.world_transform(key).map(|world| world.to_scale_rotation_translation().0)
    }

    /// World-space forward direction.
    pub fn world_direction(&mut self, key: NodeKey) -> Option<Vec3> {
        self.world_rotation(key).map(|rotation| rotation * super::spatial_node::NODE_FORWARD)
    }

    /// Transform a point from the node's space to world space.
    pub fn local_to_world(&mut self, key: NodeKey, point: Vec3) -> Option<Vec3> {
        self.world_transform(key).map(|world| world.transform_point3(point))
    }

    /// Transform a world-space point into the node's space.
    pub fn world_to_local(&mut self, key: NodeKey, point: Vec3) -> Option<Vec3> {
        self.world_transform(key).map(|world| world.inverse().transform_point3(point))
    }

    /// Mark a node and its descendants dirty and queue their drawables.
    ///
    /// Descendants of an already dirty node are dirty too, so the walk
    /// stops there.
    fn mark_dirty(&mut self, key: NodeKey) {
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get_mut(current) else { continue };
            if node.world_dirty && current != key {
                continue;
            }
            node.world_dirty = true;
            pending.extend(node.children.iter().copied());

            if let Some(drawable_key) = node.drawable {
                if let Some(drawable) = self.drawables.get_mut(drawable_key) {
                    if drawable.state == DrawableState::Inserted {
                        drawable.state = DrawableState::ReinsertQueued;
                        self.reinsert_queue.push(drawable_key);
                    }
                }
            }
        }
    }

    // ===== DRAWABLES =====

    /// Give a node its drawable. Enabled nodes insert it into the octree
    /// immediately.
    pub fn create_drawable(&mut self, node: NodeKey, kind: DrawableKind) -> Result<DrawableKey> {
        let Some(owner) = self.nodes.get(node) else {
            return Err(Error::InvalidNode(format!("Node {:?} does not exist", node)));
        };
        if owner.drawable.is_some() {
            return Err(engine_err!("galaxy3d::Scene", "Node {:?} already owns a drawable", node));
        }
        let enabled = owner.enabled;

        let drawable = Drawable::new(kind, node);
        let wants_update_call = drawable.test_flag(DrawableFlags::OCTREE_UPDATE_CALL);
        let key = self.drawables.insert(drawable);
        if let Some(owner) = self.nodes.get_mut(node) {
            owner.drawable = Some(key);
        }
        if wants_update_call {
            self.update_calls.insert(key);
        }
        if enabled {
            self.attach_drawable(key);
        }
        Ok(key)
    }

    /// Remove the drawable owned by a node. Returns false if there is none.
    pub fn remove_drawable(&mut self, node: NodeKey) -> bool {
        let Some(key) = self.nodes.get_mut(node).and_then(|owner| owner.drawable.take()) else {
            return false;
        };
        self.destroy_drawable(key);
        true
    }

    pub fn drawable(&self, key: DrawableKey) -> Option<&Drawable> {
        self.drawables.get(key)
    }

    pub fn drawables(&self) -> impl Iterator<Item = (DrawableKey, &Drawable)> {
        self.drawables.iter()
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Mutate a drawable's configuration.
    ///
    /// Bounds changes queue it for reinsertion; flag and view mask changes
    /// reach the octree entry immediately. Returns `None` if the key is
    /// invalid.
    pub fn modify_drawable<R, F>(&mut self, key: DrawableKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut Drawable) -> R,
    {
        let drawable = self.drawables.get_mut(key)?;
        let result = f(drawable);

        if drawable.bounds_dirty && drawable.state == DrawableState::Inserted {
            drawable.state = DrawableState::ReinsertQueued;
            self.reinsert_queue.push(key);
        }
        if let Some(octant) = drawable.octant {
            self.octree.update_entry_info(key, octant, drawable.flags(), drawable.view_mask());
        }
        Some(result)
    }

    fn destroy_drawable(&mut self, key: DrawableKey) {
        self.detach_drawable(key);
        self.update_calls.remove(&key);
        self.drawables.remove(key);
    }

    /// Insert a drawable into the octree at its current world bounds.
    fn attach_drawable(&mut self, key: DrawableKey) {
        let Some(owner) = self.drawables.get(key).map(Drawable::owner) else { return };
        let Some(world) = self.world_transform(owner) else { return };
        let min_size = self.octree.config().min_drawable_size;

        let Some(drawable) = self.drawables.get_mut(key) else { return };
        if drawable.state != DrawableState::Unattached {
            return;
        }
        drawable.world_transform = world;
        drawable.world_bounds = drawable.compute_world_bounds(min_size);
        drawable.bounds_dirty = false;
        drawable.state = DrawableState::Inserted;
        let entry = OctreeEntry {
            key,
            bounds: drawable.world_bounds,
            flags: drawable.flags(),
            view_mask: drawable.view_mask(),
        };

        let moves = self.octree.insert(entry);
        self.apply_moves(&moves);
    }

    /// Take a drawable out of the octree.
    fn detach_drawable(&mut self, key: DrawableKey) {
        let Some(drawable) = self.drawables.get_mut(key) else { return };
        drawable.state = DrawableState::Unattached;
        let Some(octant) = drawable.octant.take() else { return };

        match self.octree.remove(key, octant) {
            Some(moves) => self.apply_moves(&moves),
            None => {
                crate::engine_error!("galaxy3d::Scene",
                    "Drawable {:?} not found in octant {:?}", key, octant);
                debug_assert!(false, "drawable back-reference out of sync");
            }
        }
    }

    /// Write octant back-references after structural changes.
    pub(crate) fn apply_moves(&mut self, moves: &[(DrawableKey, OctantId)]) {
        for &(key, octant) in moves {
            if let Some(drawable) = self.drawables.get_mut(key) {
                drawable.octant = Some(octant);
            }
        }
    }

    // ===== PICKING =====

    /// Every drawable hit by a ray, nearest first.
    pub fn raycast(&self, ray: &Ray, max_distance: f32, flags: DrawableFlags, view_mask: u32) -> Vec<RaycastResult> {
        self.octree.raycast(ray, max_distance, flags, view_mask, |entry, limit| {
            self.drawables.get(entry.key)?.raycast(ray, limit)
        })
    }

    /// Nearest drawable hit by a ray.
    pub fn raycast_single(&self, ray: &Ray, max_distance: f32, flags: DrawableFlags, view_mask: u32) -> Option<RaycastResult> {
        self.octree.raycast_single(ray, max_distance, flags, view_mask, |entry, limit| {
            self.drawables.get(entry.key)?.raycast(ray, limit)
        })
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.len())
            .field("drawables", &self.drawables.len())
            .field("pending_reinsertions", &self.reinsert_queue.len())
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
