//! Scene module
//!
//! Provides the scene graph, drawables, the octree, and the per-frame
//! strategies (updating, culling, view preparation, drawing).

mod spatial_node;
mod drawable;
mod light;
mod model;
mod octree;
mod scene;
mod updater;
mod culler;
mod view;
mod drawer;

pub use spatial_node::{
    SpatialNode, NodeKey, TransformSpace, NODE_FORWARD,
    look_rotation, direction_rotation,
};
pub use drawable::{
    Drawable, DrawableKey, DrawableKind, DrawableFlags, DrawableState, RenderPrep,
    previous_frame_number,
};
pub use light::{Light, LightType, ShadowVolume, DEFAULT_DIRECTIONAL_SHADOW_EXTENT};
pub use model::{LodLevel, ModelGeometry, GeometryList, StaticModel, SkinnedModel};
pub use octree::{
    Octree, Octant, OctantId, OctreeEntry, OctreeStats, RaycastResult,
    ReinsertRequest, ReinsertReport,
};
pub use scene::Scene;
pub use updater::{Updater, ParallelUpdater, UpdateStats};
pub use culler::{CameraCuller, BruteForceCuller, FrustumCuller};
pub use view::{ViewPreparer, RenderView, VisibleLight, ShadowView};
pub use drawer::{Drawer, ForwardDrawer, CommandSink, RenderPassKind};
