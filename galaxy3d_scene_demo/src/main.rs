//! Galaxy3D scene demo
//!
//! Builds a field of boxes orbiting the origin plus a few characters and
//! lights, then runs a handful of frames: update pass, view preparation
//! and drawing into a sink that only counts commands.

use std::sync::Arc;
use galaxy_3d_scene::galaxy3d::{self, Result, SceneConfig, ViewConfig};
use galaxy_3d_scene::galaxy3d::camera::Camera;
use galaxy_3d_scene::galaxy3d::math::{AABB, Ray};
use galaxy_3d_scene::galaxy3d::render::{BlendMode, GeometryId, Material, MaterialPass, PassType};
use galaxy_3d_scene::galaxy3d::scene::{
    CommandSink, Drawable, DrawableFlags, DrawableKind, Drawer, ForwardDrawer, FrustumCuller,
    Light, ModelGeometry, NodeKey, ParallelUpdater, RenderPassKind, Scene, SkinnedModel,
    StaticModel, TransformSpace, Updater, ViewPreparer,
};
use glam::{Mat4, Quat, Vec3};

const FRAMES: usize = 5;
const RINGS: usize = 8;
const PER_RING: usize = 64;

/// Counts what the renderer would have been asked to do.
#[derive(Default)]
struct StatsSink {
    passes: usize,
    binds: usize,
    draws: usize,
    instanced_draws: usize,
    instances: usize,
    complex_draws: usize,
}

impl CommandSink for StatsSink {
    fn begin_pass(&mut self, _pass: RenderPassKind) -> Result<()> {
        self.passes += 1;
        Ok(())
    }

    fn bind_pass(&mut self, _pass: &MaterialPass) -> Result<()> {
        self.binds += 1;
        Ok(())
    }

    fn draw(&mut self, _geometry: GeometryId, _world_transform: &Mat4) -> Result<()> {
        self.draws += 1;
        Ok(())
    }

    fn draw_instanced(&mut self, _geometry: GeometryId, _instance_data: &[u8], count: u32) -> Result<()> {
        self.instanced_draws += 1;
        self.instances += count as usize;
        Ok(())
    }

    fn draw_complex(&mut self, _geometry: GeometryId, _drawable: &Drawable) -> Result<()> {
        self.complex_draws += 1;
        Ok(())
    }
}

fn build_scene(scene: &mut Scene) -> Result<Vec<NodeKey>> {
    let stone = Arc::new(Material::new("stone")
        .with_pass(MaterialPass::new(1, 1, PassType::Opaque, BlendMode::Replace))
        .with_pass(MaterialPass::new(2, 2, PassType::Shadow, BlendMode::Replace)));
    let glass = Arc::new(Material::new("glass")
        .with_pass(MaterialPass::new(3, 3, PassType::Alpha, BlendMode::Alpha)));
    let unit_box = AABB::new(Vec3::splat(-0.5), Vec3::splat(0.5));

    // One pivot per ring; rotating a pivot moves every box on it.
    let mut pivots = Vec::with_capacity(RINGS);
    for ring in 0..RINGS {
        let pivot = scene.create_node(&format!("ring{}", ring), None)?;
        let radius = 10.0 + ring as f32 * 12.0;
        for i in 0..PER_RING {
            let angle = i as f32 / PER_RING as f32 * std::f32::consts::TAU;
            let node = scene.create_node("box", Some(pivot))?;
            scene.set_position(node, Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius));

            let material = if i % 8 == 0 { glass.clone() } else { stone.clone() };
            let geometry = ModelGeometry::new(GeometryId(1), material)
                .with_lod(GeometryId(2), 60.0)
                .with_lod(GeometryId(3), 120.0);
            let model = StaticModel::new(unit_box).with_geometry(geometry);
            scene.create_drawable(node, DrawableKind::StaticModel(model))?;
        }
        pivots.push(pivot);
    }

    for i in 0..4 {
        let node = scene.create_node("character", None)?;
        scene.set_position(node, Vec3::new(i as f32 * 3.0 - 4.5, 0.0, 5.0));
        let model = SkinnedModel::new(AABB::new(Vec3::new(-0.5, 0.0, -0.5), Vec3::new(0.5, 2.0, 0.5)))
            .with_geometry(ModelGeometry::new(GeometryId(10), stone.clone()));
        scene.create_drawable(node, DrawableKind::SkinnedModel(model))?;
    }

    let sun = scene.create_node("sun", None)?;
    scene.set_direction(sun, Vec3::new(-0.4, -1.0, -0.3));
    let sun_light = scene.create_drawable(sun, DrawableKind::Light(Light::directional()))?;
    scene.modify_drawable(sun_light, |drawable| drawable.set_cast_shadows(true));

    for i in 0..16 {
        let node = scene.create_node("lamp", None)?;
        let angle = i as f32 / 16.0 * std::f32::consts::TAU;
        scene.set_position(node, Vec3::new(angle.cos() * 40.0, 3.0, angle.sin() * 40.0));
        scene.create_drawable(node, DrawableKind::Light(Light::point(15.0)))?;
    }

    Ok(pivots)
}

fn main() -> Result<()> {
    let mut scene = Scene::new(&SceneConfig::default());
    let pivots = build_scene(&mut scene)?;

    let mut updater = ParallelUpdater::from_config(&SceneConfig::default())?;
    let mut preparer = ViewPreparer::new(ViewConfig::default(), Box::new(FrustumCuller::new()), 0)?;
    let camera = Camera::perspective_look_at(
        Vec3::new(0.0, 40.0, 150.0), Vec3::ZERO, Vec3::Y,
        std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, 1000.0,
    );
    let drawer = ForwardDrawer::new();

    println!("Scene: {} nodes, {} drawables, {} worker threads",
        scene.node_count(), scene.drawable_count(), updater.num_threads());

    for frame in 0..FRAMES {
        for (ring, &pivot) in pivots.iter().enumerate() {
            let speed = 0.05 / (ring + 1) as f32;
            scene.rotate(pivot, Quat::from_rotation_y(speed), TransformSpace::Parent);
        }

        let update = updater.update(&mut scene)?;
        let view = preparer.prepare_view(&mut scene, &camera, false, 1.0 / 60.0);
        let mut sink = StatsSink::default();
        drawer.draw(&scene, &view, &mut sink)?;

        println!(
            "Frame {} (#{}): reinserted {} (relocated {}, deferred {}), {} geometries, {} lights, \
             {} shadow view(s), {} passes, {} binds, {} draws, {} instanced ({} instances), {} complex",
            frame, update.frame_number, update.processed, update.relocated, update.deferred,
            view.geometries().len(), view.lights().len(), view.shadow_views().len(),
            sink.passes, sink.binds, sink.draws, sink.instanced_draws, sink.instances, sink.complex_draws,
        );
    }

    let stats = scene.octree().stats();
    println!("Octree: {} octants, {} splits, {} merges, {} octant changes over {} reinsertions",
        stats.octants, stats.splits, stats.merges, stats.octant_changes, stats.reinsertions);

    let ray = Ray::new(Vec3::new(0.0, 0.5, 150.0), Vec3::NEG_Z);
    match scene.raycast_single(&ray, 500.0, DrawableFlags::GEOMETRY, galaxy3d::camera::VIEW_MASK_ALL) {
        Some(hit) => println!("Picked {:?} at distance {:.2}", hit.drawable, hit.distance),
        None => println!("Picked nothing"),
    }

    Ok(())
}
