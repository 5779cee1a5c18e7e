/// Drawing strategies.
///
/// A Drawer walks the batch queues of a RenderView in render order and
/// emits draw commands into a CommandSink. The sink is the boundary to
/// the external renderer, which owns the GPU state the commands refer to.

use glam::Mat4;
use crate::error::Result;
use crate::render::{Batch, BatchContent, BatchQueue, GeometryId, MaterialPass};
use super::drawable::{Drawable, DrawableKey};
use super::scene::Scene;
use super::view::RenderView;

/// Render pass a command sequence belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPassKind {
    /// Shadow map of a light; index into `RenderView::shadow_views`
    Shadow { light: DrawableKey, view: usize },
    Opaque,
    Alpha,
}

/// Receiver of draw commands, implemented by the renderer.
pub trait CommandSink {
    /// Start a render pass. Material pass bindings do not carry over.
    fn begin_pass(&mut self, pass: RenderPassKind) -> Result<()>;

    /// Bind the program and render state of a material pass.
    fn bind_pass(&mut self, pass: &MaterialPass) -> Result<()>;

    /// Draw one geometry with a world transform.
    fn draw(&mut self, geometry: GeometryId, world_transform: &Mat4) -> Result<()>;

    /// Draw `count` instances; `instance_data` holds their world
    /// transforms as column-major f32 matrices.
    fn draw_instanced(&mut self, geometry: GeometryId, instance_data: &[u8], count: u32) -> Result<()>;

    /// Draw a geometry needing per-object setup (skinning).
    fn draw_complex(&mut self, geometry: GeometryId, drawable: &Drawable) -> Result<()>;
}

/// Strategy for drawing a prepared view.
///
/// `&self` because drawing is stateless; the same Drawer can be
/// reused across multiple scenes and frames.
pub trait Drawer: Send + Sync {
    fn draw(&self, scene: &Scene, view: &RenderView, sink: &mut dyn CommandSink) -> Result<()>;
}

/// Forward drawer: shadow maps first, then opaque, then alpha.
///
/// Queues are drawn in their sorted order. A material pass is bound only
/// when it differs from the previous batch's.
#[derive(Debug, Default)]
pub struct ForwardDrawer;

impl ForwardDrawer {
    pub fn new() -> Self {
        Self
    }

    fn draw_queue(
        scene: &Scene,
        pass: RenderPassKind,
        queue: &BatchQueue,
        sink: &mut dyn CommandSink,
    ) -> Result<()> {
        if !queue.has_batches() {
            return Ok(());
        }
        sink.begin_pass(pass)?;

        let mut bound: Option<&MaterialPass> = None;
        for batch in queue.batches() {
            if bound != Some(batch.pass.as_ref()) {
                sink.bind_pass(&batch.pass)?;
                bound = Some(batch.pass.as_ref());
            }
            Self::draw_batch(scene, queue, batch, sink)?;
        }
        Ok(())
    }

    fn draw_batch(scene: &Scene, queue: &BatchQueue, batch: &Batch, sink: &mut dyn CommandSink) -> Result<()> {
        match batch.content {
            BatchContent::Static { world_transform } => sink.draw(batch.geometry, &world_transform),
            BatchContent::Instanced { start, count } => {
                let transforms = &queue.instance_transforms()[start..start + count];
                sink.draw_instanced(batch.geometry, bytemuck::cast_slice(transforms), count as u32)
            }
            BatchContent::Complex { drawable } => match scene.drawable(drawable) {
                Some(drawable) => sink.draw_complex(batch.geometry, drawable),
                None => Ok(()), // removed between preparation and drawing
            },
        }
    }
}

impl Drawer for ForwardDrawer {
    fn draw(&self, scene: &Scene, view: &RenderView, sink: &mut dyn CommandSink) -> Result<()> {
        for (index, shadow_view) in view.shadow_views().iter().enumerate() {
            let pass = RenderPassKind::Shadow { light: shadow_view.light, view: index };
            Self::draw_queue(scene, pass, &shadow_view.queue, sink)?;
        }
        Self::draw_queue(scene, RenderPassKind::Opaque, view.opaque_queue(), sink)?;
        Self::draw_queue(scene, RenderPassKind::Alpha, view.alpha_queue(), sink)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "drawer_tests.rs"]
mod tests;
