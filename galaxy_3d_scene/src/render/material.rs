/// Render-facing material description.
///
/// A Material is a set of optional passes, one per render pass type. A
/// pass only carries the identities batches are sorted and grouped by:
/// the shader program, the pass's own state id and its blend mode.
/// Shader compilation and GPU state live in the external renderer.

use std::sync::Arc;

// ===== PASS TYPES =====

/// Render pass a material pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Shadow map rendering
    Shadow = 0,
    /// Opaque geometry
    Opaque = 1,
    /// Alpha blended geometry
    Alpha = 2,
}

impl PassType {
    /// Number of pass types.
    pub const COUNT: usize = 3;

    /// Pass types in render order.
    pub const ALL: [PassType; Self::COUNT] = [PassType::Shadow, PassType::Opaque, PassType::Alpha];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Blend state of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Add,
    Alpha,
    Premultiplied,
}

// ===== MATERIAL PASS =====

/// One render pass of a material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialPass {
    id: u32,
    program_id: u32,
    pass_type: PassType,
    blend: BlendMode,
}

impl MaterialPass {
    /// Create a pass. `id` identifies the pass's render state,
    /// `program_id` the shader program it binds.
    pub fn new(id: u32, program_id: u32, pass_type: PassType, blend: BlendMode) -> Self {
        Self { id, program_id, pass_type, blend }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn program_id(&self) -> u32 {
        self.program_id
    }

    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }
}

// ===== MATERIAL =====

/// Material: at most one pass per pass type.
#[derive(Debug, Clone, Default)]
pub struct Material {
    name: String,
    passes: [Option<Arc<MaterialPass>>; PassType::COUNT],
}

impl Material {
    /// Create a material with no passes.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passes: Default::default(),
        }
    }

    /// Builder: set the pass for its pass type, replacing any previous one.
    pub fn with_pass(mut self, pass: MaterialPass) -> Self {
        self.set_pass(pass);
        self
    }

    /// Set the pass for its pass type, replacing any previous one.
    pub fn set_pass(&mut self, pass: MaterialPass) {
        let index = pass.pass_type().index();
        self.passes[index] = Some(Arc::new(pass));
    }

    /// Remove the pass of a type. Returns false if there was none.
    pub fn remove_pass(&mut self, pass_type: PassType) -> bool {
        self.passes[pass_type.index()].take().is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass for a pass type, if the material renders in it.
    pub fn pass(&self, pass_type: PassType) -> Option<&Arc<MaterialPass>> {
        self.passes[pass_type.index()].as_ref()
    }
}

/// Opaque handle of a geometry owned by the external resource layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GeometryId(pub u32);
