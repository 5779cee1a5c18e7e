/// Draw call descriptors and per-pass batch queues.
///
/// A BatchQueue is rebuilt every frame: cleared, filled by view
/// preparation, then sorted once. Sorting uses a radix sort over a
/// composite key whose low bits are the insertion index, so the order is
/// fully determined by the input order. Optionally, runs of identical
/// static batches are then collapsed into instanced draws whose
/// transforms live in the queue's instance buffer.

use std::sync::Arc;
use glam::Mat4;
use rdst::{RadixKey, RadixSort};
use crate::scene::DrawableKey;
use super::material::{GeometryId, MaterialPass};

// ===== SORT MODE =====

/// Ordering applied by `BatchQueue::sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatchSortMode {
    /// Minimize state changes: program, pass, geometry
    #[default]
    State,
    /// Nearest first (opaque depth pre-pass)
    FrontToBack,
    /// Farthest first (alpha blending)
    BackToFront,
}

// ===== BATCH =====

/// What a batch draws with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchContent {
    /// Plain static draw with a world transform
    Static { world_transform: Mat4 },
    /// Per-object setup needed (skinning), drawn through the drawable
    Complex { drawable: DrawableKey },
    /// Collapsed static run; `start..start + count` in the instance buffer
    Instanced { start: usize, count: usize },
}

/// Kind of a batch, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchType {
    Static,
    Complex,
    Instanced,
}

/// One draw call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Material pass
    pub pass: Arc<MaterialPass>,
    /// Geometry to draw
    pub geometry: GeometryId,
    /// Index of the geometry within its drawable (LOD-independent)
    pub geom_index: u32,
    /// Transform, drawable or instance range
    pub content: BatchContent,
    /// Camera distance of the source drawable
    pub distance: f32,
    /// Key used by the last sort
    pub sort_key: u64,
}

impl Batch {
    /// Static batch drawn with a world transform.
    pub fn new_static(
        pass: Arc<MaterialPass>,
        geometry: GeometryId,
        geom_index: u32,
        world_transform: Mat4,
        distance: f32,
    ) -> Self {
        Self {
            pass,
            geometry,
            geom_index,
            content: BatchContent::Static { world_transform },
            distance,
            sort_key: 0,
        }
    }

    /// Complex batch drawn through its drawable.
    pub fn new_complex(
        pass: Arc<MaterialPass>,
        geometry: GeometryId,
        geom_index: u32,
        drawable: DrawableKey,
        distance: f32,
    ) -> Self {
        Self {
            pass,
            geometry,
            geom_index,
            content: BatchContent::Complex { drawable },
            distance,
            sort_key: 0,
        }
    }

    pub fn batch_type(&self) -> BatchType {
        match self.content {
            BatchContent::Static { .. } => BatchType::Static,
            BatchContent::Complex { .. } => BatchType::Complex,
            BatchContent::Instanced { .. } => BatchType::Instanced,
        }
    }

    /// State key: program (16) | pass (16) | geometry (24) | geom index (7) | complex (1).
    ///
    /// Static batches of one pass/geometry pair sort adjacent to each other
    /// and before the matching complex batches.
    pub fn state_key(&self) -> u64 {
        let program = (self.pass.program_id() & 0xffff) as u64;
        let pass = (self.pass.id() & 0xffff) as u64;
        let geometry = (self.geometry.0 & 0x00ff_ffff) as u64;
        let geom_index = (self.geom_index & 0x7f) as u64;
        let complex = matches!(self.content, BatchContent::Complex { .. }) as u64;
        (program << 48) | (pass << 32) | (geometry << 8) | (geom_index << 1) | complex
    }

    fn key_for(&self, mode: BatchSortMode) -> u64 {
        match mode {
            BatchSortMode::State => self.state_key(),
            BatchSortMode::FrontToBack => {
                ((sortable_distance(self.distance) as u64) << 32) | (self.state_key() >> 32)
            }
            BatchSortMode::BackToFront => {
                ((!sortable_distance(self.distance) as u64) << 32) | (self.state_key() >> 32)
            }
        }
    }

    fn can_instance_with(&self, other: &Batch) -> bool {
        matches!(self.content, BatchContent::Static { .. })
            && matches!(other.content, BatchContent::Static { .. })
            && self.geometry == other.geometry
            && self.geom_index == other.geom_index
            && self.pass == other.pass
    }
}

/// Map an f32 to a u32 with the same ordering. NaN sorts as +inf.
fn sortable_distance(distance: f32) -> u32 {
    let value = if distance.is_nan() { f32::INFINITY } else { distance };
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 { !bits } else { bits | 0x8000_0000 }
}

// ===== RADIX SORT ENTRY =====

#[derive(Debug, Clone, Copy)]
struct SortEntry {
    key: u64,
    index: u32,
}

impl RadixKey for SortEntry {
    const LEVELS: usize = 12;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        if level < 4 {
            (self.index >> (level * 8)) as u8
        } else {
            (self.key >> ((level - 4) * 8)) as u8
        }
    }
}

// ===== BATCH QUEUE =====

/// Batches of one render pass.
#[derive(Debug, Clone, Default)]
pub struct BatchQueue {
    batches: Vec<Batch>,
    instance_transforms: Vec<Mat4>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear for the next frame, keeping allocations.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.instance_transforms.clear();
    }

    pub fn push(&mut self, batch: Batch) {
        self.batches.push(batch);
    }

    /// Sort the batches and optionally collapse static runs into instances.
    ///
    /// Ties keep their insertion order. Only runs of two or more
    /// consecutive `Static` batches with the same pass, geometry and
    /// geometry index are merged.
    pub fn sort(&mut self, mode: BatchSortMode, convert_to_instanced: bool) {
        if self.batches.len() > 1 {
            let mut entries: Vec<SortEntry> = self.batches.iter()
                .enumerate()
                .map(|(index, batch)| SortEntry { key: batch.key_for(mode), index: index as u32 })
                .collect();
            entries.radix_sort_unstable();

            let mut slots: Vec<Option<Batch>> = std::mem::take(&mut self.batches)
                .into_iter()
                .map(Some)
                .collect();
            self.batches = entries.iter()
                .filter_map(|entry| {
                    let mut batch = slots[entry.index as usize].take()?;
                    batch.sort_key = entry.key;
                    Some(batch)
                })
                .collect();
        } else if let Some(batch) = self.batches.first_mut() {
            batch.sort_key = batch.key_for(mode);
        }

        if convert_to_instanced {
            self.convert_to_instanced();
        }
    }

    fn convert_to_instanced(&mut self) {
        let mut merged: Vec<Batch> = Vec::with_capacity(self.batches.len());
        let mut batches = std::mem::take(&mut self.batches).into_iter().peekable();

        while let Some(mut batch) = batches.next() {
            let mut run = Vec::new();
            while let Some(next) = batches.next_if(|next| batch.can_instance_with(next)) {
                if let BatchContent::Static { world_transform } = next.content {
                    run.push(world_transform);
                }
            }

            if let BatchContent::Static { world_transform } = batch.content {
                if !run.is_empty() {
                    let start = self.instance_transforms.len();
                    self.instance_transforms.push(world_transform);
                    self.instance_transforms.extend(run);
                    let count = self.instance_transforms.len() - start;
                    batch.content = BatchContent::Instanced { start, count };
                }
            }
            merged.push(batch);
        }

        self.batches = merged;
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn has_batches(&self) -> bool {
        !self.batches.is_empty()
    }

    /// World transforms referenced by instanced batches.
    pub fn instance_transforms(&self) -> &[Mat4] {
        &self.instance_transforms
    }

    /// Instance transforms as raw bytes, ready for upload.
    pub fn instance_data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instance_transforms)
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
