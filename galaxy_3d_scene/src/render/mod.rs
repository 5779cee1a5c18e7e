//! Render-facing data produced by view preparation.
//!
//! Material passes and geometry handles identify GPU state owned by the
//! external renderer; batch queues are the ordered draw lists it consumes.

mod batch;
mod material;

pub use batch::{Batch, BatchContent, BatchQueue, BatchSortMode, BatchType};
pub use material::{BlendMode, GeometryId, Material, MaterialPass, PassType};
