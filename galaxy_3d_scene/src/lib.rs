/*!
# Galaxy 3D Scene

Spatial core of the Galaxy 3D renderer: scene graph, loose octree and the
per-frame passes that turn the scene into sorted draw batches.

## Architecture

- **Scene**: owns spatial nodes, their drawables and the octree
- **Octree**: loose octree with set-based split/merge rebalancing
- **Updater**: parallel per-frame reinsertion of moved drawables
- **CameraCuller**: visible drawables of a camera (octree or brute force)
- **ViewPreparer**: batch queues per render pass, lights and shadow views
- **Drawer**: ordered consumption of the queues through a `CommandSink`

The GPU device, resource loading and animation are external: the core only
consumes their identities (`GeometryId`, `MaterialPass`) and bounding boxes.
*/

// Internal modules
mod error;
mod config;
pub mod log;
pub mod math;
pub mod camera;
pub mod render;
pub mod scene;
pub mod utils;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Construction-time configuration
    pub use crate::config::{
        OctreeConfig, SceneConfig, ViewConfig,
        DEFAULT_WORLD_HALF_EXTENT, MAX_OCTREE_DEPTH,
    };

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // Bounding volumes and rays
    pub mod math {
        pub use crate::math::*;
    }

    // Cameras and frustums
    pub mod camera {
        pub use crate::camera::*;
    }

    // Materials, batches and queues
    pub mod render {
        pub use crate::render::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }

    // Worker pool
    pub mod utils {
        pub use crate::utils::*;
    }
}

// Re-export math library at crate root
pub use glam;
