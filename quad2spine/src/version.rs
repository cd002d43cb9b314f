//! Target Spine export version.

/// Target Spine major version for exported data.
pub const SPINE_EXPORT_MAJOR: u32 = 3;

/// Target Spine minor version for exported data.
pub const SPINE_EXPORT_MINOR: u32 = 8;

/// Version string written to `skeleton.spine`.
pub const SPINE_EXPORT_VERSION: &str = "3.8.99";

/// Source frame rate of quad timelines.
pub const QUAD_FPS: f32 = 60.0;
