//! Video side: letterboxing, luma differencing and the motion heatmap.
//!
//! ```text
//! VideoTrack::current_frame → Letterboxer(target_size)
//!     → FrameDifferencer → mean |Δluma| + cell grid
//!                             └→ HeatmapAccumulator → RGBA raster
//! ```

pub mod heatmap;
pub mod letterbox;
pub mod motion;

pub use heatmap::{encode_png, heat_color, to_data_url, HeatmapAccumulator};
pub use letterbox::Letterboxer;
pub use motion::{grid_dim_for, FrameDifferencer, MotionSample};
