pub mod annotator;
pub mod glyphs;
pub mod pipeline;
pub mod screenshot;
pub mod som_grid;
pub mod stability;
pub mod traits;
pub mod types;
pub mod yolo_detector;
