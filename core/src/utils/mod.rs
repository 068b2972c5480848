pub mod misc;
pub mod tracing;
