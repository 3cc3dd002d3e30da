//! Shared pieces of the runtime samples

#![warn(missing_docs)]

pub mod app;
pub mod window;

pub use app::{checker_material, load_albedo, load_config, SampleError};
pub use window::{Window, WindowError};
