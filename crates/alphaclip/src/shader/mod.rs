pub mod program;

pub use program::{Diagnostics, LocationTable, ShaderProgram, numbered_listing};
