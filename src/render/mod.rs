pub mod compositor;
pub mod effects;
pub mod gpu;
pub mod style;
pub mod surface;
pub mod text;
