pub mod analysis;
pub mod context;
pub mod decode;
pub mod nodes;
pub mod notes;
