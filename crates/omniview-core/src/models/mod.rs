pub mod media;
pub mod render;

pub use media::*;
pub use render::*;
