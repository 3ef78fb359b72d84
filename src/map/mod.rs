pub mod geometry;
mod globe;
mod renderer;
mod spatial;

pub use globe::{Flight, GlobeViewport};
pub use renderer::{Fill, GlobeLayers, GlobeRenderer};
