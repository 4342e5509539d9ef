mod beatmap_import;
mod bridge;
mod engine;
mod game;
mod model;

pub use beatmap_import::*;
pub use bridge::*;
pub use engine::*;
pub use game::*;
pub use model::beatmap::*;
pub use model::config::*;
pub use model::note::*;
