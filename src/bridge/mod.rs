mod listener;
mod payload;
mod queue;

pub use listener::*;
pub use payload::*;
pub use queue::*;
