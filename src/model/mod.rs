pub mod beatmap;
pub mod config;
pub mod note;
