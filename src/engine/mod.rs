use crate::model::note::NoteView;

mod autoplay;
mod judge;
mod keyboard;
mod presenter;
mod scheduler;
mod session;

pub use autoplay::*;
pub use judge::*;
pub use keyboard::*;
pub use presenter::*;
pub use scheduler::*;
pub use session::*;

/// Whatever draws the game. Called from the game loop thread only.
pub trait Presenter {
    /// Called once per tick with read-only snapshots of the session and every live note.
    fn on_frame(&mut self, _state: &SessionState, _notes: &[NoteView]) {}

    /// Called for every hit and every miss.
    fn on_judgment(&mut self, _judgment: &Judgment) {}

    fn on_peer_connected(&mut self) {}

    fn on_phase(&mut self, _phase: Phase) {}
}

/// A source of lane presses polled by the game loop, e.g. the keyboard.
pub trait LocalInput {
    /// Lanes pressed since the previous call.
    fn poll(&mut self, song_position: f64) -> Vec<usize>;

    /// Called when the song restarts from the top.
    fn reset(&mut self) {}
}
