use crate::model::beatmap::NoteData;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    Spawned,
    Hit,
    Missed,
    Despawned,
}

/// A live note, created by the scheduler once its spawn time has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Index of the note in its beatmap.
    pub id: usize,
    pub lane: usize,
    pub hit_time: f64,
    pub spawn_time: f64,
    pub state: NoteState,
}

impl Note {
    pub fn spawn(id: usize, data: &NoteData, lead_time: f64) -> Self {
        Self {
            id,
            lane: data.lane,
            hit_time: data.hit_time,
            spawn_time: data.hit_time - lead_time,
            state: NoteState::Spawned,
        }
    }

    /// How far along its approach the note is: 0.0 at spawn, 1.0 on the judgment line,
    /// and above 1.0 once it has passed it.
    pub fn progress(&self, song_position: f64) -> f64 {
        let travel = self.hit_time - self.spawn_time;
        if travel <= 0.0 {
            return 1.0;
        }

        (song_position - self.spawn_time) / travel
    }

    pub fn view(&self, song_position: f64) -> NoteView {
        NoteView {
            lane: self.lane,
            hit_time: self.hit_time,
            spawn_time: self.spawn_time,
            progress: self.progress(song_position),
        }
    }
}

/// Read-only snapshot of a live note handed to presentation every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteView {
    pub lane: usize,
    pub hit_time: f64,
    pub spawn_time: f64,
    pub progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Lane {
        lane: usize,
        source: InputSource,
        timestamp: Instant,
    },
    PeerConnected,
}
