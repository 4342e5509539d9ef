use crate::model::beatmap::Beatmap;
use crate::model::note::Note;
use log::{debug, warn};

/// Owns the song clock and walks the beatmap once, handing out notes as their spawn time
/// (`hit_time - lead_time`) comes up.
#[derive(Debug)]
pub struct Scheduler {
    beatmap: Beatmap,
    lead_time: f64,
    song_position: f64,
    cursor: usize,
}

impl Scheduler {
    pub fn new(beatmap: Beatmap, lead_time: f64) -> Self {
        Self {
            beatmap,
            lead_time,
            song_position: 0.0,
            cursor: 0,
        }
    }

    pub fn start(&mut self) {
        self.cursor = 0;
        self.song_position = 0.0;

        debug!(
            "Scheduler started for '{}' with {} notes..!",
            self.beatmap.title(),
            self.beatmap.len()
        );
    }

    pub fn advance(&mut self, delta_time: f64) {
        if !delta_time.is_finite() || delta_time < 0.0 {
            warn!("Ignoring invalid scheduler step of {}s..!", delta_time);
            return;
        }

        self.song_position += delta_time;
    }

    /// Every note whose spawn time has been reached since the last call, in hit time order.
    /// A long frame returns all the notes it skipped over, none are lost.
    pub fn poll_due(&mut self) -> Vec<Note> {
        let mut due = Vec::new();

        while let Some(data) = self.beatmap.notes().get(self.cursor) {
            if data.hit_time - self.lead_time > self.song_position {
                break;
            }

            due.push(Note::spawn(self.cursor, data, self.lead_time));
            self.cursor += 1;
        }

        due
    }

    pub fn song_position(&self) -> f64 {
        self.song_position
    }

    pub fn lead_time(&self) -> f64 {
        self.lead_time
    }

    pub fn beatmap(&self) -> &Beatmap {
        &self.beatmap
    }

    /// Notes not spawned yet.
    pub fn remaining(&self) -> usize {
        self.beatmap.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
