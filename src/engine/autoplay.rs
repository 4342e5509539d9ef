use crate::engine::LocalInput;
use crate::model::beatmap::{Beatmap, NoteData};

/// Presses each note's lane as soon as the song reaches its hit time.
#[derive(Debug, Clone)]
pub struct Autoplay {
    notes: Vec<NoteData>,
    cursor: usize,
}

impl Autoplay {
    pub fn new(beatmap: &Beatmap) -> Self {
        Self {
            notes: beatmap.notes().to_vec(),
            cursor: 0,
        }
    }
}

impl LocalInput for Autoplay {
    fn poll(&mut self, song_position: f64) -> Vec<usize> {
        let mut lanes = Vec::new();

        while let Some(note) = self.notes.get(self.cursor) {
            if note.hit_time > song_position {
                break;
            }

            lanes.push(note.lane);
            self.cursor += 1;
        }

        lanes
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
