use crate::model::config::EngineConfig;
use crate::model::note::{Note, NoteState};
use log::trace;
use std::cmp::Ordering;

pub const PERFECT_POINTS: u64 = 300;
pub const GREAT_POINTS: u64 = 200;
pub const GOOD_POINTS: u64 = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    Perfect,
    Great,
    Good,
}

impl Grade {
    pub fn points(self) -> u64 {
        match self {
            Grade::Perfect => PERFECT_POINTS,
            Grade::Great => GREAT_POINTS,
            Grade::Good => GOOD_POINTS,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Judgment {
    Hit {
        lane: usize,
        hit_time: f64,
        /// Signed seconds between the input and the note, positive when late.
        offset: f64,
        grade: Grade,
    },
    Miss {
        lane: usize,
        hit_time: f64,
    },
    /// The input didn't land close enough to any note in its lane.
    None,
}

impl Judgment {
    pub fn is_hit(&self) -> bool {
        matches!(self, Judgment::Hit { .. })
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Judgment::Miss { .. })
    }
}

/// Timing windows in seconds. Every window is an exclusive upper bound on `|offset|`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgeWindows {
    pub hit_tolerance: f64,
    pub perfect: f64,
    pub great: f64,
}

impl JudgeWindows {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            hit_tolerance: config.hit_tolerance,
            perfect: config.perfect_window,
            great: config.great_window,
        }
    }

    pub fn grade(&self, distance: f64) -> Grade {
        if distance < self.perfect {
            Grade::Perfect
        } else if distance < self.great {
            Grade::Great
        } else {
            Grade::Good
        }
    }
}

/// The active note set and the rules for resolving it.
///
/// `active` stays sorted by `(hit_time, id)`, so scanning it front to back visits the earliest
/// scheduled note first. Equidistant candidates resolve to the earliest one because only a
/// strictly smaller distance replaces the current pick.
#[derive(Debug)]
pub struct Judge {
    windows: JudgeWindows,
    active: Vec<Note>,
}

impl Judge {
    pub fn new(windows: JudgeWindows) -> Self {
        Self {
            windows,
            active: Vec::new(),
        }
    }

    pub fn windows(&self) -> &JudgeWindows {
        &self.windows
    }

    pub fn spawn(&mut self, note: Note) {
        let at = self.active.partition_point(|n| {
            n.hit_time
                .total_cmp(&note.hit_time)
                .then(n.id.cmp(&note.id))
                == Ordering::Less
        });

        self.active.insert(at, note);
    }

    pub fn on_input(&mut self, lane: usize, song_position: f64) -> Judgment {
        let mut best: Option<(usize, f64)> = None;

        for (i, note) in self.active.iter().enumerate() {
            if note.lane != lane {
                continue;
            }

            let distance = (note.hit_time - song_position).abs();
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        let Some((index, distance)) = best else {
            trace!("Lane {} pressed at {:.3}s with no notes in it..!", lane, song_position);
            return Judgment::None;
        };

        if distance >= self.windows.hit_tolerance {
            trace!(
                "Lane {} pressed at {:.3}s, nearest note {:.3}s away..!",
                lane, song_position, distance
            );
            return Judgment::None;
        }

        let mut note = self.active.remove(index);
        note.state = NoteState::Hit;

        Judgment::Hit {
            lane: note.lane,
            hit_time: note.hit_time,
            offset: song_position - note.hit_time,
            grade: self.windows.grade(distance),
        }
    }

    /// Resolves every note that can no longer be hit as a miss. Run once per tick.
    pub fn sweep(&mut self, song_position: f64) -> Vec<Judgment> {
        let tolerance = self.windows.hit_tolerance;
        let mut missed = Vec::new();

        self.active.retain_mut(|note| {
            if song_position > note.hit_time + tolerance {
                note.state = NoteState::Missed;
                missed.push(Judgment::Miss {
                    lane: note.lane,
                    hit_time: note.hit_time,
                });
                false
            } else {
                true
            }
        });

        missed
    }

    /// Drops every live note without judging it.
    pub fn clear(&mut self) {
        for note in self.active.iter_mut() {
            note.state = NoteState::Despawned;
        }
        self.active.clear();
    }

    pub fn active(&self) -> &[Note] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::beatmap::NoteData;

    fn judge(tolerance: f64) -> Judge {
        Judge::new(JudgeWindows {
            hit_tolerance: tolerance,
            perfect: tolerance / 3.0,
            great: tolerance * 2.0 / 3.0,
        })
    }

    fn note(id: usize, lane: usize, hit_time: f64) -> Note {
        Note::spawn(id, &NoteData { lane, hit_time }, 2.0)
    }

    #[test]
    fn input_inside_tolerance_hits() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 2, 5.0));

        let result = judge.on_input(2, 4.95);

        assert!(result.is_hit());
        assert!(judge.is_empty());
    }

    #[test]
    fn input_outside_tolerance_leaves_note_active() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 2, 5.0));

        assert_eq!(judge.on_input(2, 4.85), Judgment::None);
        assert_eq!(judge.len(), 1);
    }

    #[test]
    fn input_on_wrong_lane_is_ignored() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 2, 5.0));

        assert_eq!(judge.on_input(1, 5.0), Judgment::None);
        assert_eq!(judge.len(), 1);
    }

    #[test]
    fn input_with_no_notes_is_ignored() {
        let mut judge = judge(0.1);
        assert_eq!(judge.on_input(0, 1.0), Judgment::None);
    }

    #[test]
    fn nearest_note_in_lane_wins() {
        let mut judge = judge(0.3);
        judge.spawn(note(0, 1, 5.0));
        judge.spawn(note(1, 1, 5.25));
        judge.spawn(note(2, 0, 5.2));

        let Judgment::Hit { hit_time, lane, .. } = judge.on_input(1, 5.2) else {
            panic!("expected a hit");
        };

        assert_eq!(lane, 1);
        assert_eq!(hit_time, 5.25);
        assert_eq!(judge.len(), 2);
    }

    #[test]
    fn equidistant_notes_resolve_to_the_earlier_one() {
        let mut judge = judge(0.3);
        // Spawned out of order on purpose.
        judge.spawn(note(1, 3, 5.25));
        judge.spawn(note(0, 3, 4.75));

        let Judgment::Hit { hit_time, offset, .. } = judge.on_input(3, 5.0) else {
            panic!("expected a hit");
        };

        assert_eq!(hit_time, 4.75);
        assert_eq!(offset, 0.25);
        assert_eq!(judge.active()[0].hit_time, 5.25);
    }

    #[test]
    fn stacked_notes_resolve_in_spawn_order() {
        let mut judge = judge(0.1);
        judge.spawn(note(4, 0, 2.0));
        judge.spawn(note(3, 0, 2.0));

        judge.on_input(0, 2.0);
        assert_eq!(judge.active()[0].id, 4);
    }

    #[test]
    fn grades_follow_distance() {
        let windows = JudgeWindows {
            hit_tolerance: 0.15,
            perfect: 0.05,
            great: 0.10,
        };

        assert_eq!(windows.grade(0.0), Grade::Perfect);
        assert_eq!(windows.grade(0.049), Grade::Perfect);
        assert_eq!(windows.grade(0.05), Grade::Great);
        assert_eq!(windows.grade(0.1), Grade::Good);
        assert!(Grade::Perfect.points() > Grade::Great.points());
        assert!(Grade::Great.points() > Grade::Good.points());
    }

    #[test]
    fn late_input_reports_positive_offset() {
        let mut judge = judge(0.15);
        judge.spawn(note(0, 0, 1.0));

        let Judgment::Hit { offset, grade, .. } = judge.on_input(0, 1.125) else {
            panic!("expected a hit");
        };

        assert_eq!(offset, 0.125);
        assert_eq!(grade, Grade::Good);
    }

    #[test]
    fn sweep_misses_notes_once_past_tolerance() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 2, 5.0));

        assert!(judge.sweep(5.0).is_empty());
        assert!(judge.sweep(5.0625).is_empty());

        let missed = judge.sweep(5.125);
        assert_eq!(missed, vec![Judgment::Miss { lane: 2, hit_time: 5.0 }]);
        assert!(judge.is_empty());
        assert!(judge.sweep(6.0).is_empty());
    }

    #[test]
    fn sweep_reports_misses_in_hit_time_order() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 0, 1.0));
        judge.spawn(note(1, 3, 1.5));
        judge.spawn(note(2, 1, 9.0));

        let missed = judge.sweep(2.0);
        assert_eq!(
            missed,
            vec![
                Judgment::Miss { lane: 0, hit_time: 1.0 },
                Judgment::Miss { lane: 3, hit_time: 1.5 },
            ]
        );
        assert_eq!(judge.len(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut judge = judge(0.1);
        judge.spawn(note(0, 0, 1.0));
        judge.spawn(note(1, 1, 1.0));

        judge.clear();
        assert!(judge.is_empty());
    }
}
