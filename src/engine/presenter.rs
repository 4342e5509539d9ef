use crate::engine::{Judgment, Phase, Presenter, SessionState};
use crate::model::note::NoteView;
use log::{debug, info, trace};

/// Presents the game through the logger, for headless runs.
#[derive(Debug, Default)]
pub struct LogPresenter {
    verbose: bool,
    last_combo: u32,
}

impl LogPresenter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            last_combo: 0,
        }
    }
}

impl Presenter for LogPresenter {
    fn on_frame(&mut self, state: &SessionState, notes: &[NoteView]) {
        if state.combo != self.last_combo && state.combo > 0 && state.combo % 10 == 0 {
            info!("{} combo..!", state.combo);
        }
        self.last_combo = state.combo;

        trace!("score: {} | combo: {} | live notes: {}", state.score, state.combo, notes.len());
    }

    fn on_judgment(&mut self, judgment: &Judgment) {
        let line = match judgment {
            Judgment::Hit {
                lane,
                hit_time,
                offset,
                grade,
            } => format!(
                "{:?} on lane {} | note at {:>9.3}s | offset {:>+8.1}ms",
                grade,
                lane,
                hit_time,
                offset * 1000.0
            ),
            Judgment::Miss { lane, hit_time } => {
                format!("Miss on lane {} | note at {:>9.3}s", lane, hit_time)
            }
            Judgment::None => return,
        };

        if self.verbose {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }

    fn on_peer_connected(&mut self) {
        info!("Remote controller connected..!");
    }

    fn on_phase(&mut self, phase: Phase) {
        info!("Session is now {:?}..!", phase);
    }
}
