use anyhow::{Result, bail};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub hits: u32,
    pub misses: u32,
}

impl SessionState {
    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }
}

/// Play state plus score and combo bookkeeping. The state is only changed through these
/// methods; an invalid transition is an error and leaves everything untouched.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state.phase {
            Phase::Idle | Phase::Ended => {
                self.state = SessionState {
                    phase: Phase::Playing,
                    ..SessionState::default()
                };
                debug!("Session started..!");
                Ok(())
            }
            other => bail!("Cannot start a session that is {:?}..!", other),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state.phase != Phase::Playing {
            bail!("Cannot pause a session that is {:?}..!", self.state.phase);
        }

        self.state.phase = Phase::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state.phase != Phase::Paused {
            bail!("Cannot resume a session that is {:?}..!", self.state.phase);
        }

        self.state.phase = Phase::Playing;
        Ok(())
    }

    /// Stops play and keeps the final numbers around for the results screen.
    pub fn end(&mut self) -> Result<()> {
        match self.state.phase {
            Phase::Playing | Phase::Paused => {
                self.state.phase = Phase::Ended;
                debug!(
                    "Session ended with score {} and max combo {}..!",
                    self.state.score, self.state.max_combo
                );
                Ok(())
            }
            other => bail!("Cannot end a session that is {:?}..!", other),
        }
    }

    pub fn restart(&mut self) -> Result<()> {
        if self.state.phase != Phase::Ended {
            bail!("Cannot restart a session that is {:?}..!", self.state.phase);
        }

        self.state = SessionState::default();
        Ok(())
    }

    pub fn add_score(&mut self, points: u64) -> Result<()> {
        if self.state.phase != Phase::Playing {
            bail!("Cannot score while the session is {:?}..!", self.state.phase);
        }

        self.state.score = self.state.score.saturating_add(points);
        self.state.combo = self.state.combo.saturating_add(1);
        self.state.max_combo = self.state.max_combo.max(self.state.combo);
        Ok(())
    }

    pub fn reset_combo(&mut self) {
        self.state.combo = 0;
    }

    /// `add_score` that also counts the hit for the final report.
    pub fn record_hit(&mut self, points: u64) -> Result<()> {
        self.add_score(points)?;
        self.state.hits = self.state.hits.saturating_add(1);
        Ok(())
    }

    pub fn record_miss(&mut self) {
        self.state.misses = self.state.misses.saturating_add(1);
        self.reset_combo();
    }
}
