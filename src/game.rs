use crate::bridge::NetworkBridge;
use crate::engine::{
    Judge, JudgeWindows, Judgment, LocalInput, Phase, Presenter, Scheduler, Session, SessionState,
};
use crate::model::beatmap::Beatmap;
use crate::model::config::EngineConfig;
use crate::model::note::{InputEvent, InputSource, Note, NoteView};
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};

/// The application context: one per process, owning everything the game loop touches.
///
/// Everything here runs on the game loop thread. The only thing shared with another thread is
/// the bridge's input queue.
pub struct Game<P: Presenter> {
    config: EngineConfig,
    scheduler: Scheduler,
    judge: Judge,
    session: Session,
    bridge: NetworkBridge,
    presenter: P,
    local_inputs: Vec<Box<dyn LocalInput>>,
}

impl<P: Presenter> Game<P> {
    pub fn new(config: EngineConfig, beatmap: Beatmap, presenter: P) -> Result<Self> {
        config.validate()?;
        beatmap
            .validate(config.lane_count)
            .with_context(|| format!("Beatmap '{}' doesn't fit the lane layout", beatmap.title()))?;

        info!(
            "Loaded beatmap: '{}' with {} notes..!",
            beatmap.title(),
            beatmap.len()
        );

        Ok(Self {
            scheduler: Scheduler::new(beatmap, config.lead_time),
            judge: Judge::new(JudgeWindows::from_config(&config)),
            session: Session::new(),
            bridge: NetworkBridge::new(&config),
            presenter,
            local_inputs: Vec::new(),
            config,
        })
    }

    pub fn add_local_input<I: LocalInput + 'static>(&mut self, input: I) {
        self.local_inputs.push(Box::new(input));
    }

    /// Opens the UDP listener. On failure the error is logged once and the game carries on
    /// with local input only; it is never retried.
    pub fn start_network(&mut self) -> bool {
        match self.bridge.start() {
            Ok(()) => true,
            Err(why) => {
                error!(
                    "Network input unavailable, continuing with local input only: {:?}",
                    why
                );
                false
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.session.start()?;
        self.rewind();
        self.presenter.on_phase(Phase::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.session.pause()?;
        self.presenter.on_phase(Phase::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.session.resume()?;
        self.presenter.on_phase(Phase::Playing);
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.session.end()?;
        self.presenter.on_phase(Phase::Ended);
        Ok(())
    }

    /// Ended -> Idle -> Playing from the top of the chart.
    pub fn restart(&mut self) -> Result<()> {
        self.session.restart()?;
        self.presenter.on_phase(Phase::Idle);
        self.start()
    }

    /// The single entry point for lane presses, local or remote.
    pub fn press_lane(&mut self, lane: usize, source: InputSource) -> Judgment {
        if !self.session.state().is_playing() {
            trace!(
                "Ignoring {:?} press on lane {} while {:?}..!",
                source,
                lane,
                self.session.phase()
            );
            return Judgment::None;
        }

        let judgment = self.judge.on_input(lane, self.scheduler.song_position());

        if let Judgment::Hit { grade, .. } = judgment {
            if let Err(why) = self.session.record_hit(grade.points()) {
                warn!("Failed to record a hit: {:?}", why);
            }
            self.presenter.on_judgment(&judgment);
        }

        judgment
    }

    /// Runs one iteration of the game loop. Never blocks.
    pub fn tick(&mut self, delta_time: f64) {
        if self.session.state().is_playing() {
            self.scheduler.advance(delta_time);
            for note in self.scheduler.poll_due() {
                self.judge.spawn(note);
            }
        }

        for event in self.bridge.poll() {
            match event {
                InputEvent::PeerConnected => self.presenter.on_peer_connected(),
                InputEvent::Lane {
                    lane,
                    source,
                    timestamp,
                } => {
                    trace!(
                        "Remote press on lane {} queued {:?} ago",
                        lane,
                        timestamp.elapsed()
                    );
                    self.press_lane(lane, source);
                }
            }
        }

        if self.session.state().is_playing() {
            let song_position = self.scheduler.song_position();
            let pressed: Vec<usize> = self
                .local_inputs
                .iter_mut()
                .flat_map(|input| input.poll(song_position))
                .collect();

            for lane in pressed {
                self.press_lane(lane, InputSource::Local);
            }

            for miss in self.judge.sweep(song_position) {
                self.session.record_miss();
                self.presenter.on_judgment(&miss);
            }

            let finished = self.scheduler.is_exhausted() && self.judge.is_empty();
            if self.config.end_when_finished && finished {
                debug!("Every note has been judged, ending the session..!");
                if let Err(why) = self.end() {
                    warn!("Failed to end the session: {:?}", why);
                }
            }
        }

        let song_position = self.scheduler.song_position();
        let views: Vec<NoteView> = self
            .judge
            .active()
            .iter()
            .map(|note| note.view(song_position))
            .collect();
        self.presenter.on_frame(self.session.state(), &views);
    }

    /// Stops the network listener. The game stays usable with local input.
    pub fn shutdown(&mut self) -> Result<()> {
        self.bridge.stop()
    }

    fn rewind(&mut self) {
        self.scheduler.start();
        self.judge.clear();
        for input in self.local_inputs.iter_mut() {
            input.reset();
        }
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn song_position(&self) -> f64 {
        self.scheduler.song_position()
    }

    pub fn active_notes(&self) -> &[Note] {
        self.judge.active()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bridge(&self) -> &NetworkBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut NetworkBridge {
        &mut self.bridge
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }
}
