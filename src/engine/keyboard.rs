use crate::engine::LocalInput;
use crate::model::config::EngineConfig;
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

const KEY_BUFFER: usize = 64;
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which key presses which lane. Lane `i` is bound to `keys[i]`, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    keys: Vec<char>,
}

impl KeyMap {
    pub fn new(keys: &[char]) -> Result<Self> {
        if keys.is_empty() {
            bail!("A key map needs at least one key..!");
        }

        let keys: Vec<char> = keys.iter().map(|k| k.to_ascii_lowercase()).collect();
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                bail!("Key '{}' is bound to more than one lane..!", key);
            }
        }

        Ok(Self { keys })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        if config.lane_keys.len() != config.lane_count {
            bail!(
                "{} lane keys configured for {} lanes..!",
                config.lane_keys.len(),
                config.lane_count
            );
        }

        Self::new(&config.lane_keys)
    }

    pub fn lane_for(&self, key: char) -> Option<usize> {
        let key = key.to_ascii_lowercase();
        self.keys.iter().position(|k| *k == key)
    }

    pub fn keys(&self) -> &[char] {
        &self.keys
    }
}

/// Local input fed with key presses from another thread. `poll` never waits.
#[derive(Debug)]
pub struct KeyboardInput {
    map: KeyMap,
    rx: Receiver<char>,
}

impl KeyboardInput {
    /// Returns the input and the sender a key reader pushes presses into.
    pub fn new(map: KeyMap) -> (Self, Sender<char>) {
        let (tx, rx) = bounded::<char>(KEY_BUFFER);
        (Self { map, rx }, tx)
    }

    pub fn map(&self) -> &KeyMap {
        &self.map
    }
}

impl LocalInput for KeyboardInput {
    fn poll(&mut self, _song_position: f64) -> Vec<usize> {
        self.rx
            .try_iter()
            .filter_map(|key| {
                let lane = self.map.lane_for(key);
                if lane.is_none() {
                    trace!("Key '{}' isn't bound to a lane..!", key);
                }
                lane
            })
            .collect()
    }

    fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

enum ControlMsg {
    Stop,
}

/// Reads key presses from the terminal on a background thread, with the terminal in raw mode
/// until `stop`. Esc and Ctrl-C raise the `interrupted` flag, since raw mode swallows SIGINT.
pub struct TerminalKeys {
    control_tx: Option<mpsc::Sender<ControlMsg>>,
    handle: Option<JoinHandle<()>>,
}

impl TerminalKeys {
    pub fn start(keys: Sender<char>, interrupted: Arc<AtomicBool>) -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to put the terminal in raw mode..!")?;

        let (tx, rx) = mpsc::channel::<ControlMsg>();
        let spawned = thread::Builder::new()
            .name("taplane-keys".into())
            .spawn(move || read_keys(rx, keys, interrupted));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(why) => {
                let _ = terminal::disable_raw_mode();
                bail!("Failed to spawn the key reader thread: {}..!", why);
            }
        };

        info!("Reading lane keys from the terminal..!");
        Ok(Self {
            control_tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Joins the reader and gives the terminal back. Calling it twice does nothing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ControlMsg::Stop);
        }

        let joined = handle.join();
        terminal::disable_raw_mode().context("Failed to restore the terminal..!")?;

        if joined.is_err() {
            bail!("Key reader thread panicked..!");
        }

        debug!("Stopped reading lane keys..!");
        Ok(())
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(why) = self.stop() {
            warn!("Failed to stop the key reader cleanly: {:?}", why);
        }
    }
}

fn read_keys(ctrl_rx: mpsc::Receiver<ControlMsg>, keys: Sender<char>, interrupted: Arc<AtomicBool>) {
    loop {
        match ctrl_rx.try_recv() {
            Ok(ControlMsg::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match event::poll(KEY_POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(why) => {
                warn!("Terminal poll failed, no more key input: {}..!", why);
                break;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(why) => {
                warn!("Terminal read failed, no more key input: {}..!", why);
                break;
            }
        };

        match key {
            KeyEvent {
                kind: KeyEventKind::Press,
                code: KeyCode::Char('c'),
                modifiers,
                ..
            } if modifiers.contains(KeyModifiers::CONTROL) => {
                interrupted.store(true, Ordering::SeqCst);
            }
            KeyEvent {
                kind: KeyEventKind::Press,
                code: KeyCode::Esc,
                ..
            } => interrupted.store(true, Ordering::SeqCst),
            KeyEvent {
                kind: KeyEventKind::Press,
                code: KeyCode::Char(c),
                ..
            } => match keys.try_send(c) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Key buffer full, dropped '{}'..!", c),
                Err(TrySendError::Disconnected(_)) => break,
            },
            _ => {}
        }
    }

    debug!("Key reader thread exiting..!");
}
