use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_LANE_COUNT: usize = 4;
pub const DEFAULT_LANE_KEYS: [char; DEFAULT_LANE_COUNT] = ['d', 'f', 'j', 'k'];

#[derive(Parser, Debug)]
#[command(
    name = "taplane",
    about = "Play a four-lane rhythm chart with your keyboard or with taps from your phone!"
)]
pub struct Args {
    /// Path to a beatmap (.json) or a MIDI file (.mid/.midi). A random test chart is used when omitted.
    pub beatmap: Option<PathBuf>,

    /// JSON file with engine settings. The flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// UDP port the remote relay sends taps to.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address the UDP listener binds to.
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Seconds a note takes to travel from its spawn point to the judgment line.
    #[arg(long)]
    pub lead_time: Option<f64>,

    /// Maximum distance in seconds between a tap and a note for it to count as a hit.
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Seed for the generated test chart.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Number of notes in the generated test chart.
    #[arg(long, default_value_t = 50)]
    pub notes: usize,

    /// Keys for each lane, left to right, e.g. "dfjk".
    #[arg(short, long)]
    pub keys: Option<String>,

    /// Game loop ticks per second.
    #[arg(short, long, default_value_t = 240, value_parser = clap::value_parser!(u32).range(1..))]
    pub tick_rate: u32,

    /// Hit every note automatically, right on time.
    #[arg(short, long)]
    pub autoplay: bool,

    /// Don't open the UDP listener; play with local input only.
    #[arg(long)]
    pub no_network: bool,

    /// Dry run (print the first dry_run_max notes of the chart and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum notes to print in dry run.
    #[arg(long, default_value_t = 80)]
    pub dry_run_max: usize,

    /// Prints every judgment to the terminal.
    #[arg(short, long)]
    pub verbose: bool,

    /// Delays the start of the session by N seconds.
    #[arg(long = "delay-start", default_value_t = 0)]
    pub delay_start: u64,
}

impl Args {
    /// Settings from `--config` (or the defaults) with the command line flags applied on top.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(lead_time) = self.lead_time {
            config.lead_time = lead_time;
        }
        if let Some(keys) = &self.keys {
            config.lane_keys = keys.chars().collect();
        }
        if let Some(tolerance) = self.tolerance {
            config.hit_tolerance = tolerance;
            config.great_window = config.great_window.min(tolerance);
            config.perfect_window = config.perfect_window.min(tolerance);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Everything the engine needs to know up front. Nothing is looked up at runtime.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub lane_count: usize,
    /// Seconds between a note spawning and reaching the judgment line.
    pub lead_time: f64,
    /// An input closer than this (in seconds) to a note's hit time is a hit.
    pub hit_tolerance: f64,
    pub perfect_window: f64,
    pub great_window: f64,
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Inputs the network queue holds before it starts dropping the oldest.
    pub queue_capacity: usize,
    /// Upper bound on network inputs handled in a single tick.
    pub max_events_per_tick: usize,
    /// How often a blocked listener re-checks for a stop request.
    pub recv_poll_interval_ms: u64,
    /// End the session once every note has been hit or missed.
    pub end_when_finished: bool,
    /// Keyboard key for each lane, left to right.
    pub lane_keys: Vec<char>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lane_count: DEFAULT_LANE_COUNT,
            lead_time: 2.0,
            hit_tolerance: 0.15,
            perfect_window: 0.05,
            great_window: 0.10,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            queue_capacity: 256,
            max_events_per_tick: 64,
            recv_poll_interval_ms: 200,
            end_when_finished: true,
            lane_keys: DEFAULT_LANE_KEYS.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config {}", path.as_ref().display()))?;

        serde_json::from_str(&text).map_err(|e| anyhow!("Failed to parse config JSON: {}", e))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn recv_poll_interval(&self) -> Duration {
        Duration::from_millis(self.recv_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lane_count == 0 {
            bail!("lane_count must be greater than 0..!");
        }
        if !self.lead_time.is_finite() || self.lead_time < 0.0 {
            bail!("lead_time must be a non-negative number of seconds..!");
        }
        if !self.hit_tolerance.is_finite() || self.hit_tolerance <= 0.0 {
            bail!("hit_tolerance must be greater than 0..!");
        }
        if !(0.0..=self.great_window).contains(&self.perfect_window)
            || self.great_window > self.hit_tolerance
        {
            bail!(
                "Grade windows must satisfy 0 <= perfect ({}) <= great ({}) <= tolerance ({})..!",
                self.perfect_window,
                self.great_window,
                self.hit_tolerance
            );
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0..!");
        }
        if self.max_events_per_tick == 0 {
            bail!("max_events_per_tick must be greater than 0..!");
        }
        if self.recv_poll_interval_ms == 0 {
            bail!("recv_poll_interval_ms must be greater than 0..!");
        }
        if self.lane_keys.len() != self.lane_count {
            bail!(
                "lane_keys has {} keys for {} lanes..!",
                self.lane_keys.len(),
                self.lane_count
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.lane_count, 4);
        assert_eq!(config.socket_addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "port": 9000, "bind_addr": "127.0.0.1" }"#).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.lead_time, EngineConfig::default().lead_time);
    }

    #[test]
    fn grade_windows_must_fit_in_tolerance() {
        let config = EngineConfig {
            great_window: 0.2,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            perfect_window: 0.12,
            great_window: 0.10,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn lane_keys_default_and_must_match_lane_count() {
        assert_eq!(EngineConfig::default().lane_keys, vec!['d', 'f', 'j', 'k']);

        let config: EngineConfig = serde_json::from_str(r#"{ "lane_keys": ["q", "w"] }"#).unwrap();
        assert!(config.validate().is_err());

        let config: EngineConfig =
            serde_json::from_str(r#"{ "lane_count": 2, "lane_keys": ["q", "w"] }"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_queue_is_rejected() {
        let config = EngineConfig {
            queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "taplane",
            "--port",
            "9100",
            "--tolerance",
            "0.08",
            "--keys",
            "asKL",
        ]);
        let config = args.engine_config().unwrap();

        assert_eq!(config.lane_keys, vec!['a', 's', 'K', 'L']);
        assert_eq!(config.port, 9100);
        assert_eq!(config.hit_tolerance, 0.08);
        assert!(config.great_window <= 0.08);
        assert!(config.validate().is_ok());
    }
}
