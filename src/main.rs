use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use taplane::{
    Args, Autoplay, Game, KeyMap, KeyboardInput, LogPresenter, Phase, TerminalKeys, load_beatmap,
};

fn main() -> Result<()> {
    // Raw mode needs an explicit carriage return.
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}\r",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
    let args = Args::parse();
    let config = args.engine_config()?;

    let beatmap = load_beatmap(
        args.beatmap.as_deref(),
        config.lane_count,
        args.seed,
        args.notes,
    )?;

    debug!(
        "Loaded beatmap '{}' with {} notes over {:.1}s..!",
        beatmap.title(),
        beatmap.len(),
        beatmap.duration()
    );

    if args.dry_run {
        info!("Previewing at most {} notes..!", args.dry_run_max);
        for (i, note) in beatmap.notes().iter().take(args.dry_run_max).enumerate() {
            info!(
                "Note {}: lane={} hit_time={:.3} spawn_time={:.3}",
                i,
                note.lane,
                note.hit_time,
                note.hit_time - config.lead_time
            );
        }
        return Ok(());
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let autoplay = args.autoplay.then(|| Autoplay::new(&beatmap));
    let mut game = Game::new(config, beatmap, LogPresenter::new(args.verbose))?;
    let mut terminal_keys = None;

    if let Some(autoplay) = autoplay {
        info!("Autoplay enabled..!");
        game.add_local_input(autoplay);
    } else {
        let map = KeyMap::from_config(game.config())?;
        let keys: String = map.keys().iter().collect();
        let (keyboard, key_tx) = KeyboardInput::new(map);

        match TerminalKeys::start(key_tx, Arc::clone(&interrupted)) {
            Ok(reader) => {
                info!("Press '{}' to hit the lanes, Esc to quit..!", keys);
                game.add_local_input(keyboard);
                terminal_keys = Some(reader);
            }
            Err(why) => warn!("Keyboard input unavailable: {:?}", why),
        }
    }

    if !args.no_network && game.start_network() {
        if let Some(addr) = game.bridge().local_addr() {
            info!("Waiting for taps on udp://{}..!", addr);
        }
    }

    let interrupted_for_handler = Arc::clone(&interrupted);

    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, ending the session..!");
        interrupted_for_handler.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler..!")?;

    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    if args.delay_start > 0 {
        info!("Starting in {} seconds..!", args.delay_start);
        sleeper.sleep(Duration::from_secs(args.delay_start));
    }

    game.start()?;

    let frame = Duration::from_secs_f64(1.0 / args.tick_rate as f64);
    let mut last = Instant::now();

    while game.state().phase != Phase::Ended && !interrupted.load(Ordering::SeqCst) {
        let now = Instant::now();
        let delta_time = now.duration_since(last).as_secs_f64();
        last = now;

        game.tick(delta_time);

        let spent = now.elapsed();
        if spent < frame {
            sleeper.sleep(frame - spent);
        }
    }

    if game.state().phase != Phase::Ended {
        game.end()?;
    }

    if let Some(mut reader) = terminal_keys {
        reader.stop()?;
    }

    let dropped = game.bridge().dropped();
    game.shutdown()?;

    let state = game.state();
    info!(
        "Session over..! score={} max_combo={} hits={} misses={}",
        state.score, state.max_combo, state.hits, state.misses
    );
    if dropped > 0 {
        warn!("{} network inputs were dropped on a full queue..!", dropped);
    }

    Ok(())
}
