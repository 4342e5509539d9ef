use crate::model::beatmap::{Beatmap, Metadata, NoteData};
use anyhow::{Result, anyhow, bail};
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

pub const TEST_BEATMAP_NOTES: usize = 50;
pub const TEST_BEATMAP_START: f64 = 2.0;
pub const TEST_BEATMAP_STEP: f64 = 0.5;

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub seconds_at_start: f64,
}

/// Loads a chart from a `.json` beatmap or a `.mid`/`.midi` file, or generates the test chart
/// when no path is given.
pub fn load_beatmap(
    path: Option<&Path>,
    lane_count: usize,
    seed: u64,
    count: usize,
) -> Result<Beatmap> {
    let Some(path) = path else {
        info!("No beatmap given, generating a {} note test chart..!", count);
        return Ok(generate_test_beatmap(
            count,
            TEST_BEATMAP_START,
            TEST_BEATMAP_STEP,
            lane_count,
            seed,
        ));
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" => Beatmap::from_json_file(path),
        "mid" | "midi" => import_midi_beatmap(path, lane_count),
        other => bail!(
            "Unsupported beatmap format '{}' for {}..!",
            other,
            path.display()
        ),
    }
}

/// A chart of `count` notes, one every `step` seconds from `start`, on random lanes.
/// The same seed always gives the same chart.
pub fn generate_test_beatmap(
    count: usize,
    start: f64,
    step: f64,
    lane_count: usize,
    seed: u64,
) -> Beatmap {
    let mut rng = StdRng::seed_from_u64(seed);
    let lanes = lane_count.max(1);

    let notes = (0..count)
        .map(|i| NoteData {
            lane: rng.gen_range(0..lanes),
            hit_time: start + i as f64 * step,
        })
        .collect();

    Beatmap::new(
        Metadata {
            title: Some(format!("Test Chart #{}", seed)),
            tempo_bpm: (step > 0.0).then(|| 60.0 / step),
        },
        notes,
    )
}

/// Turns every note-on in a MIDI file into a note at the same moment, on lane
/// `pitch % lane_count`. Notes landing on the same lane at the same tick collapse into one.
pub fn import_midi_beatmap<P: AsRef<Path>>(path: P, lane_count: usize) -> Result<Beatmap> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    midi_bytes_to_beatmap(&bytes, path.as_ref(), lane_count)
}

fn midi_bytes_to_beatmap(bytes: &[u8], source_path: &Path, lane_count: usize) -> Result<Beatmap> {
    if lane_count == 0 {
        bail!("Cannot map MIDI notes onto zero lanes..!");
    }

    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    if ticks_per_quarter == 0 {
        bail!("MIDI header declares zero ticks per quarter note..!");
    }

    debug!(
        "MIDI format: {:?}, tracks: {}, ticks per quarter note: {}",
        smf.header.format,
        smf.tracks.len(),
        ticks_per_quarter
    );

    let mut track_name = String::new();
    let mut tempo_changes: Vec<(u64, u32)> = vec![(0, DEFAULT_MPQN)];
    let mut first_tempo: Option<u32> = None;
    let mut onsets: BTreeSet<(u64, usize)> = BTreeSet::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => {
                    let mpqn: u32 = micro.as_int();
                    tempo_changes.push((abs_tick, mpqn));
                    first_tempo.get_or_insert(mpqn);
                    debug!(
                        "Tempo change at tick {} -> {} us/qn (track {})",
                        abs_tick, mpqn, track_idx
                    );
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    if track_name.is_empty() {
                        track_name = String::from_utf8_lossy(name).trim().to_string();
                    }
                }
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => {
                    let lane = key.as_int() as usize % lane_count;
                    if !onsets.insert((abs_tick, lane)) {
                        debug!(
                            "Collapsing stacked note on lane {} at tick {}..!",
                            lane, abs_tick
                        );
                    }
                }
                _ => {}
            }
        }
    }

    let mut last_tick: u64 = 0;
    let mut seconds_accum: f64 = 0.0;
    let mut last_mpqn: u32 = DEFAULT_MPQN;
    let mut tempo_segments: Vec<TempoSegment> = Vec::new();

    // Stable, so a tempo event at tick 0 lands after the default and wins.
    tempo_changes.sort_by_key(|(tick, _)| *tick);

    for (tick, mpqn) in tempo_changes.into_iter() {
        if tick > last_tick {
            let delta_ticks = (tick - last_tick) as f64;
            seconds_accum +=
                delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0;
        }

        tempo_segments.push(TempoSegment {
            start_tick: tick,
            mpqn,
            seconds_at_start: seconds_accum,
        });

        last_tick = tick;
        last_mpqn = mpqn;
    }

    let ticks_to_seconds = |tick: u64| -> f64 {
        let segment = match tempo_segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(s) => s,
            None => &tempo_segments[0],
        };

        let delta_ticks = (tick - segment.start_tick) as f64;
        segment.seconds_at_start
            + delta_ticks * (segment.mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0
    };

    let notes: Vec<NoteData> = onsets
        .into_iter()
        .map(|(tick, lane)| NoteData {
            lane,
            hit_time: ticks_to_seconds(tick),
        })
        .collect();

    if notes.is_empty() {
        warn!("MIDI file {} has no notes..!", source_path.display());
    }

    let title = if track_name.is_empty() {
        source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    } else {
        Some(track_name)
    };

    let beatmap = Beatmap::new(
        Metadata {
            title,
            tempo_bpm: Some(MICROSECONDS_PER_MINUTE / first_tempo.unwrap_or(DEFAULT_MPQN) as f64),
        },
        notes,
    );

    info!(
        "Imported '{}' from MIDI with {} notes over {:.1}s..!",
        beatmap.title(),
        beatmap.len(),
        beatmap.duration()
    );

    Ok(beatmap)
}

#[cfg(test)]
mod test {
    use super::*;
    use midly::{Format, Header, TrackEvent};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind,
        }
    }

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: 100.into(),
                },
            },
        )
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        )
    }

    fn write_midi(track: Vec<TrackEvent<'static>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(480.into())));
        smf.tracks.push(track);

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn midi_notes_become_lanes_by_pitch() {
        env_logger::try_init().unwrap_or(());

        let bytes = write_midi(vec![
            event(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Quick Steps"))),
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(250_000.into()))),
            note_on(0, 60),
            note_off(240, 60),
            note_on(240, 61),
            note_off(240, 61),
            note_on(240, 62),
            note_on(0, 60),
            note_on(0, 64),
            note_off(480, 62),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);

        let map = midi_bytes_to_beatmap(&bytes, Path::new("quick.mid"), 4).unwrap();
        let notes: Vec<(usize, f64)> = map.notes().iter().map(|n| (n.lane, n.hit_time)).collect();

        assert_eq!(map.title(), "Quick Steps");
        assert_eq!(map.metadata.tempo_bpm, Some(240.0));
        assert_eq!(notes.len(), 4);
        assert_eq!(notes[0].0, 0);
        assert!(approx_eq(notes[0].1, 0.0));
        assert_eq!(notes[1].0, 1);
        assert!(approx_eq(notes[1].1, 0.25));
        assert_eq!((notes[2].0, notes[3].0), (0, 2));
        assert!(approx_eq(notes[2].1, 0.5));
        assert!(approx_eq(notes[3].1, 0.5));
    }

    #[test]
    fn midi_tempo_changes_shift_later_notes() {
        let bytes = write_midi(vec![
            note_on(0, 60),
            event(480, TrackEventKind::Meta(MetaMessage::Tempo(250_000.into()))),
            note_on(480, 61),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);

        let map = midi_bytes_to_beatmap(&bytes, Path::new("songs/shift.mid"), 4).unwrap();

        assert_eq!(map.title(), "shift");
        assert_eq!(map.len(), 2);
        // One beat at 120bpm, then one beat at 240bpm.
        assert!(approx_eq(map.notes()[1].hit_time, 0.75));
    }

    #[test]
    fn midi_garbage_is_an_error() {
        assert!(midi_bytes_to_beatmap(b"definitely not midi", Path::new("x.mid"), 4).is_err());
    }

    #[test]
    fn generated_chart_is_deterministic() {
        let a = generate_test_beatmap(TEST_BEATMAP_NOTES, TEST_BEATMAP_START, TEST_BEATMAP_STEP, 4, 7);
        let b = generate_test_beatmap(TEST_BEATMAP_NOTES, TEST_BEATMAP_START, TEST_BEATMAP_STEP, 4, 7);

        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.validate(4).is_ok());
        assert_eq!(a.notes()[0].hit_time, 2.0);
        assert_eq!(a.notes()[49].hit_time, 26.5);
    }

    #[test]
    fn load_without_path_generates() {
        let map = load_beatmap(None, 4, 1, 12).unwrap();
        assert_eq!(map.len(), 12);
    }

    #[test]
    fn load_rejects_unknown_extensions() {
        assert!(load_beatmap(Some(Path::new("chart.txt")), 4, 0, 0).is_err());
    }
}
