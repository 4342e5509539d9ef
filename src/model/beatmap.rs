use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteData {
    pub lane: usize,
    /// Seconds since the start of the song.
    pub hit_time: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub tempo_bpm: Option<f64>,
}

#[derive(Deserialize)]
struct BeatmapFile {
    #[serde(default)]
    metadata: Metadata,
    notes: Vec<NoteData>,
}

/// An ordered chart of notes. The notes are always sorted by `hit_time`, which is what lets the
/// scheduler walk them in a single forward pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(from = "BeatmapFile")]
pub struct Beatmap {
    pub metadata: Metadata,
    notes: Vec<NoteData>,
}

impl From<BeatmapFile> for Beatmap {
    fn from(file: BeatmapFile) -> Self {
        Beatmap::new(file.metadata, file.notes)
    }
}

impl Beatmap {
    pub fn new(metadata: Metadata, mut notes: Vec<NoteData>) -> Self {
        // Stable, so notes sharing a hit time keep their authored order.
        notes.sort_by(|a, b| a.hit_time.total_cmp(&b.hit_time));

        Self { metadata, notes }
    }

    pub fn notes(&self) -> &[NoteData] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or("No Title")
    }

    /// Hit time of the last note, or zero for an empty chart.
    pub fn duration(&self) -> f64 {
        self.notes.last().map(|n| n.hit_time).unwrap_or(0.0)
    }

    pub fn validate(&self, lane_count: usize) -> Result<()> {
        for (i, note) in self.notes.iter().enumerate() {
            if !note.hit_time.is_finite() {
                bail!("Note {} has a non-finite hit time..!", i);
            }

            if note.lane >= lane_count {
                bail!(
                    "Note {} is on lane {} but the chart only has {} lanes..!",
                    i,
                    note.lane,
                    lane_count
                );
            }
        }

        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read beatmap {}", path.as_ref().display()))?;

        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow!("Failed to parse beatmap JSON: {}", e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn note(lane: usize, hit_time: f64) -> NoteData {
        NoteData { lane, hit_time }
    }

    #[test]
    fn new_sorts_by_hit_time_and_keeps_ties_in_order() {
        let map = Beatmap::new(
            Metadata::default(),
            vec![note(3, 2.0), note(0, 1.0), note(1, 2.0), note(2, 0.5)],
        );

        let order: Vec<(usize, f64)> = map.notes().iter().map(|n| (n.lane, n.hit_time)).collect();
        assert_eq!(order, vec![(2, 0.5), (0, 1.0), (3, 2.0), (1, 2.0)]);
        assert_eq!(map.duration(), 2.0);
    }

    #[test]
    fn validate_rejects_unknown_lanes() {
        let map = Beatmap::new(Metadata::default(), vec![note(0, 1.0), note(4, 1.5)]);

        assert!(map.validate(5).is_ok());
        assert!(map.validate(4).is_err());
    }

    #[test]
    fn validate_rejects_nan_hit_times() {
        let map = Beatmap::new(Metadata::default(), vec![note(0, f64::NAN)]);
        assert!(map.validate(4).is_err());
    }

    #[test]
    fn json_load_sorts_notes() {
        let map = Beatmap::from_json_str(
            r#"{
                "metadata": { "title": "Loaded", "tempo_bpm": 120.0 },
                "notes": [
                    { "lane": 1, "hit_time": 3.0 },
                    { "lane": 0, "hit_time": 2.5 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(map.title(), "Loaded");
        assert_eq!(map.notes()[0], note(0, 2.5));
        assert_eq!(map.notes()[1], note(1, 3.0));
    }

    #[test]
    fn json_without_metadata_is_untitled() {
        let map = Beatmap::from_json_str(r#"{ "notes": [] }"#).unwrap();

        assert!(map.is_empty());
        assert_eq!(map.title(), "No Title");
    }

    #[test]
    fn json_garbage_is_an_error() {
        assert!(Beatmap::from_json_str("not a chart").is_err());
    }
}
