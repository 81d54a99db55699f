// Project data model
// Built once per parsed document and never mutated afterwards

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Root aggregate of a loaded project
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectModel {
    tracks: Vec<Track>,
    tempo: Option<Tempo>,
}

impl ProjectModel {
    pub(crate) fn new(tracks: Vec<Track>, tempo: Option<Tempo>) -> Self {
        Self { tracks, tempo }
    }

    /// Tracks in document order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Tempo declared by the document's transport section, if any
    pub fn tempo(&self) -> Option<Tempo> {
        self.tempo
    }

    /// Every clip of every track, track by track in document order
    pub fn clips(&self) -> impl Iterator<Item = &Clip> + '_ {
        self.tracks.iter().flat_map(|track| track.clips.iter())
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|track| track.clips.len()).sum()
    }

    pub fn audio_clip_count(&self) -> usize {
        self.clips().filter(|clip| clip.is_audible()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Human-readable overview: track count, then each track's audio clips
impl fmt::Display for ProjectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracks: {}", self.tracks.len())?;
        if let Some(tempo) = self.tempo {
            writeln!(f, "Tempo: {} BPM", tempo.beats_per_minute())?;
        }
        for (index, track) in self.tracks.iter().enumerate() {
            writeln!(f, "  Track {}: {}", index + 1, track.name)?;
            for (clip_index, clip) in track.clips.iter().enumerate() {
                if let Some(reference) = &clip.audio_reference {
                    writeln!(
                        f,
                        "    - Audio Clip {}: {} (at {} beats)",
                        clip_index + 1,
                        clip.name,
                        clip.start_beat
                    )?;
                    writeln!(f, "      > File: {}", reference.archive_path)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    pub name: String,
    pub id: Option<String>,
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    pub name: String,
    /// Position in beats from the project start
    pub start_beat: f64,
    pub audio_reference: Option<FileReference>,
}

impl Clip {
    /// MIDI and automation clips carry no file and are never scheduled
    pub fn is_audible(&self) -> bool {
        self.audio_reference.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileReference {
    /// Path inside the archive, verbatim from the document
    pub archive_path: String,
}

impl FileReference {
    pub fn new(archive_path: impl Into<String>) -> Self {
        Self {
            archive_path: archive_path.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TempoError {
    #[error("invalid tempo {0} BPM: must be a finite, positive number")]
    Invalid(f64),
}

/// A single fixed tempo for the whole project
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tempo {
    beats_per_minute: f64,
}

impl Tempo {
    pub fn new(beats_per_minute: f64) -> Result<Self, TempoError> {
        if !beats_per_minute.is_finite() || beats_per_minute <= 0.0 {
            return Err(TempoError::Invalid(beats_per_minute));
        }
        Ok(Self { beats_per_minute })
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.beats_per_minute
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.beats_per_minute
    }

    /// Convert a beat position to seconds from the project start
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            beats_per_minute: 120.0,
        }
    }
}
