//! Launch parameters for one encoder run.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Result, StreamError};
use crate::overlay::OverlayText;

/// Where the stream's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    /// One file, looped forever.
    File(PathBuf),
    /// Ordered list of files, concatenated and looped forever.
    Playlist(Vec<PathBuf>),
}

impl AudioSource {
    /// Every path this source reads from, in play order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::File(path) => std::slice::from_ref(path),
            Self::Playlist(paths) => paths,
        }
    }
}

/// Immutable launch parameters. Retained by the supervisor for crash replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Video loop
    pub video: PathBuf,
    pub audio: AudioSource,
    /// RTMP(S) ingest URL, including the stream key
    pub destination: String,
    /// Track overlay, already rendered from its template
    pub track_text: String,
    /// Call-to-action overlay, already rendered from its template
    pub cta_text: String,
    pub show_cta: bool,
    pub track_seconds: f64,
    pub cta_seconds: f64,
}

impl StreamConfig {
    /// Check that every media path is a readable file and the destination is
    /// a usable ingest URL. Runs before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        check_readable("video source", &self.video)?;

        if let AudioSource::Playlist(paths) = &self.audio {
            if paths.is_empty() {
                return Err(StreamError::InvalidConfig(
                    "audio playlist is empty".to_string(),
                ));
            }
        }
        for path in self.audio.paths() {
            check_readable("audio source", path)?;
        }

        check_destination(&self.destination)?;
        check_seconds("track overlay duration", self.track_seconds)?;
        check_seconds("CTA duration", self.cta_seconds)?;

        Ok(())
    }

    /// `true` if the video and every audio file currently exist.
    #[must_use]
    pub fn sources_exist(&self) -> bool {
        let audio = self.audio.paths();
        self.video.is_file() && !audio.is_empty() && audio.iter().all(|p| p.is_file())
    }

    /// Overlay text and timing, as consumed by the graph compiler.
    #[must_use]
    pub fn overlay(&self) -> OverlayText<'_> {
        OverlayText {
            track_text: &self.track_text,
            cta_text: &self.cta_text,
            show_cta: self.show_cta,
            track_seconds: self.track_seconds,
            cta_seconds: self.cta_seconds,
        }
    }
}

fn check_readable(what: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(StreamError::InvalidConfig(format!(
            "{what} not found: {}",
            path.display()
        )));
    }
    File::open(path).map_err(|e| {
        StreamError::InvalidConfig(format!("{what} not readable: {}: {e}", path.display()))
    })?;
    Ok(())
}

fn check_destination(destination: &str) -> Result<()> {
    let destination = destination.trim();
    if destination.is_empty() {
        return Err(StreamError::InvalidConfig(
            "destination URL is empty".to_string(),
        ));
    }

    let url = url::Url::parse(destination).map_err(|e| {
        StreamError::InvalidConfig(format!("destination URL is invalid: {e}"))
    })?;
    match url.scheme() {
        "rtmp" | "rtmps" => Ok(()),
        other => Err(StreamError::InvalidConfig(format!(
            "destination must be an rtmp:// or rtmps:// URL, got {other}://"
        ))),
    }
}

fn check_seconds(what: &str, seconds: f64) -> Result<()> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        Err(StreamError::InvalidConfig(format!(
            "{what} must be a non-negative number of seconds, got {seconds}"
        )))
    }
}
