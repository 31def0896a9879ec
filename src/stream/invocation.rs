//! ffmpeg command line for a live push.
//!
//! Input 0 is the video loop, input 1 the audio (one looped file or an
//! ffconcat playlist). The compiled filter graph feeds `[vout]` and `[aud]`,
//! which are mapped into an FLV push to the RTMP destination.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::config::{AudioSource, StreamConfig};
use super::Result;
use crate::overlay::graph::{AUDIO_OUT, VIDEO_OUT};
use crate::overlay::GraphCompiler;

/// Video encoding parameters for a 720p live ingest.
#[rustfmt::skip]
const VIDEO_ARGS: &[&str] = &[
    "-c:v", "libx264",
    "-preset", "veryfast",
    "-b:v", "3000k",
    "-maxrate", "3000k",
    "-bufsize", "6000k",
    "-g", "120",
    "-pix_fmt", "yuv420p",
];

/// Audio encoding parameters.
const AUDIO_ARGS: &[&str] = &["-c:a", "aac", "-b:a", "160k", "-ar", "44100", "-ac", "2"];

/// A fully assembled encoder command.
#[derive(Debug)]
pub struct EncoderInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Concat list backing a playlist input; removed when the invocation is dropped.
    playlist: Option<PlaylistFile>,
}

impl EncoderInvocation {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            playlist: None,
        }
    }

    /// Path of the generated concat list, if the audio is a playlist.
    #[must_use]
    pub fn playlist_path(&self) -> Option<&Path> {
        self.playlist.as_ref().map(|p| p.0.as_path())
    }
}

/// Builds encoder invocations from a [`StreamConfig`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    ffmpeg_path: String,
    compiler: GraphCompiler,
}

impl InvocationBuilder {
    #[must_use]
    pub fn new(ffmpeg_path: impl Into<String>, compiler: GraphCompiler) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            compiler,
        }
    }

    /// Locate ffmpeg in PATH, falling back to the bare name.
    #[must_use]
    pub fn with_default_ffmpeg(compiler: GraphCompiler) -> Self {
        let ffmpeg_path = which::which("ffmpeg")
            .map_or_else(|_| "ffmpeg".to_string(), |p| p.to_string_lossy().to_string());
        Self::new(ffmpeg_path, compiler)
    }

    #[must_use]
    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Assemble the invocation, writing the concat list for playlist audio.
    pub fn build(&self, config: &StreamConfig) -> Result<EncoderInvocation> {
        let playlist = match &config.audio {
            AudioSource::File(_) => None,
            AudioSource::Playlist(paths) => Some(PlaylistFile::write(paths)?),
        };

        let args = self.build_args(config, playlist.as_ref().map(|p| p.0.as_path()));
        debug!("ffmpeg args: {:?}", args);

        Ok(EncoderInvocation {
            program: self.ffmpeg_path.clone(),
            args,
            playlist,
        })
    }

    /// Build ffmpeg arguments. `playlist` is the concat list for playlist audio.
    fn build_args(&self, config: &StreamConfig, playlist: Option<&Path>) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning", "-stats"]
            .iter()
            .map(ToString::to_string)
            .collect();

        // Video loop, read at native rate
        args.extend(["-stream_loop", "-1", "-re", "-i"].map(String::from));
        args.push(config.video.to_string_lossy().to_string());

        // Audio: looped file or looped concat playlist
        args.extend(["-stream_loop", "-1", "-re"].map(String::from));
        match (&config.audio, playlist) {
            (AudioSource::Playlist(_), Some(list)) => {
                args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
                args.push(list.to_string_lossy().to_string());
            }
            (AudioSource::Playlist(paths), None) => {
                // No list file: fall back to the first entry
                args.push("-i".to_string());
                args.push(paths.first().map(|p| p.to_string_lossy().to_string()).unwrap_or_default());
            }
            (AudioSource::File(path), _) => {
                args.push("-i".to_string());
                args.push(path.to_string_lossy().to_string());
            }
        }

        args.push("-filter_complex".to_string());
        args.push(self.compiler.compile(&config.overlay()));
        args.extend([
            "-map".to_string(),
            format!("[{VIDEO_OUT}]"),
            "-map".to_string(),
            format!("[{AUDIO_OUT}]"),
        ]);

        args.extend(VIDEO_ARGS.iter().map(ToString::to_string));
        args.extend(AUDIO_ARGS.iter().map(ToString::to_string));

        args.extend(["-f".to_string(), "flv".to_string(), config.destination.trim().to_string()]);
        args
    }
}

/// ffconcat list in the temp dir, removed on drop.
#[derive(Debug)]
struct PlaylistFile(PathBuf);

impl PlaylistFile {
    fn write(paths: &[PathBuf]) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("loopcast-playlist-{}.ffconcat", uuid::Uuid::new_v4()));
        std::fs::write(&path, concat_list(paths)).map_err(super::StreamError::Playlist)?;
        debug!("wrote playlist with {} entries to {:?}", paths.len(), path);
        Ok(Self(path))
    }
}

impl Drop for PlaylistFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Render an ffconcat list. Single quotes in paths use the `'\''` idiom.
fn concat_list(paths: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for path in paths {
        let quoted = path.to_string_lossy().replace('\'', r"'\''");
        list.push_str("file '");
        list.push_str(&quoted);
        list.push_str("'\n");
    }
    list
}

/// Encoder position parsed from a `-stats` line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderProgress {
    pub time_seconds: f64,
    pub speed: Option<f64>,
    pub bitrate_bps: Option<u64>,
}

/// Parse progress from ffmpeg stderr
pub fn parse_progress(line: &str) -> Option<EncoderProgress> {
    // "frame=  123 fps= 30 ... time=00:01:23.45 bitrate=1234.5kbits/s speed=1.5x"
    let time = field(line, "time=")?;

    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    let speed = field(line, "speed=").and_then(|s| s.trim_end_matches('x').parse().ok());

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bitrate_bps = field(line, "bitrate=").and_then(|s| {
        s.trim_end_matches("kbits/s")
            .parse::<f64>()
            .ok()
            .map(|kbps| (kbps * 1000.0) as u64)
    });

    Some(EncoderProgress {
        time_seconds: hours * 3600.0 + minutes * 60.0 + seconds,
        speed,
        bitrate_bps,
    })
}

/// Value following `key` up to the next whitespace. ffmpeg pads some values
/// (`speed= 1.2x`), so leading spaces are skipped.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split(key).nth(1)?.split_whitespace().next()
}
