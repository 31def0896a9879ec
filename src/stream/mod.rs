//! Live encoder supervision.
//!
//! - [`config`]: launch parameters and their validation
//! - [`invocation`]: the ffmpeg command line for an RTMP push
//! - [`launcher`]: spawning ffmpeg and observing its exit
//! - [`supervisor`]: the single-process state machine with crash replay

pub mod config;
pub mod invocation;
pub mod launcher;
pub mod supervisor;

use thiserror::Error;

pub use config::{AudioSource, StreamConfig};
pub use invocation::{EncoderInvocation, EncoderProgress, InvocationBuilder};
pub use launcher::{EncoderLauncher, EncoderProcess, ExitReason, FfmpegLauncher, InterruptHandle};
pub use supervisor::{StreamPhase, Supervisor};

/// Stream supervision errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("a stream is already running")]
    AlreadyRunning,

    #[error("no stream is running")]
    NotRunning,

    #[error("failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to write audio playlist: {0}")]
    Playlist(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
