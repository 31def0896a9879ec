//! `loopcast` - 24/7 looping live stream with chat engagement
//!
//! # Features
//!
//! - **Overlays**: timed track and call-to-action text compiled into an ffmpeg filter graph
//! - **Supervision**: one encoder process at a time, replayed with the same config after a crash
//! - **Playlists**: single audio file or an ordered playlist, looped forever
//! - **Engagement**: scripted live chat messages that pause when viewers go quiet
//! - **Control**: HTTP start/stop/health surface
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use loopcast::{AppConfig, FfmpegLauncher, InvocationBuilder, OverlayOverrides, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let builder = InvocationBuilder::with_default_ffmpeg(config.graph_compiler());
//!     let supervisor = Supervisor::new(Arc::new(FfmpegLauncher::new()), builder);
//!
//!     supervisor.start(config.stream_config(&OverlayOverrides::default())).await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod control;
pub mod overlay;
pub mod stream;

pub use chat::{AccessToken, ChatApi, ChatError, Credentials, EngagementConfig, EngagementScheduler, TokenObserver, YouTubeChat};
pub use config::{AppConfig, OverlayOverrides};
pub use control::{router, ControlSurface, Health};
pub use overlay::{compile, GraphCompiler, OverlayLayout};
pub use stream::{
    AudioSource, EncoderLauncher, FfmpegLauncher, InvocationBuilder, StreamConfig, StreamError, StreamPhase, Supervisor,
};

/// Version of loopcast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
