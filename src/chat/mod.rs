//! Live chat engagement.
//!
//! # Architecture
//!
//! - [`ChatApi`]: the three chat operations (resolve session, list, insert)
//! - [`YouTubeChat`]: YouTube Data API v3 implementation
//! - [`Credentials`]: bearer token cell fed by an external [`TokenObserver`]
//! - [`EngagementScheduler`]: cadence, inactivity backoff and resume

pub mod api;
pub mod credentials;
pub mod scheduler;
pub mod youtube;

pub use api::{ChatApi, ChatError, ChatMessage, MessagePage};
pub use credentials::{AccessToken, Credentials, TokenObserver};
pub use scheduler::{EngagementConfig, EngagementMode, EngagementScheduler};
pub use youtube::YouTubeChat;
