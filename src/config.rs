//! Application configuration loaded from `~/.config/loopcast/config.toml`,
//! then overridden from the environment.
//!
//! ```toml
//! port = 3000
//!
//! [stream]
//! video = "/srv/lofi/video/loop.mp4"
//! audio = "/srv/lofi/audio/mix.m4a"      # or: playlist = ["a.m4a", "b.m4a"]
//! destination = "rtmp://a.rtmp.youtube.com/live2/<key>"
//!
//! [overlay]
//! title = "Track"
//! artist = "Artist"
//! show_cta = true
//!
//! [engagement]
//! cadence_minutes = 12
//! messages = ["Thanks for listening!"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::chat::{AccessToken, EngagementConfig};
use crate::overlay::{self, GraphCompiler, LoudnessTarget, OverlayLayout};
use crate::stream::{AudioSource, InvocationBuilder, StreamConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub stream: StreamSection,
    pub overlay: OverlaySection,
    pub encoder: EncoderSection,
    pub engagement: EngagementSection,
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub video: PathBuf,
    pub audio: PathBuf,
    /// Takes precedence over `audio` when non-empty.
    pub playlist: Vec<PathBuf>,
    pub destination: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlaySection {
    pub track_template: String,
    pub title: String,
    pub artist: String,
    pub cta_template: String,
    pub live_title: String,
    pub channel_name: String,
    pub show_cta: bool,
    pub track_seconds: f64,
    pub cta_seconds: f64,
    pub fade_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    /// Defaults to the `ffmpeg` found in PATH.
    pub ffmpeg_path: Option<String>,
    pub restart_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngagementSection {
    pub enabled: bool,
    pub cadence_minutes: u64,
    pub inactivity_minutes: u64,
    pub cooldown_minutes: u64,
    /// 0 disables chat polling.
    pub poll_seconds: u64,
    /// Empty means the built-in pool.
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub access_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            stream: StreamSection::default(),
            overlay: OverlaySection::default(),
            encoder: EncoderSection::default(),
            engagement: EngagementSection::default(),
            auth: AuthSection::default(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            video: PathBuf::from("/srv/lofi/video/loop.mp4"),
            audio: PathBuf::from("/srv/lofi/audio/playlist.m4a"),
            playlist: Vec::new(),
            destination: String::new(),
        }
    }
}

impl Default for OverlaySection {
    fn default() -> Self {
        Self {
            track_template: "{title} — {artist}".to_string(),
            title: "Track".to_string(),
            artist: "Artist".to_string(),
            cta_template: "Live: {live_title} • {channel_name} — Inscreva-se!".to_string(),
            live_title: "Lofi Live".to_string(),
            channel_name: "Lofi Radio".to_string(),
            show_cta: true,
            track_seconds: 6.0,
            cta_seconds: 5.0,
            fade_seconds: 0.0,
        }
    }
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            restart_delay_secs: 30,
        }
    }
}

impl Default for EngagementSection {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_minutes: 12,
            inactivity_minutes: 90,
            cooldown_minutes: 30,
            poll_seconds: 15,
            messages: Vec::new(),
        }
    }
}

/// Per-launch overlay overrides, e.g. from a start request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayOverrides {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub show_cta: Option<bool>,
    /// CTA template; `{live_title}` and `{channel_name}` are still substituted.
    pub cta_text: Option<String>,
    /// Replaces the rendered track text entirely.
    pub track_text: Option<String>,
}

impl AppConfig {
    /// Load from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        if config.engagement.enabled {
            config.engagement_config().context("invalid engagement settings")?;
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Apply the deployment's environment variables.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = var("PORT") {
            self.port = port.parse().with_context(|| format!("invalid PORT: {port}"))?;
        }

        let stream = &mut self.stream;
        if let Some(v) = var("RTMP_URL") {
            stream.destination = v;
        }
        if let Some(v) = var("BASE_VIDEO") {
            stream.video = v.into();
        }
        if let Some(v) = var("AUDIO_FILE") {
            stream.audio = v.into();
        }
        if let Some(v) = var("AUDIO_PLAYLIST") {
            stream.playlist = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        let overlay = &mut self.overlay;
        for (key, field) in [
            ("LIVE_TITLE", &mut overlay.live_title),
            ("CHANNEL_NAME", &mut overlay.channel_name),
            ("OVERLAY_TRACK_TEMPLATE", &mut overlay.track_template),
            ("TRACK_TITLE", &mut overlay.title),
            ("TRACK_ARTIST", &mut overlay.artist),
            ("CTA_TEXT", &mut overlay.cta_template),
        ] {
            if let Some(v) = var(key) {
                *field = v;
            }
        }
        if let Some(v) = var("SHOW_CTA") {
            overlay.show_cta = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("TRACK_OVERLAY_SECONDS") {
            overlay.track_seconds = parse_seconds("TRACK_OVERLAY_SECONDS", &v)?;
        }
        if let Some(v) = var("CTA_SECONDS") {
            overlay.cta_seconds = parse_seconds("CTA_SECONDS", &v)?;
        }

        if let Some(v) = var("FFMPEG_PATH") {
            self.encoder.ffmpeg_path = Some(v);
        }
        if let Some(v) = var("YOUTUBE_ACCESS_TOKEN") {
            self.auth.access_token = Some(v);
        }

        Ok(())
    }

    /// Audio source: the playlist if configured, otherwise the single file.
    #[must_use]
    pub fn audio_source(&self) -> AudioSource {
        if self.stream.playlist.is_empty() {
            AudioSource::File(self.stream.audio.clone())
        } else {
            AudioSource::Playlist(self.stream.playlist.clone())
        }
    }

    /// Launch parameters with overlay strings rendered from their templates.
    #[must_use]
    pub fn stream_config(&self, overrides: &OverlayOverrides) -> StreamConfig {
        let o = &self.overlay;
        let title = overrides.title.as_deref().unwrap_or(&o.title);
        let artist = overrides.artist.as_deref().unwrap_or(&o.artist);
        let cta_template = overrides.cta_text.as_deref().unwrap_or(&o.cta_template);

        let track_text = overrides
            .track_text
            .clone()
            .unwrap_or_else(|| overlay::track_text(&o.track_template, title, artist));

        StreamConfig {
            video: self.stream.video.clone(),
            audio: self.audio_source(),
            destination: self.stream.destination.clone(),
            track_text,
            cta_text: overlay::cta_text(cta_template, &o.live_title, &o.channel_name),
            show_cta: overrides.show_cta.unwrap_or(o.show_cta),
            track_seconds: o.track_seconds,
            cta_seconds: o.cta_seconds,
        }
    }

    #[must_use]
    pub fn graph_compiler(&self) -> GraphCompiler {
        let layout = OverlayLayout {
            fade_seconds: self.overlay.fade_seconds,
            ..OverlayLayout::default()
        };
        GraphCompiler::new(layout, LoudnessTarget::default())
    }

    /// Encoder command line builder for the configured (or PATH) ffmpeg.
    #[must_use]
    pub fn invocation_builder(&self) -> InvocationBuilder {
        match &self.encoder.ffmpeg_path {
            Some(path) => InvocationBuilder::new(path.as_str(), self.graph_compiler()),
            None => InvocationBuilder::with_default_ffmpeg(self.graph_compiler()),
        }
    }

    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.encoder.restart_delay_secs)
    }

    /// Scheduler timing and pool. Cadence, inactivity and cooldown must be non-zero.
    pub fn engagement_config(&self) -> Result<EngagementConfig> {
        let e = &self.engagement;
        for (key, value) in [
            ("cadence_minutes", e.cadence_minutes),
            ("inactivity_minutes", e.inactivity_minutes),
            ("cooldown_minutes", e.cooldown_minutes),
        ] {
            if value == 0 {
                bail!("[engagement] {key} must be at least 1");
            }
        }

        let defaults = EngagementConfig::default();
        Ok(EngagementConfig {
            cadence: minutes(e.cadence_minutes),
            inactivity_threshold: minutes(e.inactivity_minutes),
            cooldown: minutes(e.cooldown_minutes),
            poll_interval: (e.poll_seconds > 0).then(|| Duration::from_secs(e.poll_seconds)),
            messages: if e.messages.is_empty() {
                defaults.messages
            } else {
                e.messages.clone()
            },
        })
    }

    /// Initial access token, if one is configured.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.auth
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| AccessToken::new(t, None))
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

fn parse_seconds(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {key}: {value}"))
}

/// Return the path to the default config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopcast")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.overlay.show_cta);
        assert!((config.overlay.track_seconds - 6.0).abs() < f64::EPSILON);
        assert_eq!(config.engagement.cadence_minutes, 12);
    }

    #[test]
    fn parse_sections() {
        let toml_str = r#"
port = 8080

[stream]
video = "/media/loop.mp4"
playlist = ["/media/a.m4a", "/media/b.m4a"]
destination = "rtmp://live.example.com/app/key"

[overlay]
title = "Calm"
artist = "Anon"
show_cta = false

[engagement]
poll_seconds = 0
messages = ["hello"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.audio_source(),
            AudioSource::Playlist(vec!["/media/a.m4a".into(), "/media/b.m4a".into()])
        );

        let engagement = config.engagement_config().unwrap();
        assert_eq!(engagement.poll_interval, None);
        assert_eq!(engagement.messages, vec!["hello".to_string()]);
        assert_eq!(engagement.cadence, Duration::from_secs(12 * 60));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("PORT", "4000"),
                ("RTMP_URL", "rtmp://x/live/key"),
                ("AUDIO_PLAYLIST", "/a.m4a, /b.m4a,"),
                ("TRACK_TITLE", "Calm"),
                ("SHOW_CTA", "FALSE"),
                ("CTA_SECONDS", "2.5"),
                ("YOUTUBE_ACCESS_TOKEN", "tok"),
            ]))
            .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.stream.destination, "rtmp://x/live/key");
        assert_eq!(config.stream.playlist.len(), 2);
        assert_eq!(config.overlay.title, "Calm");
        assert!(!config.overlay.show_cta);
        assert!((config.overlay.cta_seconds - 2.5).abs() < f64::EPSILON);
        assert!(config.access_token().is_some());
    }

    #[test]
    fn invalid_env_number_is_an_error() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("TRACK_OVERLAY_SECONDS", "six")])).unwrap_err();
        assert!(err.to_string().contains("TRACK_OVERLAY_SECONDS"));
    }

    #[test]
    fn stream_config_renders_templates() {
        let config = AppConfig::default();
        let stream = config.stream_config(&OverlayOverrides::default());

        assert_eq!(stream.track_text, "Track — Artist");
        assert_eq!(stream.cta_text, "Live: Lofi Live • Lofi Radio — Inscreva-se!");
        assert!(stream.show_cta);
    }

    #[test]
    fn overrides_take_precedence() {
        let config = AppConfig::default();
        let overrides = OverlayOverrides {
            title: Some("Calm".to_string()),
            artist: Some("Anon".to_string()),
            show_cta: Some(false),
            cta_text: Some("Join {channel_name}".to_string()),
            track_text: None,
        };
        let stream = config.stream_config(&overrides);
        assert_eq!(stream.track_text, "Calm — Anon");
        assert_eq!(stream.cta_text, "Join Lofi Radio");
        assert!(!stream.show_cta);

        let explicit = OverlayOverrides {
            track_text: Some("Now playing: Calm".to_string()),
            ..overrides
        };
        assert_eq!(config.stream_config(&explicit).track_text, "Now playing: Calm");
    }

    #[test]
    fn overrides_parse_from_camel_case_json() {
        let o: OverlayOverrides =
            serde_json::from_str(r#"{"title":"Calm","showCta":false,"ctaText":"x"}"#).unwrap();
        assert_eq!(o.title.as_deref(), Some("Calm"));
        assert_eq!(o.show_cta, Some(false));
        assert_eq!(o.cta_text.as_deref(), Some("x"));
    }

    #[test]
    fn configured_ffmpeg_path_is_used() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg")])).unwrap();
        assert_eq!(config.invocation_builder().ffmpeg_path(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.restart_delay(), Duration::from_secs(30));
    }

    #[test]
    fn zero_engagement_timing_is_rejected() {
        for key in ["cadence_minutes", "inactivity_minutes", "cooldown_minutes"] {
            let config: AppConfig = toml::from_str(&format!("[engagement]\n{key} = 0")).unwrap();
            let err = config.engagement_config().unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn zero_cadence_fails_load() {
        let path = std::env::temp_dir().join(format!("loopcast-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[engagement]\ncadence_minutes = 0\n").unwrap();
        let result = AppConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("cadence_minutes"), "{err:#}");
    }

    #[test]
    fn disabled_engagement_skips_timing_checks() {
        let path = std::env::temp_dir().join(format!("loopcast-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[engagement]\nenabled = false\ncadence_minutes = 0\n").unwrap();
        let result = AppConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert!(result.is_ok());
    }

    #[test]
    fn huge_minutes_saturate() {
        let config: AppConfig = toml::from_str(&format!("[engagement]\ncooldown_minutes = {}", i64::MAX)).unwrap();
        let engagement = config.engagement_config().unwrap();
        assert_eq!(engagement.cooldown, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn blank_access_token_is_ignored() {
        let mut config = AppConfig::default();
        config.auth.access_token = Some("  ".to_string());
        assert!(config.access_token().is_none());
    }
}
