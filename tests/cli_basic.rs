//! Integration tests for basic CLI behavior.
//!
//! Every test runs with a cleared environment and an explicit `--config` so
//! neither the host's config file nor deployment variables leak in.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `loopcast` binary.
fn loopcast() -> Command {
    let mut cmd = Command::cargo_bin("loopcast").expect("binary 'loopcast' should be built");
    cmd.env_clear();
    cmd
}

/// Temp directory with media stubs and a config file, removed on drop.
struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("loopcast-cli-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("loop.mp4"), b"video").unwrap();
        std::fs::write(dir.join("mix.m4a"), b"audio").unwrap();
        Self { dir }
    }

    fn config(&self, extra: &str) -> PathBuf {
        let path = self.dir.join("config.toml");
        let body = format!(
            r#"
[stream]
video = "{video}"
audio = "{audio}"
destination = "rtmp://a.rtmp.example.com/live2/secret-key"

[encoder]
ffmpeg_path = "/nonexistent/ffmpeg"
{extra}
"#,
            video = self.dir.join("loop.mp4").display(),
            audio = self.dir.join("mix.m4a").display(),
        );
        std::fs::write(&path, body).unwrap();
        path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    loopcast()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: loopcast"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("graph"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn version_flag_shows_semver() {
    loopcast()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^loopcast \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn unknown_subcommand_fails() {
    loopcast().arg("broadcast").assert().failure();
}

#[test]
fn serve_help_lists_options() {
    loopcast()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--autostart"));
}

// ─── graph ───────────────────────────────────────────────────────────────────

#[test]
fn graph_prints_overlay_stages() {
    let ws = Workspace::new("graph");
    let config = ws.config("");

    loopcast()
        .arg("--config")
        .arg(&config)
        .args(["graph", "--title", "Calm", "--artist", "Anon"])
        .assert()
        .success()
        .stdout(predicate::str::contains("loudnorm=I=-14"))
        .stdout(predicate::str::contains("between(t,0,6)"))
        .stdout(predicate::str::contains("between(t,0,5)"))
        .stdout(predicate::str::contains("Calm — Anon"))
        .stdout(predicate::str::contains("-f flv"))
        .stdout(predicate::str::contains("secret-key").not());
}

#[test]
fn graph_without_cta_passes_video_through() {
    let ws = Workspace::new("graph-no-cta");
    let config = ws.config("");

    loopcast()
        .arg("--config")
        .arg(&config)
        .args(["graph", "--no-cta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[vtmp]copy[vout]"))
        .stdout(predicate::str::contains("Inscreva-se").not());
}

#[test]
fn graph_uses_overlay_section() {
    let ws = Workspace::new("graph-overlay");
    let config = ws.config("\n[overlay]\ntitle = \"Rain\"\nartist = \"Window\"\ntrack_seconds = 8\n");

    loopcast()
        .arg("--config")
        .arg(&config)
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rain — Window"))
        .stdout(predicate::str::contains("between(t,0,8)"));
}

// ─── config and check ────────────────────────────────────────────────────────

#[test]
fn missing_config_file_fails() {
    loopcast()
        .args(["--config", "/nonexistent/loopcast.toml", "graph"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn check_reports_missing_ffmpeg() {
    let ws = Workspace::new("check");
    let config = ws.config("");

    loopcast()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Media and destination OK"))
        .stdout(predicate::str::contains("ffmpeg not runnable"))
        .stderr(predicate::str::contains("configuration check failed"));
}

#[test]
fn check_reports_bad_destination() {
    let ws = Workspace::new("check-dest");
    let config = ws.config("");
    let body = std::fs::read_to_string(&config)
        .unwrap()
        .replace("rtmp://a.rtmp.example.com/live2/secret-key", "http://example.com/live");
    std::fs::write(&config, body).unwrap();

    loopcast()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("rtmp"));
}
