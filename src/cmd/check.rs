use anyhow::{bail, Result};

use loopcast::{AppConfig, FfmpegLauncher, OverlayOverrides};

pub async fn cmd_check(config: &AppConfig) -> Result<()> {
    let stream = config.stream_config(&OverlayOverrides::default());
    let mut ok = true;

    println!("🎞️  Video: {}", stream.video.display());
    for path in stream.audio.paths() {
        println!("🎵 Audio: {}", path.display());
    }

    match stream.validate() {
        Ok(()) => println!("✅ Media and destination OK"),
        Err(e) => {
            println!("❌ {e}");
            ok = false;
        }
    }

    let builder = config.invocation_builder();
    if FfmpegLauncher::check_available(builder.ffmpeg_path()).await {
        println!("✅ ffmpeg: {}", builder.ffmpeg_path());
    } else {
        println!("❌ ffmpeg not runnable: {}", builder.ffmpeg_path());
        ok = false;
    }

    if config.access_token().is_some() {
        println!("✅ Access token configured");
    } else if config.engagement.enabled {
        println!("⚠️  No access token; chat engagement will not post");
    }

    if !ok {
        bail!("configuration check failed");
    }
    Ok(())
}
