use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use loopcast::{
    router, AppConfig, ControlSurface, Credentials, EngagementScheduler, FfmpegLauncher, OverlayOverrides, Supervisor,
    YouTubeChat,
};

pub async fn cmd_serve(config: AppConfig, autostart: bool) -> Result<()> {
    let builder = config.invocation_builder();
    if !FfmpegLauncher::check_available(builder.ffmpeg_path()).await {
        warn!("ffmpeg not runnable at {}; starts will fail", builder.ffmpeg_path());
    }

    let credentials = Arc::new(
        config
            .access_token()
            .map_or_else(Credentials::new, Credentials::with_token),
    );
    if !credentials.is_valid() {
        warn!("no access token configured; chat engagement cannot post");
    }

    let launcher = Arc::new(FfmpegLauncher::new());
    let progress = launcher.progress();
    let supervisor = Supervisor::with_restart_delay(launcher, builder, config.restart_delay());

    let mut surface =
        ControlSurface::new(config.clone(), supervisor.clone(), Arc::clone(&credentials)).with_progress(progress);
    if config.engagement.enabled {
        let chat = YouTubeChat::new(Arc::clone(&credentials))?;
        let scheduler = EngagementScheduler::new(Arc::new(chat), config.engagement_config()?, supervisor.subscribe());
        surface = surface.with_engagement(Arc::new(scheduler));
    }
    let surface = Arc::new(surface);

    if autostart {
        match surface.start(&OverlayOverrides::default()).await {
            Ok(()) => info!("stream started"),
            Err(e) => warn!("autostart failed: {e}"),
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("control surface listening on http://{addr}");

    axum::serve(listener, router(Arc::clone(&surface)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control surface failed")?;

    if supervisor.is_live() {
        surface.stop().await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
