//! Scripted chat engagement with inactivity backoff.
//!
//! Two loops run as one task while the scheduler is started:
//!
//! - **Cadence**: every `cadence`, post one message picked uniformly from the
//!   pool, unless no viewer has written for longer than
//!   `inactivity_threshold`. In that case switch to paused, wait out
//!   `cooldown`, then resume with a fresh inactivity window.
//! - **Liveness poll**: every `poll_interval`, read new chat messages and
//!   refresh the last-activity time if any came from a viewer.
//!
//! Both loops only act while the stream is live. Restarting the scheduler
//! aborts the task and spawns a new one.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::{ChatApi, Result};

/// Timing and message pool for the scheduler.
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Interval between scripted messages.
    pub cadence: Duration,
    /// Viewer silence after which posting pauses.
    pub inactivity_threshold: Duration,
    /// How long a pause lasts.
    pub cooldown: Duration,
    /// Chat polling interval; `None` disables liveness polling.
    pub poll_interval: Option<Duration>,
    pub messages: Vec<String>,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(12 * 60),
            inactivity_threshold: Duration::from_secs(90 * 60),
            cooldown: Duration::from_secs(30 * 60),
            poll_interval: Some(Duration::from_secs(15)),
            messages: default_messages(),
        }
    }
}

/// Messages used when none are configured.
#[must_use]
pub fn default_messages() -> Vec<String> {
    [
        "Thanks for tuning in! Drop a 👋 and tell us where you're listening from.",
        "Enjoying the music? Subscribe so you never miss a stream.",
        "Studying, working or relaxing? Let us know in the chat.",
        "Take a deep breath and a sip of water. We're glad you're here.",
        "Like the stream if this helps you focus 🎧",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Posting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMode {
    Active,
    Paused,
}

/// What a cadence tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Posted,
    Paused,
    /// Stream not live, no chat session, empty pool, or the post failed.
    Skipped,
}

#[derive(Debug)]
struct EngagementState {
    last_human_activity: Instant,
    mode: EngagementMode,
    /// Live chat id, resolved once per stream session.
    chat_id: Option<String>,
    page_token: Option<String>,
}

impl EngagementState {
    fn fresh() -> Self {
        Self {
            last_human_activity: Instant::now(),
            mode: EngagementMode::Active,
            chat_id: None,
            page_token: None,
        }
    }

    /// Forget the chat session and restart the inactivity window.
    fn reset(&mut self) {
        *self = Self::fresh();
    }
}

struct Shared {
    api: Arc<dyn ChatApi>,
    config: EngagementConfig,
    live: watch::Receiver<bool>,
    state: Mutex<EngagementState>,
}

/// Posts scripted messages into the live chat while the stream is on air.
pub struct EngagementScheduler {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EngagementScheduler {
    /// `live` is the supervisor's "is streaming" flag.
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>, config: EngagementConfig, live: watch::Receiver<bool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                config,
                live,
                state: Mutex::new(EngagementState::fresh()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the loops for a new stream session, replacing any running ones.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("replaced running engagement loop");
        }
        if self.shared.config.cadence.is_zero() {
            warn!("engagement cadence is zero; scheduler not started");
            return;
        }

        self.shared.state.lock().await.reset();
        *task = Some(tokio::spawn(run(Arc::clone(&self.shared))));
        info!(
            "engagement scheduler started (every {:?}, pause after {:?} of silence)",
            self.shared.config.cadence, self.shared.config.inactivity_threshold
        );
    }

    /// Stop the loops and cancel any pending resume. Returns `false` if not started.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            return false;
        };
        task.abort();
        self.shared.state.lock().await.reset();
        info!("engagement scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn mode(&self) -> EngagementMode {
        self.shared.state.lock().await.mode
    }

    /// Live chat id for the current session; asks the API only once per session.
    pub async fn resolve_session(&self) -> Result<String> {
        self.shared.resolve_session().await
    }

    /// Count a viewer message seen outside the polling loop.
    pub async fn record_human_activity(&self) {
        self.shared.state.lock().await.last_human_activity = Instant::now();
    }
}

impl Drop for EngagementScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run(shared: Arc<Shared>) {
    tokio::select! {
        () = cadence_loop(Arc::clone(&shared)) => {}
        () = poll_loop(shared) => {}
    }
}

async fn cadence_loop(shared: Arc<Shared>) {
    let cadence = shared.config.cadence;
    let mut ticker = interval_at(Instant::now() + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shared.tick().await == Tick::Paused {
            tokio::time::sleep(shared.config.cooldown).await;
            shared.resume().await;
            ticker.reset();
        }
    }
}

async fn poll_loop(shared: Arc<Shared>) {
    let Some(interval) = shared.config.poll_interval else {
        return std::future::pending().await;
    };

    loop {
        let wait = shared.poll().await.map_or(interval, |hint| hint.max(interval));
        tokio::time::sleep(wait).await;
    }
}

impl Shared {
    fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    async fn resolve_session(&self) -> Result<String> {
        if let Some(chat_id) = self.state.lock().await.chat_id.clone() {
            return Ok(chat_id);
        }

        let chat_id = self.api.active_chat_id().await?;
        let mut state = self.state.lock().await;
        state.chat_id = Some(chat_id.clone());
        state.page_token = None;
        info!("engagement attached to live chat {chat_id}");
        Ok(chat_id)
    }

    async fn tick(&self) -> Tick {
        if !self.is_live() {
            self.state.lock().await.reset();
            return Tick::Skipped;
        }

        {
            let mut state = self.state.lock().await;
            let silent_for = state.last_human_activity.elapsed();
            if silent_for > self.config.inactivity_threshold {
                state.mode = EngagementMode::Paused;
                info!(
                    "no viewer messages for {:?}; pausing engagement for {:?}",
                    silent_for, self.config.cooldown
                );
                return Tick::Paused;
            }
        }

        let chat_id = match self.resolve_session().await {
            Ok(chat_id) => chat_id,
            Err(e) => {
                warn!("cannot resolve live chat: {e}");
                return Tick::Skipped;
            }
        };

        let text = {
            let mut rng = rand::thread_rng();
            self.config.messages.choose(&mut rng).cloned()
        };
        let Some(text) = text else {
            debug!("message pool is empty");
            return Tick::Skipped;
        };

        match self.api.insert_message(&chat_id, &text).await {
            Ok(()) => {
                debug!("posted engagement message: {text}");
                Tick::Posted
            }
            Err(e) => {
                // The chat may have ended; look it up again next tick.
                warn!("failed to post engagement message: {e}");
                self.state.lock().await.chat_id = None;
                Tick::Skipped
            }
        }
    }

    async fn resume(&self) {
        let mut state = self.state.lock().await;
        state.mode = EngagementMode::Active;
        state.last_human_activity = Instant::now();
        info!("engagement resumed after cooldown");
    }

    /// Poll new chat messages. Returns the API's requested polling interval.
    async fn poll(&self) -> Option<Duration> {
        if !self.is_live() {
            return None;
        }

        let chat_id = match self.resolve_session().await {
            Ok(chat_id) => chat_id,
            Err(e) => {
                debug!("chat poll skipped: {e}");
                return None;
            }
        };

        let page_token = self.state.lock().await.page_token.clone();
        let page = match self.api.list_messages(&chat_id, page_token.as_deref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!("failed to read live chat: {e}");
                return None;
            }
        };

        let viewers = page.messages.iter().filter(|m| m.is_human()).count();
        let mut state = self.state.lock().await;
        if page.next_page_token.is_some() {
            state.page_token = page.next_page_token;
        }
        if viewers > 0 {
            state.last_human_activity = Instant::now();
            debug!("{viewers} viewer message(s) in chat");
        }
        page.polling_interval
    }
}
