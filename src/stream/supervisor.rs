//! Owner of the one live encoder process.
//!
//! ```text
//! Idle ──start──▶ Running ──exit (clean / stop)──▶ Idle
//!                    │
//!                    └──exit (abnormal)──▶ ReplayPending ──delay──▶ Running
//!                                              │
//!                                              └──stop──▶ Idle
//! ```
//!
//! All transitions happen under one mutex and never yield between the check
//! and the update, so there is never more than one live process handle. A
//! stop is always authoritative: it cancels a pending replay, and the exit
//! it causes is never treated as a crash. Media checks run on the blocking
//! pool before the lock is taken.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::invocation::InvocationBuilder;
use super::launcher::{EncoderLauncher, ExitReason, InterruptHandle};
use super::{Result, StreamConfig, StreamError};

/// Delay before a crashed encoder is relaunched.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(30);

/// Externally visible supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum StreamPhase {
    Idle,
    Running { pid: Option<u32> },
    /// The encoder crashed and a relaunch is scheduled.
    ReplayPending,
}

struct Active {
    generation: u64,
    pid: Option<u32>,
    interrupt: InterruptHandle,
}

struct PendingReplay {
    id: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    active: Option<Active>,
    /// Last accepted config, replayed after a crash.
    last_config: Option<StreamConfig>,
    replay: Option<PendingReplay>,
    /// Bumped on every launch and every scheduled replay.
    generation: u64,
}

impl State {
    fn replay_is(&self, id: u64) -> bool {
        self.replay.as_ref().is_some_and(|pending| pending.id == id)
    }
}

/// Check the media files on the blocking pool, returning the config if valid.
async fn validated(config: StreamConfig) -> Result<StreamConfig> {
    tokio::task::spawn_blocking(move || config.validate().map(|()| config))
        .await
        .map_err(|e| StreamError::InvalidConfig(format!("config check did not complete: {e}")))?
}

struct Inner {
    state: Mutex<State>,
    launcher: Arc<dyn EncoderLauncher>,
    builder: InvocationBuilder,
    restart_delay: Duration,
    live: watch::Sender<bool>,
}

/// Supervises the live encoder. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    #[must_use]
    pub fn new(launcher: Arc<dyn EncoderLauncher>, builder: InvocationBuilder) -> Self {
        Self::with_restart_delay(launcher, builder, DEFAULT_RESTART_DELAY)
    }

    #[must_use]
    pub fn with_restart_delay(
        launcher: Arc<dyn EncoderLauncher>,
        builder: InvocationBuilder,
        restart_delay: Duration,
    ) -> Self {
        let (live, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                launcher,
                builder,
                restart_delay,
                live,
            }),
        }
    }

    /// Validate `config` and launch the encoder.
    ///
    /// Fails with [`StreamError::AlreadyRunning`] if a process is live and
    /// with [`StreamError::InvalidConfig`] before anything is spawned. A
    /// pending crash replay is superseded by the new config.
    pub async fn start(&self, config: StreamConfig) -> Result<()> {
        if self.inner.state.lock().await.active.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        let config = validated(config).await?;

        // Re-check: another start may have won while the files were checked.
        let mut state = self.inner.state.lock().await;
        if state.active.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        if let Some(pending) = state.replay.take() {
            pending.task.abort();
            info!("pending replay superseded by explicit start");
        }

        self.inner.launch(&mut state, config)
    }

    /// Interrupt the encoder and clear the handle without waiting for exit.
    ///
    /// Also cancels a pending replay; succeeds if either was present.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        let cancelled_replay = match state.replay.take() {
            Some(pending) => {
                pending.task.abort();
                true
            }
            None => false,
        };

        match state.active.take() {
            Some(mut active) => {
                active.interrupt.interrupt();
                self.inner.live.send_replace(false);
                info!("stop requested for encoder (pid {:?})", active.pid);
                Ok(())
            }
            None if cancelled_replay => {
                info!("stop cancelled pending replay");
                Ok(())
            }
            None => Err(StreamError::NotRunning),
        }
    }

    pub async fn phase(&self) -> StreamPhase {
        let state = self.inner.state.lock().await;
        match (&state.active, &state.replay) {
            (Some(active), _) => StreamPhase::Running { pid: active.pid },
            (None, Some(_)) => StreamPhase::ReplayPending,
            (None, None) => StreamPhase::Idle,
        }
    }

    /// The config that would be replayed after a crash.
    pub async fn last_config(&self) -> Option<StreamConfig> {
        self.inner.state.lock().await.last_config.clone()
    }

    /// `true` while an encoder process handle exists.
    #[must_use]
    pub fn is_live(&self) -> bool {
        *self.inner.live.borrow()
    }

    /// Follow the "is streaming" flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.live.subscribe()
    }
}

impl Inner {
    /// Spawn the encoder and record it. Caller holds the state lock.
    fn launch(self: &Arc<Self>, state: &mut State, config: StreamConfig) -> Result<()> {
        let invocation = self.builder.build(&config)?;
        let process = self.launcher.launch(invocation)?;

        state.generation += 1;
        let generation = state.generation;
        state.active = Some(Active {
            generation,
            pid: process.pid,
            interrupt: process.interrupt,
        });
        state.last_config = Some(config);
        self.live.send_replace(true);
        info!("encoder running (pid {:?}, generation {generation})", process.pid);

        let inner = Arc::clone(self);
        let exited = process.exited;
        tokio::spawn(async move {
            let reason = exited.await.unwrap_or(ExitReason::Abnormal { code: None });
            inner.on_exit(generation, reason).await;
        });

        Ok(())
    }

    async fn on_exit(self: &Arc<Self>, generation: u64, reason: ExitReason) {
        let mut state = self.state.lock().await;

        let current = state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if !current {
            debug!("encoder generation {generation} exited after stop ({reason:?})");
            return;
        }

        state.active = None;
        self.live.send_replace(false);

        let ExitReason::Abnormal { code } = reason else {
            info!("encoder exited cleanly");
            return;
        };

        if state.last_config.is_none() {
            warn!("encoder crashed (code {code:?}) with no config to replay; staying idle");
            return;
        }

        warn!(
            "encoder crashed (code {code:?}); replaying in {:?}",
            self.restart_delay
        );
        state.generation += 1;
        let id = state.generation;
        let inner = Arc::clone(self);
        let delay = self.restart_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.replay(id).await;
        });
        state.replay = Some(PendingReplay { id, task });
    }

    async fn replay(self: &Arc<Self>, id: u64) {
        let config = {
            let mut state = self.state.lock().await;
            if !state.replay_is(id) {
                debug!("replay {id} was cancelled");
                return;
            }
            let Some(config) = state.last_config.clone() else {
                state.replay = None;
                return;
            };
            config
        };
        let validated = validated(config).await;

        let mut state = self.state.lock().await;
        // A stop or start in the meantime takes the pending replay.
        if !state.replay_is(id) {
            debug!("replay {id} was cancelled");
            return;
        }
        state.replay = None;

        if state.active.is_some() {
            debug!("replay {id} skipped: encoder already running");
            return;
        }
        let config = match validated {
            Ok(config) => config,
            Err(e) => {
                error!("replay aborted: {e}");
                return;
            }
        };
        match self.launch(&mut state, config) {
            Ok(()) => info!("encoder replayed after crash"),
            Err(e) => error!("replay failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::GraphCompiler;
    use crate::stream::config::tests::{config_for, TempMedia};
    use crate::stream::invocation::EncoderInvocation;
    use crate::stream::launcher::EncoderProcess;
    use tokio::sync::oneshot;

    /// Records every launch and hands the exit switch to the test.
    #[derive(Default)]
    struct StubLauncher {
        launches: std::sync::Mutex<Vec<Vec<String>>>,
        exits: std::sync::Mutex<Vec<oneshot::Sender<ExitReason>>>,
        interrupts: std::sync::Mutex<Vec<oneshot::Receiver<()>>>,
    }

    impl StubLauncher {
        fn launch_count(&self) -> usize {
            self.launches.lock().unwrap().len()
        }

        fn exit_latest(&self, reason: ExitReason) {
            let tx = self.exits.lock().unwrap().pop().unwrap();
            tx.send(reason).unwrap();
        }

        fn interrupted(&self, index: usize) -> bool {
            let mut interrupts = self.interrupts.lock().unwrap();
            interrupts[index].try_recv().is_ok()
        }
    }

    impl EncoderLauncher for StubLauncher {
        fn launch(&self, invocation: EncoderInvocation) -> Result<EncoderProcess> {
            let (interrupt_tx, interrupt_rx) = oneshot::channel();
            let (exit_tx, exit_rx) = oneshot::channel();
            let mut launches = self.launches.lock().unwrap();
            launches.push(invocation.args.clone());
            self.exits.lock().unwrap().push(exit_tx);
            self.interrupts.lock().unwrap().push(interrupt_rx);

            Ok(EncoderProcess {
                pid: u32::try_from(launches.len()).ok(),
                interrupt: InterruptHandle::new(interrupt_tx),
                exited: exit_rx,
            })
        }
    }

    struct Fixture {
        launcher: Arc<StubLauncher>,
        supervisor: Supervisor,
        video: TempMedia,
        audio: TempMedia,
    }

    impl Fixture {
        fn new() -> Self {
            let launcher = Arc::new(StubLauncher::default());
            let supervisor = Supervisor::new(
                launcher.clone(),
                InvocationBuilder::new("ffmpeg", GraphCompiler::default()),
            );
            Self {
                launcher,
                supervisor,
                video: TempMedia::new("mp4"),
                audio: TempMedia::new("m4a"),
            }
        }

        fn config(&self) -> StreamConfig {
            config_for(&self.video, &self.audio)
        }
    }

    /// Let spawned tasks observe a state change.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn start_launches_once() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();

        assert_eq!(fx.launcher.launch_count(), 1);
        assert!(fx.supervisor.is_live());
        assert_eq!(
            fx.supervisor.phase().await,
            StreamPhase::Running { pid: Some(1) }
        );
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_spawning() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();

        let err = fx.supervisor.start(fx.config()).await.unwrap_err();
        assert!(matches!(err, StreamError::AlreadyRunning));
        assert_eq!(fx.launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_spawn_one_process() {
        let fx = Fixture::new();
        let (a, b) = tokio::join!(
            fx.supervisor.start(fx.config()),
            fx.supervisor.start(fx.config())
        );

        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        assert_eq!(fx.launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn invalid_config_spawns_nothing() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.destination = String::new();

        let err = fx.supervisor.start(config).await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig(_)));
        assert_eq!(fx.launcher.launch_count(), 0);
        assert!(!fx.supervisor.is_live());
        assert!(fx.supervisor.last_config().await.is_none());
    }

    #[tokio::test]
    async fn rejected_start_leaves_supervisor_usable() {
        let fx = Fixture::new();
        let mut bad = fx.config();
        bad.video = "/nonexistent/loop.mp4".into();

        assert!(matches!(
            fx.supervisor.start(bad).await,
            Err(StreamError::InvalidConfig(_))
        ));
        fx.supervisor.start(fx.config()).await.unwrap();
        assert_eq!(fx.launcher.launch_count(), 1);
        assert!(fx.supervisor.is_live());
    }

    #[tokio::test]
    async fn stop_without_stream_is_rejected() {
        let fx = Fixture::new();
        let err = fx.supervisor.stop().await.unwrap_err();
        assert!(matches!(err, StreamError::NotRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn crash_replays_last_config_after_delay() {
        let fx = Fixture::new();
        let config = fx.config();
        fx.supervisor.start(config.clone()).await.unwrap();

        fx.launcher.exit_latest(ExitReason::Abnormal { code: Some(1) });
        settle().await;
        assert!(!fx.supervisor.is_live());
        assert_eq!(fx.supervisor.phase().await, StreamPhase::ReplayPending);

        tokio::time::sleep(DEFAULT_RESTART_DELAY - Duration::from_secs(1)).await;
        assert_eq!(fx.launcher.launch_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fx.launcher.launch_count(), 2);
        assert!(fx.supervisor.is_live());

        let launches = fx.launcher.launches.lock().unwrap();
        assert_eq!(launches[0], launches[1]);
        drop(launches);
        assert_eq!(fx.supervisor.last_config().await, Some(config));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_exit_does_not_replay() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();

        fx.launcher.exit_latest(ExitReason::Expected);
        settle().await;
        assert_eq!(fx.supervisor.phase().await, StreamPhase::Idle);

        tokio::time::sleep(DEFAULT_RESTART_DELAY * 3).await;
        assert_eq!(fx.launcher.launch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_after_stop_is_expected() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();

        fx.supervisor.stop().await.unwrap();
        assert!(fx.launcher.interrupted(0));
        assert!(!fx.supervisor.is_live());

        // ffmpeg exits 255 after SIGINT; that must not look like a crash.
        fx.launcher.exit_latest(ExitReason::Abnormal { code: Some(255) });
        tokio::time::sleep(DEFAULT_RESTART_DELAY * 2).await;

        assert_eq!(fx.launcher.launch_count(), 1);
        assert_eq!(fx.supervisor.phase().await, StreamPhase::Idle);
        assert!(matches!(
            fx.supervisor.stop().await,
            Err(StreamError::NotRunning)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_replay() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();
        fx.launcher.exit_latest(ExitReason::Abnormal { code: Some(1) });
        settle().await;

        tokio::time::sleep(DEFAULT_RESTART_DELAY / 2).await;
        fx.supervisor.stop().await.unwrap();
        tokio::time::sleep(DEFAULT_RESTART_DELAY).await;

        assert_eq!(fx.launcher.launch_count(), 1);
        assert_eq!(fx.supervisor.phase().await, StreamPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn start_supersedes_pending_replay() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();
        fx.launcher.exit_latest(ExitReason::Abnormal { code: Some(1) });
        settle().await;

        let mut next = fx.config();
        next.track_text = "Next — Song".to_string();
        fx.supervisor.start(next.clone()).await.unwrap();
        tokio::time::sleep(DEFAULT_RESTART_DELAY * 2).await;

        assert_eq!(fx.launcher.launch_count(), 2);
        assert_eq!(fx.supervisor.last_config().await, Some(next));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_with_missing_media_stays_idle() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();
        std::fs::remove_file(&fx.audio.0).unwrap();

        fx.launcher.exit_latest(ExitReason::Abnormal { code: None });
        tokio::time::sleep(DEFAULT_RESTART_DELAY * 2).await;

        assert_eq!(fx.launcher.launch_count(), 1);
        assert_eq!(fx.supervisor.phase().await, StreamPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn each_crash_schedules_one_replay() {
        let fx = Fixture::new();
        fx.supervisor.start(fx.config()).await.unwrap();

        for expected in 2..=4 {
            fx.launcher.exit_latest(ExitReason::Abnormal { code: Some(1) });
            tokio::time::sleep(DEFAULT_RESTART_DELAY + Duration::from_secs(1)).await;
            assert_eq!(fx.launcher.launch_count(), expected);
        }
    }

    #[tokio::test]
    async fn live_flag_follows_process() {
        let fx = Fixture::new();
        let mut live = fx.supervisor.subscribe();
        assert!(!*live.borrow());

        fx.supervisor.start(fx.config()).await.unwrap();
        live.changed().await.unwrap();
        assert!(*live.borrow_and_update());

        fx.launcher.exit_latest(ExitReason::Expected);
        live.changed().await.unwrap();
        assert!(!*live.borrow());
    }
}
