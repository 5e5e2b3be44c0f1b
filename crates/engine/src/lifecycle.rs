use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{
    AssetPair, EngineState, Error, ExchangeClient, Notifier, Pair, Result, SideTasks, StateChange,
    Store,
};
use strategy::StrategyRegistry;

use crate::coordinator::Coordinator;
use crate::settings::{Settings, SettingsSource};
use crate::stream::Stream;

/// How often an idle engine looks for configuration changes.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Why a start/stop/restart command was not carried out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("a command of this kind is already pending")]
    AlreadyPending,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is already idle")]
    AlreadyIdle,

    #[error("command failed: {0}")]
    Failed(String),

    #[error("engine has shut down")]
    Closed,
}

type Reply = oneshot::Sender<std::result::Result<(), CommandError>>;

enum Command {
    Start(SideTasks, Reply),
    Stop(SideTasks, Reply),
    Restart(SideTasks, Reply),
}

/// Clears a pending flag when the command completes or its caller gives up.
struct Pending(Arc<AtomicBool>);

impl Pending {
    fn claim(flag: &Arc<AtomicBool>) -> std::result::Result<Self, CommandError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CommandError::AlreadyPending)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cloneable handle passed to other crates (Telegram, the binary).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<Command>,
    state: Arc<RwLock<EngineState>>,
    changes: broadcast::Sender<StateChange>,
    pending_start: Arc<AtomicBool>,
    pending_stop: Arc<AtomicBool>,
}

impl EngineHandle {
    pub async fn start(&self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        let _start = Pending::claim(&self.pending_start)?;
        self.send(|reply| Command::Start(tasks, reply)).await
    }

    pub async fn stop(&self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        let _stop = Pending::claim(&self.pending_stop)?;
        self.send(|reply| Command::Stop(tasks, reply)).await
    }

    /// Stop then start as one command. Side tasks run during the stop.
    pub async fn restart(&self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        let _stop = Pending::claim(&self.pending_stop)?;
        let _start = Pending::claim(&self.pending_start)?;
        self.send(|reply| Command::Restart(tasks, reply)).await
    }

    async fn send(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> std::result::Result<(), CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| CommandError::Closed)?;
        reply_rx.await.map_err(|_| CommandError::Closed)?
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to operator-driven state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

/// The workflow controller: owns the streams and is the only task that
/// starts, stops or cycles them.
pub struct Engine {
    source: Arc<dyn SettingsSource>,
    settings: Settings,
    registry: StrategyRegistry,
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    coordinator: Coordinator,
    streams: Vec<Arc<Mutex<Stream>>>,
    next_cycle: Instant,
    state: Arc<RwLock<EngineState>>,
    changes: broadcast::Sender<StateChange>,
    command_rx: mpsc::Receiver<Command>,
}

impl Engine {
    /// Build an idle engine from the current configuration snapshot.
    pub fn new(
        source: Arc<dyn SettingsSource>,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, EngineHandle)> {
        let (settings, registry) = load(source.as_ref())?;
        let (command_tx, command_rx) = mpsc::channel(8);
        let (changes, _) = broadcast::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Idle));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            changes: changes.clone(),
            pending_start: Arc::new(AtomicBool::new(false)),
            pending_stop: Arc::new(AtomicBool::new(false)),
        };

        let engine = Engine {
            source,
            settings,
            registry,
            coordinator: Coordinator::new(exchange.clone(), store.clone(), notifier.clone()),
            exchange,
            store,
            notifier,
            streams: Vec::new(),
            next_cycle: Instant::now(),
            state,
            changes,
            command_rx,
        };

        Ok((engine, handle))
    }

    /// Run the engine until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            pairs = self.settings.pairs.len(),
            strategies = self.registry.len(),
            "Engine initialized in Idle state. Waiting for Start command."
        );

        loop {
            let running = *self.state.read().await == EngineState::Running;
            let command = if running {
                tokio::select! {
                    biased;
                    command = self.command_rx.recv() => command,
                    _ = tokio::time::sleep_until(self.next_cycle) => {
                        self.cycle().await;
                        continue;
                    }
                }
            } else {
                tokio::select! {
                    biased;
                    command = self.command_rx.recv() => command,
                    _ = tokio::time::sleep(IDLE_POLL) => {
                        self.adopt_changes();
                        continue;
                    }
                }
            };

            match command {
                Some(Command::Start(tasks, reply)) => {
                    let _ = reply.send(self.start(tasks).await);
                }
                Some(Command::Stop(tasks, reply)) => {
                    let _ = reply.send(self.stop(tasks).await);
                }
                Some(Command::Restart(tasks, reply)) => {
                    let _ = reply.send(self.restart(tasks).await);
                }
                None => {
                    warn!("Engine command channel closed, shutting down");
                    break;
                }
            }
        }
    }

    async fn start(&mut self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        if *self.state.read().await == EngineState::Running {
            return Err(CommandError::AlreadyRunning);
        }
        self.adopt_changes();
        if let Err(e) = self.launch(tasks).await {
            error!(error = %e, "Engine failed to start");
            return Err(CommandError::Failed(e.to_string()));
        }
        self.transition(EngineState::Running, tasks).await;
        Ok(())
    }

    async fn stop(&mut self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        if *self.state.read().await == EngineState::Idle {
            return Err(CommandError::AlreadyIdle);
        }
        self.shutdown(tasks).await;
        self.transition(EngineState::Idle, tasks).await;
        Ok(())
    }

    async fn restart(&mut self, tasks: SideTasks) -> std::result::Result<(), CommandError> {
        self.stop(tasks).await?;
        self.start(SideTasks::default()).await
    }

    /// One coordinated cycle, then the reload check at the boundary.
    async fn cycle(&mut self) {
        let bot = &self.settings.bot;
        match self
            .coordinator
            .run_cycle(&self.streams, bot.max_concurrent_streams, bot.cycles_kept)
            .await
        {
            Ok(report) => debug!(?report, "Cycle finished"),
            Err(e) => warn!(error = %e, "Cycle could not run"),
        }
        self.next_cycle = Instant::now() + Duration::from_secs(self.settings.bot.cycle_delay_secs);

        if self.source.changed() {
            self.reload_running().await;
        }
    }

    /// Apply a changed configuration to a running engine without notifying
    /// observers. A snapshot that fails validation is ignored.
    async fn reload_running(&mut self) {
        let (settings, registry) = match load(self.source.as_ref()) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Configuration reload rejected, keeping current settings");
                return;
            }
        };
        info!("Configuration changed, restarting streams");
        self.shutdown(SideTasks::default()).await;
        self.settings = settings;
        self.registry = registry;
        if let Err(e) = self.launch(SideTasks::default()).await {
            error!(error = %e, "Engine failed to restart after reload");
            self.transition(EngineState::Idle, SideTasks::default()).await;
        }
    }

    /// Adopt a changed configuration while no streams are running.
    fn adopt_changes(&mut self) {
        if !self.source.changed() {
            return;
        }
        match load(self.source.as_ref()) {
            Ok((settings, registry)) => {
                info!(pairs = settings.pairs.len(), "Configuration reloaded");
                self.settings = settings;
                self.registry = registry;
            }
            Err(e) => warn!(error = %e, "Configuration reload rejected, keeping current settings"),
        }
    }

    /// Confirm pairs and intervals, build the streams and run side tasks.
    async fn launch(&mut self, tasks: SideTasks) -> Result<()> {
        self.exchange.ping().await?;
        let pairs: Vec<Pair> = self.settings.pairs.keys().cloned().collect();
        let confirmed = self.exchange.confirm_pairs(&pairs).await?;
        let intervals: BTreeSet<u64> = self
            .settings
            .pairs
            .values()
            .map(|p| p.interval_secs)
            .collect();
        for interval in intervals {
            self.exchange.confirm_interval(interval).await?;
        }

        let mut streams = Vec::with_capacity(confirmed.len());
        for asset_pair in confirmed {
            let settings = self
                .settings
                .pairs
                .get(&asset_pair.pair)
                .cloned()
                .ok_or_else(|| {
                    Error::data(format!("exchange confirmed unexpected pair {}", asset_pair.pair))
                })?;
            let strategies = self.registry.instantiate(&settings.strategies)?;
            streams.push(Arc::new(Mutex::new(Stream::new(asset_pair, settings, strategies))));
        }

        let asset_pairs = asset_pairs(&streams).await;
        self.side_tasks(&asset_pairs, tasks).await;
        self.streams = streams;
        self.next_cycle = Instant::now();
        info!(pairs = self.streams.len(), "Streams started");
        Ok(())
    }

    async fn shutdown(&mut self, tasks: SideTasks) {
        let asset_pairs = asset_pairs(&self.streams).await;
        self.side_tasks(&asset_pairs, tasks).await;
        self.streams.clear();
        self.store.reset_session_orders();
        info!("Streams stopped");
    }

    async fn side_tasks(&self, pairs: &[AssetPair], tasks: SideTasks) {
        let bot = &self.settings.bot;
        let ok = self
            .coordinator
            .run_side_tasks(pairs, tasks, bot.max_concurrent_streams, bot.side_task_retries)
            .await;
        if !ok {
            self.notifier
                .telegram_send("Side tasks failed after retries, check open orders".to_string());
        }
    }

    async fn transition(&self, state: EngineState, side_tasks: SideTasks) {
        *self.state.write().await = state;
        let _ = self.changes.send(StateChange { state, side_tasks });
        let (event, text) = match state {
            EngineState::Running => ("engine_started", "Bot started"),
            EngineState::Idle => ("engine_stopped", "Bot stopped"),
        };
        self.notifier.internal_send(event);
        self.notifier.telegram_send(text.to_string());
        info!(%state, ?side_tasks, "Engine state changed");
    }
}

fn load(source: &dyn SettingsSource) -> Result<(Settings, StrategyRegistry)> {
    let settings = source.current()?;
    let registry = settings.validate()?;
    Ok((settings, registry))
}

async fn asset_pairs(streams: &[Arc<Mutex<Stream>>]) -> Vec<AssetPair> {
    let mut pairs = Vec::with_capacity(streams.len());
    for stream in streams {
        pairs.push(stream.lock().await.asset_pair().clone());
    }
    pairs
}
