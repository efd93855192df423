// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Monitoring loop.
//!
//! One task owns every pipeline run. The periodic timer and the command
//! queue feed the same `select!` loop, so a push notification can never
//! run while a timer cycle is in progress. Readers share the engine
//! through [`SharedEngine`] and see it between cycles.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::loader::MeasurementLoader;
use crate::metrics;
use spc::{MeasurementBatch, MonitorState, SpcEngine, SpcSnapshot, TimeWindow};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Engine shared between the monitoring task and its readers.
pub type SharedEngine = Arc<RwLock<SpcEngine>>;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First load after start.
    Init,
    /// Periodic reload.
    Timer,
    /// Explicit reload request.
    Refresh,
    /// Pushed batch.
    Push,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Init => "init",
            Trigger::Timer => "timer",
            Trigger::Refresh => "refresh",
            Trigger::Push => "push",
        }
    }

    /// Whether the cycle reloads and runs the full pipeline.
    fn is_full(&self) -> bool {
        !matches!(self, Trigger::Push)
    }
}

/// Counters of the monitoring loop.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Cycles that completed.
    pub cycles: AtomicU64,
    /// Completed timer cycles.
    pub timer_cycles: AtomicU64,
    /// Completed push cycles.
    pub push_cycles: AtomicU64,
    /// Pushed batches superseded by a newer one before they ran.
    pub coalesced_pushes: AtomicU64,
    /// Cycles that panicked.
    pub failures: AtomicU64,
}

impl MonitorStats {
    fn record(&self, trigger: Trigger) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        match trigger {
            Trigger::Timer => {
                self.timer_cycles.fetch_add(1, Ordering::SeqCst);
            }
            Trigger::Push => {
                self.push_cycles.fetch_add(1, Ordering::SeqCst);
            }
            Trigger::Init | Trigger::Refresh => {}
        }
    }
}

#[derive(Debug)]
enum Command {
    Push(MeasurementBatch),
    Refresh,
    Flush(oneshot::Sender<()>),
    Stop,
}

/// Monitoring loop, ready to be spawned.
pub struct Monitor {
    engine: SharedEngine,
    loader: MeasurementLoader,
    period: Duration,
    history_window_days: i64,
    metrics_file: Option<PathBuf>,
    stats: Arc<MonitorStats>,
}

impl Monitor {
    /// Monitor driving `engine`, reloading through `loader`.
    pub fn new(engine: SpcEngine, loader: MeasurementLoader, config: &MonitorConfig) -> Self {
        Self {
            period: Duration::from_millis(engine.config().update_interval_ms),
            engine: Arc::new(RwLock::new(engine)),
            loader,
            history_window_days: config.history_window_days,
            metrics_file: None,
            stats: Arc::new(MonitorStats::default()),
        }
    }

    /// Builder: rewrite a Prometheus text file after every cycle.
    pub fn with_metrics_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_file = Some(path.into());
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> MonitorHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let engine = Arc::clone(&self.engine);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(rx));
        MonitorHandle {
            engine,
            stats,
            commands,
            task: Some(task),
        }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!(
            "Starting SPC monitor: interval {:?}, history {} days",
            self.period, self.history_window_days
        );
        self.set_state(MonitorState::Initializing).await;
        self.reload(Trigger::Init).await;

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deferred: VecDeque<Command> = VecDeque::new();

        loop {
            let command = match deferred.pop_front() {
                Some(command) => command,
                None => {
                    tokio::select! {
                        biased;
                        _ = ticker.tick() => {
                            self.reload(Trigger::Timer).await;
                            continue;
                        }
                        command = rx.recv() => match command {
                            Some(command) => command,
                            None => {
                                debug!("All monitor handles dropped");
                                break;
                            }
                        },
                    }
                }
            };

            match command {
                Command::Push(batch) => {
                    let batch = self.coalesce(batch, &mut rx, &mut deferred);
                    self.cycle(Trigger::Push, batch).await;
                }
                Command::Refresh => self.reload(Trigger::Refresh).await,
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::Stop => break,
            }
        }

        self.set_state(MonitorState::Stopped).await;
        info!("SPC monitor stopped");
    }

    /// Keep only the newest of the pushes already queued. Other commands
    /// keep their order and run after the push.
    fn coalesce(
        &self,
        mut batch: MeasurementBatch,
        rx: &mut mpsc::UnboundedReceiver<Command>,
        deferred: &mut VecDeque<Command>,
    ) -> MeasurementBatch {
        while let Ok(command) = rx.try_recv() {
            match command {
                Command::Push(newer) => {
                    self.stats.coalesced_pushes.fetch_add(1, Ordering::SeqCst);
                    batch = newer;
                }
                other => deferred.push_back(other),
            }
        }
        batch
    }

    fn window(&self) -> TimeWindow {
        TimeWindow::last_days(self.history_window_days)
    }

    async fn reload(&self, trigger: Trigger) {
        let loaded = self.loader.load(self.window()).await;
        debug!(
            "{} reload: {} measurements from {}",
            trigger.as_str(),
            loaded.batch.len(),
            loaded.origin.as_str()
        );
        self.cycle(trigger, loaded.batch).await;
    }

    async fn cycle(&self, trigger: Trigger, batch: MeasurementBatch) {
        let mut engine = self.engine.write().await;
        if trigger != Trigger::Init {
            engine.set_state(MonitorState::Recalculating);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if trigger.is_full() {
                Some(engine.run_pipeline(batch))
            } else {
                engine.recalculate_with(batch)
            }
        }));

        match outcome {
            Ok(Some(report)) => {
                self.stats.record(trigger);
                metrics::record_cycle(trigger.as_str());
                metrics::record_alarms(&engine);
                debug!(
                    "{} cycle: {} subgroups, {} alarms",
                    trigger.as_str(),
                    report.subgroups,
                    report.alarms
                );
            }
            Ok(None) => debug!("Empty push ignored"),
            Err(payload) => {
                self.stats.failures.fetch_add(1, Ordering::SeqCst);
                metrics::record_failure();
                error!(
                    "{} cycle failed, keeping previous results: {}",
                    trigger.as_str(),
                    panic_message(payload.as_ref())
                );
            }
        }

        engine.set_state(MonitorState::Monitoring);
        metrics::update_from_engine(&engine);
        metrics::set_monitor_state(engine.state());
        drop(engine);

        if let Some(path) = &self.metrics_file {
            if let Err(e) = metrics::write_metrics_file(path).await {
                warn!("Failed to write metrics file {}: {}", path.display(), e);
            }
        }
    }

    async fn set_state(&self, state: MonitorState) {
        self.engine.write().await.set_state(state);
        metrics::set_monitor_state(state);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Handle to a running monitor.
///
/// Dropping every handle also ends the loop.
pub struct MonitorHandle {
    engine: SharedEngine,
    stats: Arc<MonitorStats>,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Start a monitor with default options.
    pub fn start(engine: SpcEngine, loader: MeasurementLoader, config: &MonitorConfig) -> Self {
        Monitor::new(engine, loader, config).spawn()
    }

    /// Queue a pushed batch. Empty batches are dropped here.
    pub fn notify(&self, batch: MeasurementBatch) -> Result<()> {
        self.notifier().notify(batch)
    }

    /// Queue a reload outside the timer schedule.
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Wait until every command queued so far has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack))?;
        done.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Stop the loop and wait for it to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if self.commands.send(Command::Stop).is_err() {
            debug!("Monitor loop already gone");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Monitor task ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub async fn state(&self) -> MonitorState {
        self.engine.read().await.state()
    }

    /// Export the current session.
    pub async fn snapshot(&self) -> SpcSnapshot {
        self.engine.read().await.export_snapshot()
    }

    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Cloneable sender for pushed batches.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            commands: self.commands.clone(),
        }
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::ChannelClosed)
    }
}

/// Pushes batches into a running monitor.
#[derive(Debug, Clone)]
pub struct Notifier {
    commands: mpsc::UnboundedSender<Command>,
}

impl Notifier {
    /// Queue a pushed batch. Empty batches are dropped here.
    pub fn notify(&self, batch: MeasurementBatch) -> Result<()> {
        if batch.is_empty() {
            debug!("Ignoring empty notification");
            return Ok(());
        }
        self.commands
            .send(Command::Push(batch))
            .map_err(|_| MonitorError::ChannelClosed)
    }

    /// Whether the monitor loop has gone away.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use chrono::{Duration as ChronoDuration, Utc};
    use spc::{Measurement, SpcConfig, Specification};

    fn measurements(n: usize, prefix: &str) -> Vec<Measurement> {
        let start = Utc::now() - ChronoDuration::hours(2);
        let spec = Specification::symmetric(10.0, 1.0);
        (0..n)
            .map(|i| {
                let value = 10.0 + [-0.2, 0.1, 0.0, -0.1, 0.2][i % 5];
                Measurement::new(
                    format!("{}{}", prefix, i),
                    value,
                    "H01",
                    start + ChronoDuration::seconds(i as i64),
                )
                .with_specification(spec)
            })
            .collect()
    }

    fn start(source: MemorySource) -> MonitorHandle {
        let config = MonitorConfig::default();
        let loader = MeasurementLoader::new(Arc::new(source), &config);
        MonitorHandle::start(SpcEngine::default(), loader, &config)
    }

    #[test]
    fn test_trigger_names() {
        assert_eq!(Trigger::Init.as_str(), "init");
        assert_eq!(Trigger::Push.as_str(), "push");
        assert!(Trigger::Timer.is_full());
        assert!(!Trigger::Push.is_full());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_initial_cycle() {
        let mut handle = start(MemorySource::with_measurements(measurements(50, "q")));
        handle.flush().await.unwrap();

        assert_eq!(handle.state().await, MonitorState::Monitoring);
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.measurements.len(), 50);
        assert!(snapshot.control_limits.is_some());
        assert_eq!(handle.stats().cycles.load(Ordering::SeqCst), 1);

        handle.stop().await.unwrap();
        assert_eq!(handle.state().await, MonitorState::Stopped);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_empty_notification_is_dropped() {
        let mut handle = start(MemorySource::with_measurements(measurements(50, "q")));
        handle.notify(MeasurementBatch::empty()).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(handle.stats().push_cycles.load(Ordering::SeqCst), 0);
        assert_eq!(handle.snapshot().await.measurements.len(), 50);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_after_stop_fail() {
        let mut handle = start(MemorySource::new());
        handle.stop().await.unwrap();

        let batch = MeasurementBatch::from_measurements(measurements(5, "p"));
        assert!(matches!(
            handle.notify(batch),
            Err(MonitorError::ChannelClosed)
        ));
        assert!(handle.flush().await.is_err());
        // stopping twice is harmless
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_interval_from_engine_config() {
        let engine = SpcEngine::new(SpcConfig::default().with_update_interval_ms(1500)).unwrap();
        let config = MonitorConfig::default();
        let loader = MeasurementLoader::new(Arc::new(MemorySource::new()), &config);
        let monitor = Monitor::new(engine, loader, &config);
        assert_eq!(monitor.period, Duration::from_millis(1500));
    }
}
