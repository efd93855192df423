// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Rolling-window feed.
//!
//! Polls the quality source for its most recent readings and pushes them
//! to the monitor whenever the set of ids has changed since the last
//! delivery.

use crate::config::MonitorConfig;
use crate::loader::MeasurementLoader;
use crate::monitor::Notifier;
use spc::{MeasurementBatch, TimeWindow};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Poller that forwards changed batches to a monitor.
pub struct Feed {
    loader: MeasurementLoader,
    notifier: Notifier,
    window_hours: i64,
    limit: usize,
    poll_interval: Duration,
    last_ids: BTreeSet<String>,
}

impl Feed {
    pub fn new(loader: MeasurementLoader, notifier: Notifier, config: &MonitorConfig) -> Self {
        Self {
            loader,
            notifier,
            window_hours: config.feed_window_hours,
            limit: config.feed_limit,
            poll_interval: config.feed_poll_interval(),
            last_ids: BTreeSet::new(),
        }
    }

    /// Poll once. Returns whether a batch was delivered.
    pub async fn poll(&mut self) -> bool {
        let batch = self
            .loader
            .load_recent(TimeWindow::last_hours(self.window_hours), self.limit)
            .await;
        self.deliver(batch)
    }

    fn deliver(&mut self, batch: MeasurementBatch) -> bool {
        if batch.is_empty() {
            return false;
        }
        let ids: BTreeSet<String> = batch.measurements.iter().map(|m| m.id.clone()).collect();
        if ids == self.last_ids {
            debug!("Feed unchanged ({} readings)", ids.len());
            return false;
        }

        let count = batch.len();
        match self.notifier.notify(batch) {
            Ok(()) => {
                debug!("Feed delivered {} readings", count);
                self.last_ids = ids;
                true
            }
            Err(e) => {
                warn!("Feed could not reach monitor: {}", e);
                false
            }
        }
    }

    /// Run the poller until stopped or the monitor goes away.
    pub fn spawn(mut self) -> FeedHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            info!(
                "Starting feed: last {}h, limit {}, every {:?}",
                self.window_hours, self.limit, self.poll_interval
            );
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if self.notifier.is_closed() {
                            debug!("Monitor gone, feed exiting");
                            break;
                        }
                        self.poll().await;
                    }
                }
            }
            info!("Feed stopped");
        });
        FeedHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running feed.
pub struct FeedHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Stop polling and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Feed task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorHandle;
    use crate::source::MemorySource;
    use chrono::{Duration as ChronoDuration, Utc};
    use spc::{Measurement, SpcEngine};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn reading(i: usize) -> Measurement {
        Measurement::new(
            format!("r{}", i),
            10.0,
            "H01",
            Utc::now() - ChronoDuration::minutes(60 - i as i64),
        )
    }

    #[tokio::test]
    async fn test_feed_delivers_only_changes() {
        let config = MonitorConfig::default();
        let source = Arc::new(MemorySource::with_measurements((0..5).map(reading).collect()));
        let loader = MeasurementLoader::new(source.clone(), &config);
        let mut handle =
            MonitorHandle::start(SpcEngine::default(), loader.clone(), &config);
        let mut feed = Feed::new(loader, handle.notifier(), &config);

        assert!(feed.poll().await);
        assert!(!feed.poll().await);

        source.push(reading(5)).await;
        assert!(feed.poll().await);

        handle.flush().await.unwrap();
        assert!(handle.stats().push_cycles.load(Ordering::SeqCst) >= 1);
        assert_eq!(handle.snapshot().await.measurements.len(), 6);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_feed_respects_limit() {
        let config = MonitorConfig {
            feed_limit: 3,
            ..MonitorConfig::default()
        };
        let source = Arc::new(MemorySource::with_measurements((0..10).map(reading).collect()));
        let loader = MeasurementLoader::new(source, &config);
        let mut handle =
            MonitorHandle::start(SpcEngine::default(), loader.clone(), &config);
        let mut feed = Feed::new(loader, handle.notifier(), &config);

        assert!(feed.poll().await);
        handle.flush().await.unwrap();
        let ids: Vec<String> = handle
            .snapshot()
            .await
            .measurements
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["r7", "r8", "r9"]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_feed_stops() {
        let config = MonitorConfig::default();
        let loader = MeasurementLoader::new(Arc::new(MemorySource::new()), &config);
        let mut handle =
            MonitorHandle::start(SpcEngine::default(), loader.clone(), &config);
        let mut feed = Feed::new(loader, handle.notifier(), &config).spawn();
        feed.stop().await;
        handle.stop().await.unwrap();
    }
}
