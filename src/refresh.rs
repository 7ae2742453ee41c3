//! Periodic blocklist view refresher
//!
//! Re-reads the list store on a fixed interval and recomputes the remaining
//! block TTL for every entry; a pure read path that never re-runs
//! classification, so it is safe to run alongside an active ingestion run.
//!
//! Out-of-band triggers (e.g. right after a run finishes) are debounced:
//! triggers arriving within the debounce delay coalesce into one refresh.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::BlockStatusRow;
use crate::store::ListStore;

/// Handle to the background refresh task
pub struct BlocklistRefresher {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BlocklistRefresher {
    /// Spawn the refresh task. `on_refresh` receives the current view rows
    /// once per `interval` tick and once per coalesced trigger.
    pub fn spawn<F>(
        store: ListStore,
        interval: Duration,
        debounce: Duration,
        mut on_refresh: F,
    ) -> Self
    where
        F: FnMut(Vec<BlockStatusRow>) + Send + 'static,
    {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        refresh(&store, &mut on_refresh);
                    }
                    Some(()) = trigger_rx.recv() => {
                        tokio::time::sleep(debounce).await;
                        // Anything that arrived during the delay folds in
                        while trigger_rx.try_recv().is_ok() {}
                        refresh(&store, &mut on_refresh);
                        ticker.reset();
                    }
                }
            }
        });

        Self {
            trigger_tx,
            shutdown_tx,
            handle,
        }
    }

    /// Request an out-of-band refresh; repeated triggers coalesce
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

fn refresh<F>(store: &ListStore, on_refresh: &mut F)
where
    F: FnMut(Vec<BlockStatusRow>),
{
    let now_ms = Utc::now().timestamp_millis();
    match store.block_status(now_ms) {
        Ok(rows) => on_refresh(rows),
        Err(e) => warn!("Blocklist refresh failed: {:#}", e),
    }
}
