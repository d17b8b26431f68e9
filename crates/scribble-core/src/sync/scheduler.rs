//! Automatic sync triggers: reconnect edges and a periodic timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::SyncEngine;
use crate::network::NetworkMonitor;
use crate::remote::RemoteStore;

/// Run sync passes whenever connectivity returns and every `period` while online.
///
/// Each pass runs in its own task so connectivity keeps being observed while
/// a pass is in flight.
pub fn spawn_auto_sync<R: RemoteStore>(
    engine: Arc<SyncEngine<R>>,
    monitor: Arc<NetworkMonitor>,
    period: Duration,
) -> JoinHandle<()> {
    let mut connectivity = monitor.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connectivity.borrow_and_update();
                    if state.just_reconnected && !engine.queue().is_empty().await {
                        tracing::info!("Back online; syncing pending changes");
                        spawn_pass(&engine, "reconnect");
                    }
                }
                _ = ticker.tick() => {
                    if !monitor.is_online() || engine.is_running() {
                        tracing::debug!("Skipping periodic sync");
                        continue;
                    }
                    if !engine.queue().is_empty().await {
                        spawn_pass(&engine, "periodic");
                    }
                }
            }
        }
    })
}

fn spawn_pass<R: RemoteStore>(engine: &Arc<SyncEngine<R>>, trigger: &'static str) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        match engine.sync_pending_changes().await {
            Ok(outcome) => tracing::debug!("{} sync finished: {:?}", trigger, outcome),
            Err(error) => tracing::error!("{} sync failed: {}", trigger, error),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::LocalMirrorStore;
    use crate::queue::PendingChangeQueue;
    use crate::services::DatabaseService;
    use crate::test_support::{folder_rename, RecordingRemote, RemoteCall};
    use pretty_assertions::assert_eq;

    async fn engine() -> (Arc<RecordingRemote>, Arc<SyncEngine<RecordingRemote>>) {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let remote = Arc::new(RecordingRemote::default());
        let queue = PendingChangeQueue::open(db.clone()).await.unwrap();
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&remote),
            queue,
            LocalMirrorStore::new(db),
        ));
        (remote, engine)
    }

    async fn wait_for_empty_queue(engine: &SyncEngine<RecordingRemote>) -> bool {
        for _ in 0..200 {
            if engine.queue().is_empty().await && !engine.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_triggers_a_pass() {
        let (remote, engine) = engine().await;
        engine.queue().enqueue(folder_rename("f1", "Work")).await.unwrap();
        let monitor = NetworkMonitor::new(false, Duration::from_secs(1));
        let task = spawn_auto_sync(
            Arc::clone(&engine),
            Arc::clone(&monitor),
            Duration::from_secs(300),
        );

        monitor.report_online();

        assert!(wait_for_empty_queue(&engine).await);
        assert_eq!(remote.calls(), vec![RemoteCall::RenameFolder("f1".to_string())]);
        task.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn periodic_timer_syncs_only_while_online() {
        let (remote, engine) = engine().await;
        engine.queue().enqueue(folder_rename("f1", "Work")).await.unwrap();
        let monitor = NetworkMonitor::new(false, Duration::from_secs(1));
        let task = spawn_auto_sync(
            Arc::clone(&engine),
            Arc::clone(&monitor),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(remote.calls().is_empty());
        assert_eq!(engine.queue().count().await, 1);
        task.abort();

        let online = NetworkMonitor::new(true, Duration::from_secs(1));
        let task = spawn_auto_sync(Arc::clone(&engine), online, Duration::from_millis(20));
        assert!(wait_for_empty_queue(&engine).await);
        assert_eq!(remote.calls().len(), 1);
        task.abort();
    }
}
