//! Connectivity-driven sync trigger.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use kelasi_core::sync::{use_batch_path, ConnectivityWatcher, SyncReport};

use crate::engine::SyncEngine;

/// Invoked with the report of every automatically triggered pass.
pub type SyncCallback = Arc<dyn Fn(SyncReport) + Send + Sync>;

/// Runs a sync pass whenever connectivity comes back.
///
/// The listener runs one pass right away when the watcher already reports
/// online and items are waiting, then one pass per offline-to-online
/// transition. Small backlogs drain item by item; backlogs above the batch
/// threshold go through the batch endpoint.
pub struct AutoSync {
    engine: Arc<SyncEngine>,
    watcher: Arc<dyn ConnectivityWatcher>,
    listener: Mutex<Option<Listener>>,
}

/// Attached listener task plus the channel that asks it to exit.
struct Listener {
    shutdown: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl Listener {
    /// Ask the loop to exit and wait for it. A pass already in flight runs
    /// to completion, so no queued item is abandoned in the syncing state.
    async fn detach(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

impl AutoSync {
    pub fn new(engine: Arc<SyncEngine>, watcher: Arc<dyn ConnectivityWatcher>) -> Self {
        Self {
            engine,
            watcher,
            listener: Mutex::new(None),
        }
    }

    /// Attach the connectivity listener, replacing any previous one. The
    /// previous listener is waited out, never cancelled mid-pass.
    pub async fn start(&self, on_sync: Option<SyncCallback>) {
        let mut guard = self.listener.lock().await;
        if let Some(previous) = guard.take() {
            previous.detach().await;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(());
        let engine = Arc::clone(&self.engine);
        let watcher = Arc::clone(&self.watcher);
        let task = tokio::spawn(async move {
            // Subscribe before the online check so a transition landing in
            // between is not lost.
            let mut receiver = watcher.subscribe();
            if watcher.is_online() {
                run_pass(&engine, on_sync.as_ref()).await;
            }

            loop {
                // The shutdown branch only interrupts the wait between
                // passes; a running pass always finishes first.
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            debug!("[GradeSync] Connectivity signal dropped; auto-sync listener exiting");
                            break;
                        }
                        if *receiver.borrow_and_update() {
                            run_pass(&engine, on_sync.as_ref()).await;
                        }
                    }
                }
            }
        });
        *guard = Some(Listener { shutdown, task });
        debug!("[GradeSync] Auto-sync listener started");
    }

    /// Detach the connectivity listener, waiting for any in-flight pass to
    /// finish. Safe to call when none is attached.
    pub async fn stop(&self) {
        let mut guard = self.listener.lock().await;
        if let Some(previous) = guard.take() {
            previous.detach().await;
            debug!("[GradeSync] Auto-sync listener stopped");
        }
    }
}

/// One triggered pass: skip when nothing is queued, batch when the backlog
/// is large, report through the callback.
async fn run_pass(engine: &SyncEngine, on_sync: Option<&SyncCallback>) {
    let pending = match engine.store().pending_count().await {
        Ok(count) => count,
        Err(err) => {
            warn!("[GradeSync] Auto-sync could not read the queue: {}", err);
            return;
        }
    };
    if pending == 0 {
        debug!("[GradeSync] Online with an empty queue; nothing to sync");
        return;
    }

    info!("[GradeSync] Auto-sync draining {} pending grades", pending);
    let result = if use_batch_path(pending) {
        engine.sync_pending_batch().await
    } else {
        engine.sync_pending().await
    };
    match result {
        Ok(report) => {
            if let Some(callback) = on_sync {
                callback(report);
            }
        }
        Err(err) => warn!("[GradeSync] Auto-sync pass failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GradeApiClient;
    use crate::testutil::{start_mock_grade_server, CapturedRequest, MockOutcome};
    use kelasi_core::sync::{
        ConnectivitySignal, EvalType, GradePayload, MemoryQueueStore, MutationKind, QueueStore,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn payload(student: &str, score: f64) -> GradePayload {
        GradePayload {
            student_id: student.to_string(),
            subject_id: "m1".to_string(),
            term_id: "t1".to_string(),
            eval_type: EvalType::Interro,
            score,
            observation: None,
        }
    }

    fn ok_response() -> MockOutcome {
        MockOutcome::Respond {
            status: 201,
            body: r#"{"id":"grade-1"}"#.to_string(),
            delay_ms: 0,
        }
    }

    struct Harness {
        auto: AutoSync,
        store: Arc<MemoryQueueStore>,
        signal: Arc<ConnectivitySignal>,
        captured: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
        server: JoinHandle<()>,
    }

    async fn harness(online: bool, outcomes: Vec<MockOutcome>) -> Harness {
        let (base_url, captured, server) = start_mock_grade_server(outcomes).await;
        let store = Arc::new(MemoryQueueStore::new());
        let signal = Arc::new(ConnectivitySignal::new(online));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            GradeApiClient::new(&base_url),
        ));
        let auto = AutoSync::new(engine, signal.clone());
        Harness {
            auto,
            store,
            signal,
            captured,
            server,
        }
    }

    fn report_channel() -> (SyncCallback, mpsc::UnboundedReceiver<SyncReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SyncCallback = Arc::new(move |report| {
            let _ = tx.send(report);
        });
        (callback, rx)
    }

    async fn next_report(rx: &mut mpsc::UnboundedReceiver<SyncReport>) -> SyncReport {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("sync report within deadline")
            .expect("callback alive")
    }

    #[tokio::test]
    async fn reconnect_drains_the_queue() {
        let h = harness(false, vec![ok_response()]).await;
        h.store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");
        let (callback, mut rx) = report_channel();

        h.auto.start(Some(callback)).await;
        h.signal.set_online(true);

        let report = next_report(&mut rx).await;
        assert_eq!(report.synced, 1);
        assert_eq!(h.store.pending_count().await.expect("count"), 0);

        h.auto.stop().await;
        h.server.abort();
    }

    #[tokio::test]
    async fn starting_while_online_syncs_immediately() {
        let h = harness(true, vec![ok_response()]).await;
        h.store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");
        let (callback, mut rx) = report_channel();

        h.auto.start(Some(callback)).await;

        let report = next_report(&mut rx).await;
        assert_eq!(report.synced, 1);
        assert_eq!(h.store.pending_count().await.expect("count"), 0);

        h.auto.stop().await;
        h.server.abort();
    }

    #[tokio::test]
    async fn large_backlogs_route_to_the_batch_endpoint() {
        let store = Arc::new(MemoryQueueStore::new());
        let mut ids = Vec::new();
        for index in 0..6 {
            let id = store
                .enqueue(
                    MutationKind::Create,
                    payload(&format!("s{}", index + 1), 10.0 + index as f64),
                )
                .await
                .expect("enqueue");
            ids.push(id);
        }
        let results: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"_queueId": id, "success": true}))
            .collect();
        let body = serde_json::json!({ "results": results }).to_string();

        let (base_url, captured, server) = start_mock_grade_server(vec![MockOutcome::Respond {
            status: 200,
            body,
            delay_ms: 0,
        }])
        .await;
        let signal = Arc::new(ConnectivitySignal::new(false));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            GradeApiClient::new(&base_url),
        ));
        let auto = AutoSync::new(engine, signal.clone());
        let (callback, mut rx) = report_channel();

        auto.start(Some(callback)).await;
        signal.set_online(true);

        let report = next_report(&mut rx).await;
        assert_eq!(report.synced, 6);
        assert_eq!(store.pending_count().await.expect("count"), 0);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/grades/sync");

        auto.stop().await;
        server.abort();
    }

    #[tokio::test]
    async fn empty_queue_reconnect_sends_nothing() {
        let h = harness(false, Vec::new()).await;
        let (callback, mut rx) = report_channel();

        h.auto.start(Some(callback)).await;
        h.signal.set_online(true);

        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err(),
            "no pass expected for an empty queue"
        );
        assert!(h.captured.lock().await.is_empty());

        h.auto.stop().await;
        h.server.abort();
    }

    #[tokio::test]
    async fn only_online_transitions_trigger_a_pass() {
        let h = harness(true, vec![ok_response()]).await;
        let (callback, mut rx) = report_channel();
        h.auto.start(Some(callback)).await;

        h.store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");
        h.signal.set_online(false);

        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err(),
            "offline transition must not sync"
        );
        assert_eq!(h.store.pending_count().await.expect("count"), 1);

        h.signal.set_online(true);
        let report = next_report(&mut rx).await;
        assert_eq!(report.synced, 1);

        h.auto.stop().await;
        h.server.abort();
    }

    #[tokio::test]
    async fn start_replaces_the_previous_listener() {
        let h = harness(false, vec![ok_response()]).await;
        h.store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");
        let (first_callback, mut first_rx) = report_channel();
        let (second_callback, mut second_rx) = report_channel();

        // Keep a clone in test scope so the report channel stays open after
        // the replaced listener drops its copy; recv() must pend, not close.
        h.auto.start(Some(first_callback.clone())).await;
        h.auto.start(Some(second_callback)).await;
        h.signal.set_online(true);

        let report = next_report(&mut second_rx).await;
        assert_eq!(report.synced, 1);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), first_rx.recv())
                .await
                .is_err(),
            "replaced listener must not fire"
        );

        h.auto.stop().await;
        h.server.abort();
    }

    #[tokio::test]
    async fn stop_detaches_the_listener() {
        let h = harness(false, vec![ok_response()]).await;
        h.store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");
        let (callback, mut rx) = report_channel();

        // Keep a clone in test scope so the report channel stays open after
        // the stopped listener drops its copy; recv() must pend, not close.
        h.auto.start(Some(callback.clone())).await;
        h.auto.stop().await;
        h.signal.set_online(true);

        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err(),
            "stopped listener must not sync"
        );
        assert_eq!(h.store.pending_count().await.expect("count"), 1);
        assert!(h.captured.lock().await.is_empty());

        h.server.abort();
    }

    #[tokio::test]
    async fn stop_waits_for_the_in_flight_pass() {
        let h = harness(
            true,
            vec![MockOutcome::Respond {
                status: 201,
                body: r#"{"id":"grade-1"}"#.to_string(),
                delay_ms: 400,
            }],
        )
        .await;
        let id = h
            .store
            .enqueue(MutationKind::Create, payload("s1", 15.0))
            .await
            .expect("enqueue");

        h.auto.start(None).await;
        // Give the immediate pass time to put its request on the wire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.auto.stop().await;

        // The pass ran to completion: the grade was submitted and removed,
        // not left behind in the syncing state.
        assert!(h.store.get(&id).await.expect("get").is_none());
        assert_eq!(h.store.pending_count().await.expect("count"), 0);
        assert!(h.store.list_errors().await.expect("list").is_empty());
        assert_eq!(h.captured.lock().await.len(), 1);

        h.server.abort();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let h = harness(false, Vec::new()).await;
        h.auto.stop().await;
        h.server.abort();
    }
}
