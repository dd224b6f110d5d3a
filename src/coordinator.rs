use crate::client::SecomatClient;
use crate::error::{RemoteResult, Result};
use crate::subscription::{StateReceiver, StateUpdate};
use crate::types::StateSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default interval between scheduled refreshes
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Where the coordinator stands with respect to its cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// No fetch has succeeded yet
    Uninitialized,
    /// The cached snapshot comes from the latest fetch
    Live,
    /// The latest fetch failed; the previous snapshot is still served
    Stale,
}

#[derive(Default)]
struct Cache {
    snapshot: Option<Arc<StateSnapshot>>,
    last_error: Option<String>,
}

/// State shared between the coordinator, its timer and spawned refreshes
struct Shared {
    client: Arc<SecomatClient>,
    cache: watch::Sender<Cache>,
    update_tx: broadcast::Sender<StateUpdate>,
}

impl Shared {
    async fn refresh(&self) -> RemoteResult<Arc<StateSnapshot>> {
        match self.client.fetch_state().await {
            Ok(state) => {
                let snapshot = Arc::new(state);
                // Completions replace the cache wholesale; the last one wins
                self.cache.send_modify(|cache| {
                    cache.snapshot = Some(snapshot.clone());
                    cache.last_error = None;
                });
                tracing::debug!("Secomat state refreshed");
                let _ = self.update_tx.send(StateUpdate::Refreshed(snapshot.clone()));
                Ok(snapshot)
            }
            Err(e) => {
                let message = format!("Error fetching Secomat data: {}", e);
                tracing::warn!("{}", message);
                self.cache.send_modify(|cache| cache.last_error = Some(message.clone()));
                let _ = self.update_tx.send(StateUpdate::RefreshFailed(message));
                Err(e)
            }
        }
    }
}

/// Keeps the single cached snapshot of one Secomat up to date
///
/// The snapshot is refreshed on a fixed interval while the coordinator is
/// running, and on demand through [`Coordinator::refresh_now`] or
/// [`Coordinator::request_refresh`]. Failed refreshes never clear the cache.
///
/// # Example
///
/// ```no_run
/// use secomat::{Coordinator, SecomatClient};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(SecomatClient::new("my-claim-token")?);
///     let mut coordinator = Coordinator::new(client);
///     coordinator.start().await?;
///
///     if let Some(state) = coordinator.current_snapshot() {
///         println!("State: {}", state.secomat_state_label());
///     }
///
///     coordinator.stop().await;
///     Ok(())
/// }
/// ```
pub struct Coordinator {
    shared: Arc<Shared>,
    interval: Duration,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Coordinator {
    /// Create a coordinator for a client; nothing is fetched until a refresh
    pub fn new(client: Arc<SecomatClient>) -> Self {
        let (cache, _) = watch::channel(Cache::default());
        let (update_tx, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Shared {
                client,
                cache,
                update_tx,
            }),
            interval: DEFAULT_SCAN_INTERVAL,
            stop_tx: None,
            task_handle: None,
        }
    }

    /// Set the interval between scheduled refreshes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Interval between scheduled refreshes
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Client used for every refresh
    pub fn client(&self) -> &Arc<SecomatClient> {
        &self.shared.client
    }

    /// Latest cached snapshot; never performs I/O
    pub fn current_snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.shared.cache.borrow().snapshot.clone()
    }

    /// Whether the cached snapshot is missing, current or stale
    pub fn status(&self) -> RefreshStatus {
        let cache = self.shared.cache.borrow();
        match (&cache.snapshot, &cache.last_error) {
            (None, _) => RefreshStatus::Uninitialized,
            (Some(_), None) => RefreshStatus::Live,
            (Some(_), Some(_)) => RefreshStatus::Stale,
        }
    }

    /// Message of the last failed refresh, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.shared.cache.borrow().last_error.clone()
    }

    /// Subscribe to refresh events
    pub fn subscribe_updates(&self) -> StateReceiver {
        StateReceiver::new(self.shared.update_tx.subscribe())
    }

    /// Fetch the state now and replace the cached snapshot
    ///
    /// On failure the cached snapshot is kept and the error is returned.
    pub async fn refresh_now(&self) -> RemoteResult<Arc<StateSnapshot>> {
        self.shared.refresh().await
    }

    /// Schedule a refresh without waiting for it
    ///
    /// Failures are only logged and published to subscribers.
    pub fn request_refresh(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let _ = shared.refresh().await;
        });
    }

    /// Whether the refresh timer is running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Perform the first refresh and start the refresh timer
    ///
    /// A failing first refresh aborts the start and is returned to the caller.
    /// If the coordinator is already running it is restarted.
    pub async fn start(&mut self) -> Result<()> {
        self.stop().await;

        self.shared.refresh().await?;

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx);

        let shared = self.shared.clone();
        let period = self.interval;
        tracing::info!("Refreshing Secomat state every {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Secomat refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Errors are already logged and published
                        let _ = shared.refresh().await;
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the refresh timer
    ///
    /// The cached snapshot stays readable after stopping.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.task_handle.take() {
            // Give it a moment to stop gracefully
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Secomat refresh task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RemoteError, SecomatError};
    use mockito::{Server, ServerGuard};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn coordinator_for(server: &ServerGuard) -> Coordinator {
        let client = SecomatClient::builder("test_token")
            .base_url(server.url())
            .https_only(false)
            .build()
            .unwrap();
        Coordinator::new(Arc::new(client))
    }

    async fn next_refresh(rx: &mut StateReceiver) -> StateUpdate {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no refresh event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_refresh_failure_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let mut coordinator = coordinator_for(&server);
        let result = coordinator.start().await;

        assert!(matches!(
            result,
            Err(SecomatError::Remote(RemoteError::Status(503)))
        ));
        assert!(!coordinator.is_running());
        assert!(coordinator.current_snapshot().is_none());
        assert_eq!(coordinator.status(), RefreshStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let mut server = Server::new_async().await;
        let coordinator = coordinator_for(&server);
        assert_eq!(coordinator.status(), RefreshStatus::Uninitialized);

        let ok = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"type": "STATE", "payload": {"serial_number": "SN1", "humidity": 55}}).to_string())
            .create_async()
            .await;
        coordinator.refresh_now().await.unwrap();
        assert_eq!(coordinator.status(), RefreshStatus::Live);
        ok.remove_async().await;

        let failing = server
            .mock("GET", "/")
            .with_status(500)
            .create_async()
            .await;
        assert!(coordinator.refresh_now().await.is_err());

        let snapshot = coordinator.current_snapshot().unwrap();
        assert_eq!(snapshot.humidity(), Some(55.0));
        assert_eq!(coordinator.status(), RefreshStatus::Stale);
        assert!(coordinator.last_error().unwrap().contains("500"));
        failing.remove_async().await;

        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1", "humidity": 61}).to_string())
            .create_async()
            .await;
        coordinator.refresh_now().await.unwrap();

        // Replaced wholesale, not merged
        let snapshot = coordinator.current_snapshot().unwrap();
        assert_eq!(snapshot.humidity(), Some(61.0));
        assert_eq!(snapshot.fields().len(), 2);
        assert_eq!(coordinator.status(), RefreshStatus::Live);
        assert!(coordinator.last_error().is_none());
    }

    #[tokio::test]
    async fn test_timer_refreshes_periodically() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1"}).to_string())
            .expect_at_least(3)
            .create_async()
            .await;

        let mut coordinator = coordinator_for(&server).with_interval(Duration::from_millis(50));
        let mut rx = coordinator.subscribe_updates();
        coordinator.start().await.unwrap();
        assert!(coordinator.is_running());

        for _ in 0..3 {
            assert!(matches!(next_refresh(&mut rx).await, StateUpdate::Refreshed(_)));
        }

        coordinator.stop().await;
        assert!(!coordinator.is_running());
        coordinator.stop().await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_refresh_publishes_new_snapshot() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1", "target_humidity_level": 1}).to_string())
            .create_async()
            .await;

        let mut coordinator = coordinator_for(&server).with_interval(Duration::from_secs(3600));
        coordinator.start().await.unwrap();
        first.remove_async().await;

        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1", "target_humidity_level": 2}).to_string())
            .create_async()
            .await;

        let mut rx = coordinator.subscribe_updates();
        coordinator.request_refresh();

        match next_refresh(&mut rx).await {
            StateUpdate::Refreshed(snapshot) => {
                assert_eq!(snapshot.target_humidity_level(), crate::HumidityLevel::ExtraDry)
            }
            other => panic!("unexpected update: {:?}", other),
        }
        assert_eq!(
            coordinator.current_snapshot().unwrap().target_humidity_level(),
            crate::HumidityLevel::ExtraDry
        );
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn test_background_failure_is_published() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1"}).to_string())
            .create_async()
            .await;

        let mut coordinator = coordinator_for(&server).with_interval(Duration::from_secs(3600));
        coordinator.start().await.unwrap();
        ok.remove_async().await;

        server
            .mock("GET", "/")
            .with_status(502)
            .create_async()
            .await;

        let mut rx = coordinator.subscribe_updates();
        coordinator.request_refresh();

        assert!(matches!(next_refresh(&mut rx).await, StateUpdate::RefreshFailed(_)));
        assert_eq!(
            coordinator.current_snapshot().unwrap().serial_number().as_deref(),
            Some("SN1")
        );
        assert_eq!(coordinator.status(), RefreshStatus::Stale);
        coordinator.stop().await;
    }

    /// Serve one state per request, the n-th request answered after `replies[n].0`
    async fn delayed_state_server(replies: Vec<(Duration, serde_json::Value)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let replies = Arc::new(replies);
        let served = Arc::new(AtomicUsize::new(0));

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let replies = replies.clone();
                let served = served.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let index = served.fetch_add(1, Ordering::SeqCst);
                    let Some((delay, body)) = replies.get(index).cloned() else {
                        return;
                    };
                    tokio::time::sleep(delay).await;

                    let body = body.to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_last_completion_wins() {
        let url = delayed_state_server(vec![
            (
                Duration::from_millis(400),
                json!({"type": "STATE", "payload": {"serial_number": "SN1", "humidity": 11}}),
            ),
            (
                Duration::from_millis(50),
                json!({"type": "STATE", "payload": {"serial_number": "SN1", "humidity": 22}}),
            ),
        ])
        .await;

        let client = SecomatClient::builder("test_token")
            .base_url(url)
            .https_only(false)
            .build()
            .unwrap();
        let coordinator = Coordinator::new(Arc::new(client));

        // The first refresh is answered last
        let (slow, fast) = tokio::join!(coordinator.refresh_now(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            coordinator.refresh_now().await
        });

        assert_eq!(slow.unwrap().humidity(), Some(11.0));
        assert_eq!(fast.unwrap().humidity(), Some(22.0));
        assert_eq!(
            coordinator.current_snapshot().unwrap().humidity(),
            Some(11.0)
        );
        assert_eq!(coordinator.status(), RefreshStatus::Live);
    }
}
