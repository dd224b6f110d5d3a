use crate::client::SecomatClient;
use crate::coordinator::{Coordinator, RefreshStatus, DEFAULT_SCAN_INTERVAL};
use crate::error::{RemoteResult, Result, SecomatError};
use crate::subscription::StateReceiver;
use crate::types::{DeviceInfo, HumidityLevel, StateSnapshot};
use std::sync::Arc;
use std::time::Duration;

/// A running Secomat: a client plus the coordinator keeping its state fresh
///
/// Hosts read the cached snapshot and issue commands through this handle.
/// Every command that reaches the API triggers a background refresh so the
/// new state shows up before the next scheduled tick.
pub struct Secomat {
    coordinator: Coordinator,
    serial_number: String,
}

impl Secomat {
    /// Start observing the Secomat behind a claim token
    ///
    /// # Example
    ///
    /// ```no_run
    /// use secomat::{HumidityLevel, Secomat};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let secomat = Secomat::start("my-claim-token").await?;
    ///     println!("Connected to {}", secomat.device_info().name);
    ///
    ///     secomat.set_target_humidity(HumidityLevel::Dry).await?;
    ///     secomat.stop().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn start(claim_token: impl Into<String>) -> Result<Self> {
        let client = SecomatClient::new(claim_token)?;
        Self::start_with(client, DEFAULT_SCAN_INTERVAL).await
    }

    /// Start with a preconfigured client and refresh interval
    ///
    /// Fails with `InvalidCredential` if the token does not yield a device
    /// state, and with the remote error if the first refresh fails.
    pub async fn start_with(client: SecomatClient, interval: Duration) -> Result<Self> {
        if !client.validate_credential().await {
            client.release().await;
            return Err(SecomatError::InvalidCredential);
        }

        let client = Arc::new(client);
        let mut coordinator = Coordinator::new(client.clone()).with_interval(interval);
        if let Err(e) = coordinator.start().await {
            client.release().await;
            return Err(e);
        }

        let serial_number = coordinator
            .current_snapshot()
            .and_then(|s| s.serial_number())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!("Secomat {} set up", serial_number);

        Ok(Self {
            coordinator,
            serial_number,
        })
    }

    /// Stop refreshing and release the HTTP client
    pub async fn stop(mut self) {
        self.coordinator.stop().await;
        self.coordinator.client().release().await;
        tracing::info!("Secomat {} stopped", self.serial_number);
    }

    /// Serial number captured at setup, the stable device identifier
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Registry information built from the cached state
    pub fn device_info(&self) -> DeviceInfo {
        match self.snapshot() {
            Some(snapshot) => DeviceInfo::from_snapshot(&snapshot),
            None => DeviceInfo::from_snapshot(&StateSnapshot::default()),
        }
    }

    /// Latest cached state
    pub fn snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.coordinator.current_snapshot()
    }

    /// Whether the cached state is current or stale
    pub fn status(&self) -> RefreshStatus {
        self.coordinator.status()
    }

    /// Subscribe to refresh events
    pub fn subscribe_updates(&self) -> StateReceiver {
        self.coordinator.subscribe_updates()
    }

    /// Refresh now and wait for the result
    pub async fn refresh(&self) -> RemoteResult<Arc<StateSnapshot>> {
        self.coordinator.refresh_now().await
    }

    /// Coordinator owning the cached state
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Client used for refreshes and commands
    pub fn client(&self) -> &SecomatClient {
        self.coordinator.client()
    }

    /// Turn the Secomat off
    pub async fn turn_off(&self) -> RemoteResult<bool> {
        let result = self.client().turn_off().await;
        self.after_command("turn off Secomat", result)
    }

    /// Start the automatic laundry drying program
    pub async fn start_laundry_drying(&self) -> RemoteResult<bool> {
        let result = self.client().start_laundry_drying().await;
        self.after_command("turn on laundry drying", result)
    }

    /// Start room drying
    pub async fn start_room_drying(&self) -> RemoteResult<bool> {
        let result = self.client().start_room_drying().await;
        self.after_command("turn on room drying", result)
    }

    /// Stop room drying
    pub async fn stop_room_drying(&self) -> RemoteResult<bool> {
        let result = self.client().stop_room_drying().await;
        self.after_command("turn off room drying", result)
    }

    /// Set the target humidity level
    pub async fn set_target_humidity(&self, level: HumidityLevel) -> RemoteResult<bool> {
        let result = self.client().set_target_humidity(level).await;
        self.after_command("set target humidity", result)
    }

    /// Refresh after a command the API answered, log one that failed
    fn after_command(&self, action: &str, result: RemoteResult<bool>) -> RemoteResult<bool> {
        match result {
            Ok(accepted) => {
                if !accepted {
                    tracing::warn!("Secomat did not accept request to {}", action);
                }
                self.coordinator.request_refresh();
                Ok(accepted)
            }
            Err(e) => {
                tracing::error!("Failed to {}: {}", action, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::subscription::StateUpdate;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn test_client(server: &ServerGuard) -> SecomatClient {
        SecomatClient::builder("test_token")
            .base_url(server.url())
            .https_only(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_and_command_refresh() {
        let mut server = Server::new_async().await;
        let state = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(
                json!({"type": "STATE", "payload": {
                    "serial_number": "SN1",
                    "room_drying_enabled": 0,
                    "fw_version": "1.2.0"
                }})
                .to_string(),
            )
            .expect_at_least(3)
            .create_async()
            .await;
        let command = server
            .mock("POST", "/")
            .match_body(Matcher::Json(json!({"command": "PRG_ROOM_ON", "args": {}})))
            .with_status(200)
            .with_body(json!({"status": "OK"}).to_string())
            .create_async()
            .await;

        let secomat = Secomat::start_with(test_client(&server), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(secomat.serial_number(), "SN1");
        assert_eq!(secomat.device_info().name, "Secomat SN1");
        assert_eq!(secomat.status(), RefreshStatus::Live);

        let mut rx = secomat.subscribe_updates();
        assert!(secomat.start_room_drying().await.unwrap());

        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(update, StateUpdate::Refreshed(_)));

        secomat.stop().await;
        command.assert_async().await;
        state.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_credential() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(401)
            .create_async()
            .await;

        let result = Secomat::start_with(test_client(&server), DEFAULT_SCAN_INTERVAL).await;
        assert!(matches!(result, Err(SecomatError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_failed_command_skips_refresh() {
        let mut server = Server::new_async().await;
        let state = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(json!({"serial_number": "SN1"}).to_string())
            .expect(2)
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let secomat = Secomat::start_with(test_client(&server), Duration::from_secs(3600))
            .await
            .unwrap();
        let mut rx = secomat.subscribe_updates();

        let result = secomat.turn_off().await;
        assert!(matches!(result, Err(RemoteError::Status(500))));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().unwrap().is_none());

        secomat.stop().await;
        // Only setup fetched the state
        state.assert_async().await;
    }
}
