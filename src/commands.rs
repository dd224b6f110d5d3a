use crate::client::SecomatClient;
use crate::error::RemoteResult;
use crate::protocol::command;
use crate::types::HumidityLevel;
use serde_json::{json, Map, Value};

// ========== Command Façade ==========
//
// Each operation only sends its command. `Ok(false)` means the API answered
// but did not accept the command; no operation waits for a state change.

impl SecomatClient {
    /// Turn the Secomat off
    pub async fn turn_off(&self) -> RemoteResult<bool> {
        self.send_command(command::OFF, None).await
    }

    /// Start the automatic laundry drying program
    pub async fn start_laundry_drying(&self) -> RemoteResult<bool> {
        self.send_command(command::WASH_AUTO, None).await
    }

    /// Start room drying
    pub async fn start_room_drying(&self) -> RemoteResult<bool> {
        self.send_command(command::ROOM_ON, None).await
    }

    /// Stop room drying
    pub async fn stop_room_drying(&self) -> RemoteResult<bool> {
        self.send_command(command::ROOM_OFF, None).await
    }

    /// Set the target humidity level
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use secomat::{HumidityLevel, SecomatClient};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = SecomatClient::new("my-claim-token")?;
    /// client.set_target_humidity(HumidityLevel::ExtraDry).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_target_humidity(&self, level: HumidityLevel) -> RemoteResult<bool> {
        self.send_command(command::SET_TARGET_HUMIDITY, Some(level_args(level)))
            .await
    }
}

fn level_args(level: HumidityLevel) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("level".to_string(), json!(level.code()));
    args
}
