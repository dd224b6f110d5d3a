//! Rust library for polling and controlling Krüger Secomat dryers
//!
//! This library provides an async API for the Secomat cloud service. It supports:
//!
//! - Reading the device state (temperature, humidity, program state, firmware)
//! - Starting and stopping laundry and room drying programs
//! - Setting the target humidity level
//! - A coordinator that refreshes a cached state snapshot on a fixed interval
//! - Refresh event subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use secomat::{HumidityLevel, Secomat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Validate the claim token, fetch the first state and start refreshing
//!     let secomat = Secomat::start("my-claim-token").await?;
//!
//!     if let Some(state) = secomat.snapshot() {
//!         println!("Humidity: {:?}%", state.humidity());
//!         println!("State: {}", state.secomat_state_label());
//!     }
//!
//!     // Commands trigger a background refresh
//!     secomat.set_target_humidity(HumidityLevel::ExtraDry).await?;
//!
//!     let mut updates = secomat.subscribe_updates();
//!     if let Ok(update) = updates.recv().await {
//!         println!("Update: {:?}", update);
//!     }
//!
//!     secomat.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Direct Client Use
//!
//! The client can be used on its own, without any caching:
//!
//! ```no_run
//! use secomat::SecomatClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SecomatClient::new("my-claim-token")?;
//!     let state = client.fetch_state().await?;
//!     println!("Serial: {:?}", state.serial_number());
//!
//!     let accepted = client.start_room_drying().await?;
//!     println!("Accepted: {}", accepted);
//!
//!     client.release().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Secomat**: host handle tying a client and a coordinator together
//! - **Coordinator**: periodic and on-demand refresh of the cached snapshot
//! - **Client**: authenticated HTTP exchanges with the cloud endpoint, plus
//!   named command operations
//! - **Protocol**: JSON message structures and the fixed endpoint
//! - **Types**: the state snapshot and its code tables

mod client;
mod commands;
mod coordinator;
mod device;
mod error;
pub mod protocol;
mod subscription;
mod types;

// Public exports
pub use client::{ClientBuilder, SecomatClient, REQUEST_TIMEOUT};
pub use coordinator::{Coordinator, RefreshStatus, DEFAULT_SCAN_INTERVAL};
pub use device::Secomat;
pub use error::{RemoteError, RemoteResult, Result, SecomatError};
pub use protocol::CommandRequest;
pub use subscription::{StateReceiver, StateUpdate};
pub use types::{DeviceInfo, HumidityLevel, OperatingMode, SecomatState, StateSnapshot};
