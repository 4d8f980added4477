//! Rust library for controlling Yeelight Wi-Fi bulbs over the LAN protocol
//!
//! This library provides an async client for the Yeelight LAN control
//! protocol: SSDP-style UDP discovery plus a line-delimited JSON command
//! protocol over TCP. It supports:
//!
//! - Bulb discovery via multicast search (or unicast to a known IP)
//! - Commands with request/response correlation over one long-lived
//!   connection, safe for concurrent callers
//! - A push notification stream for unsolicited state changes, with
//!   explicit cancellation
//! - Typed helpers for power, brightness, color and color flows
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use yeelight_lan::Yeelight;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find a bulb on the local network and connect to it
//!     let bulb = Yeelight::from_discovery(Duration::from_secs(3)).await?;
//!     println!("Connected to {}", bulb.address());
//!
//!     bulb.turn_on().await?;
//!     bulb.set_brightness(60).await?;
//!
//!     // Watch for state changes pushed by the bulb
//!     let (mut notifications, mut cancel) = bulb.listen().await?;
//!     if let Ok(n) = notifications.recv().await {
//!         println!("State changed: {:?}", n.params);
//!     }
//!     cancel.cancel_and_wait().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: single-shot UDP search on the well-known multicast group
//! - **Client**: the [`Yeelight`] facade with typed operations
//! - **Connection**: the long-lived TCP connection, request-id correlation
//!   and the notification read loop
//! - **Protocol**: JSON line message structures
//! - **Types**: domain values (effects, colors, flows)

mod client;
mod connection;
mod discovery;
mod error;
mod protocol;
mod subscription;
mod types;

// Public exports
pub use client::{Yeelight, YeelightConfig};
pub use connection::{CancelHandle, Connection};
pub use discovery::{discover, discover_at, DeviceAddress, COMMAND_PORT};
pub use error::{Result, YeelightError};
pub use protocol::{ErrorInfo, Notification, Request, Response};
pub use subscription::NotificationReceiver;
pub use types::{
    Effect, Flow, FlowAction, FlowMode, FlowTransition, Mode, Power, PropsResult, Rgb,
};
