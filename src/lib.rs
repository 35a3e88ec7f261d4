//! cardata: BMW CarData credentials and telemetry streaming
//!
//! Obtains and refreshes CarData credentials through the OAuth device
//! authorization grant, and multiplexes one MQTT connection so many
//! subscribers can follow per-vehicle event streams.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cardata::{CardataConfig, Client, VehicleKey};
//!
//! # async fn example() -> cardata::Result<()> {
//! let config = CardataConfig::from_env();
//! let client = Client::from_config(
//!     &config,
//!     Arc::new(|prompt| println!("Visit {} and enter {}", prompt.verification_uri, prompt.user_code)),
//! )?;
//!
//! client
//!     .subscribe(VehicleKey::AnyVehicle, |message| {
//!         println!("{}: {} data points", message.vin, message.data.len());
//!     })
//!     .await?;
//! client.start_event_stream().await?;
//! client.done().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod stream;

#[cfg(feature = "cli")]
pub mod cli;

pub use auth::{AuthError, AuthenticatedSession, Authenticator, SessionProvider};
pub use client::Client;
pub use config::CardataConfig;
pub use error::{CardataError, Result};
pub use stream::{StreamError, StreamSettings, StreamedMessage, Subscription, VehicleKey};
