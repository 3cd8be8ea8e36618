//! chatline: direct-messaging backend with live presence and message push.
//!
//! The core is the [`presence::PresenceRegistry`], the [`store::MessageStore`]
//! and the [`delivery::DeliveryPipeline`] that joins them; [`server`] exposes
//! them over HTTP and a WebSocket live channel.

pub mod assets;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod logging;
pub mod presence;
pub mod server;
pub mod storage;
pub mod store;
pub mod types;
