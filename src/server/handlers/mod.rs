//! Route handler modules for the chatline HTTP API.

pub mod conversations;
pub mod health;
pub mod messages;
pub mod profile;
pub mod websocket;
