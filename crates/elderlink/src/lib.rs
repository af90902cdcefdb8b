pub mod client;
pub mod days;
pub mod payloads;
pub mod protocol;
pub mod wire;

/// Relay endpoint used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8080";
