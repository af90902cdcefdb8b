pub mod alerts;
pub mod device;
pub mod error;
pub mod handler;
pub mod monitor;
pub mod notifier;
pub mod router;
pub mod shell;
pub mod socket;
