pub mod alerts;
pub mod checkins;
pub mod contacts;
pub mod guardians;
pub mod identity;
pub mod medications;
pub mod profile;
pub mod state_dir;
mod table;
pub mod time;
pub mod transport;
