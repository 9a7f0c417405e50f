pub mod backup;
pub mod config;
pub mod constants;
pub mod database;
pub mod db;
pub mod error;
pub mod remote;
pub mod scheduler;
pub mod secrets;

pub use error::{KeeperError, Result};
