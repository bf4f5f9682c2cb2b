pub mod cli;
pub mod audio;
pub mod config;
pub mod error;
pub mod models;
pub mod logging;
pub mod error_recovery;


pub use error::*;
pub use models::*;
