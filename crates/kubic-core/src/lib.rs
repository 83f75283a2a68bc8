pub mod config;
pub mod deployment;
pub mod error;
pub mod io;
pub mod kvfile;
pub mod master_init;
pub mod node_join;
pub mod probe;
pub mod reboot;
pub mod reset;
pub mod runner;
pub mod status;
pub mod tools;

pub use error::{KubicError, Result};
