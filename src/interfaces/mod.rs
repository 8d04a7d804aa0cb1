//! Interfaces between `EVCont` and its users.

use anyhow;

pub mod cli;
pub mod input;

/// Trait for handling a section of the input file.
pub trait InputHandle {
    /// Handles the input section and runs appropriate calculations.
    fn handle(&self) -> Result<(), anyhow::Error>;
}
