//! Optimal sizing and scheduling of storage for renewable energy communities.
//!
//! The members of a community (meters) trade energy with their retailers and with each other
//! through a local pool. A single mixed-integer problem is solved for the whole community, giving
//! each meter's schedule, its share of the community's surplus and, optionally, how much new
//! generation and storage capacity to install. Pool prices are read from the duals of the market
//! clearing constraints.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod backpack;
pub mod cli;
pub mod clustering;
pub mod horizon;
pub mod id;
pub mod input;
pub mod log;
pub mod meter;
pub mod optimisation;
pub mod output;
pub mod outputs;
pub mod settings;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the folder where the program's configuration files are stored.
///
/// Falls back on the current folder if the platform has no configuration folder.
pub fn get_rec_sizing_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("rec_sizing");

    path
}
