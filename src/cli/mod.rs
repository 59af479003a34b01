pub mod args;
pub mod helpers;

pub use args::{Cli, Commands, DrainArgs, SimulateArgs};
pub use helpers::{run_drain, run_simulation, SimulationReport};
