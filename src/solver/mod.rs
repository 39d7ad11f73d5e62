//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for transient simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = b where:
//! - x contains node voltages and branch currents
//! - A is the conductance/coefficient matrix
//! - b is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is 0 for ideal voltage sources
//! - v is the vector of node voltages
//! - j is the vector of voltage source currents
//! - i is the sum of current sources and history currents into each node
//! - e is the vector of voltage source values
//!
//! ## Switching
//!
//! Power devices are piecewise-linear: each is a small or a large resistance
//! depending on its state. A step is solved repeatedly at a frozen time until
//! no device changes state, bounded by
//! [`SimulationConfig::max_switch_iterations`].

mod builder;
mod integration;
mod kernel;
mod mna;

pub use builder::SystemMatrixBuilder;
pub use integration::{ElementHistory, SolverContext, SolverType, MAX_HISTORY_DEPTH};
pub use kernel::{SimulationConfig, SimulationKernel, SimulationSnapshot, SimulationStatus};
pub use mna::MnaMatrix;

/// Default bound on re-solves per step.
pub const DEFAULT_MAX_SWITCH_ITERATIONS: usize = 100;
