//! # PowerSim Core
//!
//! A fixed-step transient simulation kernel for power-electronic circuits.
//!
//! This library provides:
//! - Modified Nodal Analysis (MNA) with a dense LU solve
//! - Companion models for capacitors and inductors under backward-Euler,
//!   trapezoidal and Gear-Shichman integration
//! - Piecewise-linear switching devices (diode, switch, MOSFET, IGBT,
//!   thyristor) solved by iterating each step until their states settle
//! - Thermal and magnetic analogues stamped by the electrical primitives
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`circuit`] - Netlist representation, node indexing and validation
//! - [`components`] - Per-element stampers and the stamper registry
//! - [`solver`] - MNA assembly, integration schemes and the time-stepping kernel
//! - [`error`] - Error type shared by every module
//!
//! ## Usage
//!
//! ```no_run
//! use powersim_core::{ComponentType, Netlist, SimulationConfig, SimulationKernel};
//! use powersim_core::components::SourceParams;
//!
//! # fn main() -> powersim_core::Result<()> {
//! let mut b = Netlist::builder();
//! b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())?;
//! b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])?;
//! b.element("C1", ComponentType::Capacitor, "out", "0", &[1e-6])?;
//!
//! let mut kernel = SimulationKernel::new(SimulationConfig::new().with_timing(0.0, 1e-3, 1e-6));
//! kernel.initialize(b.build()?)?;
//! kernel.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Simulation Method
//!
//! For each time step the kernel:
//!
//! 1. Assembles the system matrix A and source vector b at `t + dt`
//! 2. Solves Ax = b for node voltages and branch currents
//! 3. Updates every switching device from the solution, repeating from 1
//!    while any of them changed state
//! 4. Recovers element currents and shifts the integration history

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::{Netlist, NetlistBuilder};
pub use components::{ComponentType, StamperRegistry};
pub use error::{PowerSimError, Result};
pub use solver::{SimulationConfig, SimulationKernel, SimulationStatus, SolverType};
