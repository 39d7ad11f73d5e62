//! Error types for the simulation kernel.
//!
//! All fallible operations return [`PowerSimError`]. Configuration problems
//! surface while a netlist is being built or a kernel is being initialized;
//! numerical failures surface from [`SimulationKernel::step`].
//!
//! [`SimulationKernel::step`]: crate::solver::SimulationKernel::step

use thiserror::Error;

use crate::components::ComponentType;
use crate::solver::SimulationStatus;

/// Result type alias using [`PowerSimError`].
pub type Result<T> = std::result::Result<T, PowerSimError>;

/// Unified error type for all kernel operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PowerSimError {
    // ============ Configuration Errors ============
    /// No stamper is registered for a component type
    #[error("No stamper registered for component type '{component_type}'")]
    UnregisteredStamper { component_type: ComponentType },

    /// Malformed parameter vector
    #[error("Invalid parameters for element '{element}': {message}")]
    InvalidParameter { element: String, message: String },

    /// Legacy solver index outside the known set
    #[error("Invalid solver index {index} (expected 0, 1 or 2)")]
    InvalidSolverIndex { index: i64 },

    /// Legacy component index outside the known set
    #[error("Invalid component type index {index}")]
    InvalidComponentIndex { index: i64 },

    /// Step width that cannot drive the integration
    #[error("Invalid time step {dt:e}: must be finite and positive")]
    InvalidTimeStep { dt: f64 },

    /// Element terminal refers to a node that does not exist
    #[error("Element '{element}' refers to node {node}, but the netlist has {num_nodes} nodes")]
    NodeOutOfRange {
        element: String,
        node: usize,
        num_nodes: usize,
    },

    /// Two elements share a name
    #[error("Duplicate element name '{name}'")]
    DuplicateElement { name: String },

    /// Element lookup failed
    #[error("Element '{name}' not found in netlist")]
    ElementNotFound { name: String },

    /// Gate signal sent to an element without a gate
    #[error("Element '{element}' is not gate-controlled")]
    NotGateControlled { element: String },

    /// Invalid netlist topology
    #[error("Invalid netlist topology: {message}")]
    InvalidTopology { message: String },

    // ============ Lifecycle Errors ============
    /// Kernel or matrix builder used before initialization
    #[error("Simulation has not been initialized")]
    NotInitialized,

    /// Operation not allowed in the current status
    #[error("Cannot {operation} while simulation is {status}")]
    InvalidStatus {
        status: SimulationStatus,
        operation: &'static str,
    },

    /// Next step would pass the configured end time
    #[error("End time {t_end:e} s reached (current time {time:e} s)")]
    EndTimeReached { time: f64, t_end: f64 },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - netlist may contain a floating node or a voltage source loop")]
    SingularMatrix,

    /// Switch states kept changing at a frozen time
    #[error("Switch states did not settle after {iterations} iterations at t = {time:e} s")]
    SwitchingNonConvergence { time: f64, iterations: usize },
}

impl PowerSimError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            element: element.into(),
            message: message.into(),
        }
    }

    /// Create an invalid topology error
    pub fn invalid_topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create a status error
    pub fn invalid_status(status: SimulationStatus, operation: &'static str) -> Self {
        Self::InvalidStatus { status, operation }
    }

    /// True for errors that can only be fixed by changing the netlist or setup.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredStamper { .. }
                | Self::InvalidParameter { .. }
                | Self::InvalidSolverIndex { .. }
                | Self::InvalidComponentIndex { .. }
                | Self::InvalidTimeStep { .. }
                | Self::NodeOutOfRange { .. }
                | Self::DuplicateElement { .. }
                | Self::ElementNotFound { .. }
                | Self::NotGateControlled { .. }
                | Self::InvalidTopology { .. }
        )
    }
}
