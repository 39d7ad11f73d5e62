//! Core index types for netlist representation.

use std::fmt;

/// A node in the netlist.
/// Node 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// Position of an element in its netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Index of an extra branch-current unknown (voltage-source-like elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Variable index in the MNA solution vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarIndex {
    /// Node voltage variable
    Voltage(NodeId),
    /// Branch current variable
    Current(BranchId),
}

impl VarIndex {
    /// Raw index into the solution vector, or `None` for ground.
    /// Node voltages come first (excluding ground), then branch currents.
    pub fn to_index(&self, num_nodes: usize) -> Option<usize> {
        match self {
            VarIndex::Voltage(node) if node.is_ground() => None,
            VarIndex::Voltage(NodeId(n)) => Some(n - 1),
            VarIndex::Current(BranchId(b)) => Some((num_nodes - 1) + b),
        }
    }
}

/// Matrix rows handed to a stamper for one element.
///
/// `x` and `y` are the element terminals, `z` the branch-current row of
/// voltage-source-like elements. Ground terminals are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StampNodes {
    pub x: Option<usize>,
    pub y: Option<usize>,
    pub z: Option<usize>,
}

impl StampNodes {
    /// Two-terminal element without a branch unknown.
    pub fn two_terminal(x: Option<usize>, y: Option<usize>) -> Self {
        Self { x, y, z: None }
    }

    /// Element with an auxiliary branch row.
    pub fn with_branch(x: Option<usize>, y: Option<usize>, z: usize) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Voltage across the element (`Vx - Vy`) in a solution vector.
    pub fn voltage_across(&self, solution: &[f64]) -> f64 {
        let v = |row: Option<usize>| row.map_or(0.0, |i| solution[i]);
        v(self.x) - v(self.y)
    }
}
