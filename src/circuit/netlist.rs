//! Netlist structure and builder.

use std::collections::HashMap;

use super::types::{BranchId, ElementId, NodeId, StampNodes, VarIndex};
use crate::components::ComponentType;
use crate::error::{PowerSimError, Result};

/// One element instance of the netlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub kind: ComponentType,
    /// [x, y] terminals; positive direction is x to y
    pub nodes: [NodeId; 2],
    /// Branch-current unknown for voltage-source-like elements
    pub branch: Option<BranchId>,
    /// Positional parameter vector, decoded by the element's stamper
    pub parameters: Vec<f64>,
}

/// Read-only topology view consumed by the kernel.
#[derive(Debug, Clone)]
pub struct Netlist {
    elements: Vec<Element>,
    node_map: HashMap<String, NodeId>,
    node_names: Vec<String>,
    /// Number of nodes (including ground)
    num_nodes: usize,
    /// Number of branch current variables
    num_branches: usize,
}

impl Netlist {
    /// Start building a netlist.
    pub fn builder() -> NetlistBuilder {
        NetlistBuilder::new()
    }

    /// All elements in insertion order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Look up an element.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id.0)
    }

    /// Find an element by name.
    pub fn find_element(&self, name: &str) -> Option<ElementId> {
        self.elements.iter().position(|e| e.name == name).map(ElementId)
    }

    /// Find an element by name, failing if absent.
    pub fn element_id(&self, name: &str) -> Result<ElementId> {
        self.find_element(name).ok_or_else(|| PowerSimError::ElementNotFound {
            name: name.to_string(),
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the netlist has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of nodes including ground.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of voltage-source-like elements (auxiliary branch unknowns).
    pub fn num_branches(&self) -> usize {
        self.num_branches
    }

    /// Get the size of the MNA matrix.
    pub fn matrix_size(&self) -> usize {
        (self.num_nodes - 1) + self.num_branches
    }

    /// Get the matrix row for a node (None for ground).
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        VarIndex::Voltage(node).to_index(self.num_nodes)
    }

    /// Get the matrix row for a branch current.
    pub fn branch_index(&self, branch: BranchId) -> usize {
        (self.num_nodes - 1) + branch.0
    }

    /// Find a node by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_map.get(name).copied()
    }

    /// Get the name of a node.
    pub fn node_name(&self, node: NodeId) -> &str {
        self.node_names
            .get(node.0)
            .map(|s| s.as_str())
            .unwrap_or("?")
    }

    /// Matrix rows for one element.
    pub fn stamp_nodes(&self, element: &Element) -> StampNodes {
        let x = self.node_index(element.nodes[0]);
        let y = self.node_index(element.nodes[1]);
        match element.branch {
            Some(branch) => StampNodes::with_branch(x, y, self.branch_index(branch)),
            None => StampNodes::two_terminal(x, y),
        }
    }
}

/// Incremental netlist construction.
///
/// Nodes are created on first reference by name; `"0"` and `"GND"` both
/// resolve to ground. Branch unknowns are assigned in element order to
/// every voltage-source-like element.
#[derive(Debug)]
pub struct NetlistBuilder {
    elements: Vec<Element>,
    node_map: HashMap<String, NodeId>,
    node_names: Vec<String>,
    num_branches: usize,
}

impl Default for NetlistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlistBuilder {
    pub fn new() -> Self {
        let mut node_map = HashMap::new();
        node_map.insert("0".to_string(), NodeId::GROUND);
        node_map.insert("GND".to_string(), NodeId::GROUND);
        Self {
            elements: Vec::new(),
            node_map,
            node_names: vec!["0".to_string()],
            num_branches: 0,
        }
    }

    /// Get or create a node by name.
    pub fn node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.node_map.get(name) {
            return id;
        }
        let id = NodeId(self.node_names.len());
        self.node_map.insert(name.to_string(), id);
        self.node_names.push(name.to_string());
        id
    }

    /// Add an element between two named nodes.
    pub fn element(
        &mut self,
        name: &str,
        kind: ComponentType,
        x: &str,
        y: &str,
        parameters: &[f64],
    ) -> Result<ElementId> {
        let nodes = [self.node(x), self.node(y)];
        self.element_at(name, kind, nodes, parameters)
    }

    /// Add an element between two node ids.
    pub fn element_at(
        &mut self,
        name: &str,
        kind: ComponentType,
        nodes: [NodeId; 2],
        parameters: &[f64],
    ) -> Result<ElementId> {
        if self.elements.iter().any(|e| e.name == name) {
            return Err(PowerSimError::DuplicateElement {
                name: name.to_string(),
            });
        }
        let num_nodes = self.node_names.len();
        if let Some(bad) = nodes.iter().find(|n| n.0 >= num_nodes) {
            return Err(PowerSimError::NodeOutOfRange {
                element: name.to_string(),
                node: bad.0,
                num_nodes,
            });
        }

        let branch = if kind.needs_branch() {
            let branch = BranchId(self.num_branches);
            self.num_branches += 1;
            Some(branch)
        } else {
            None
        };

        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            name: name.to_string(),
            kind,
            nodes,
            branch,
            parameters: parameters.to_vec(),
        });
        Ok(id)
    }

    /// Finish the netlist.
    pub fn build(self) -> Result<Netlist> {
        if self.elements.is_empty() {
            return Err(PowerSimError::invalid_topology("netlist has no elements"));
        }
        let num_nodes = self.node_names.len();
        if num_nodes < 2 {
            return Err(PowerSimError::invalid_topology(
                "netlist has no node besides ground",
            ));
        }
        Ok(Netlist {
            elements: self.elements,
            node_map: self.node_map,
            node_names: self.node_names,
            num_nodes,
            num_branches: self.num_branches,
        })
    }
}
