//! System matrix assembly and history bookkeeping.

use crate::circuit::{Netlist, StampNodes};
use crate::components::Stamper;
use crate::error::{PowerSimError, Result};

use super::integration::{ElementHistory, SolverContext, MAX_HISTORY_DEPTH};
use super::mna::MnaMatrix;

/// Accepted solutions with per-element voltages and currents, most recent
/// first.
#[derive(Debug, Clone)]
struct HistoryBuffers {
    nodes: Vec<StampNodes>,
    solutions: Vec<Vec<f64>>,
    voltages: Vec<Vec<f64>>,
    currents: Vec<Vec<f64>>,
}

impl HistoryBuffers {
    /// Every level starts from the initial conditions.
    fn new(
        depth: usize,
        initial_solution: Vec<f64>,
        nodes: Vec<StampNodes>,
        initial: InitialConditions,
    ) -> Self {
        Self {
            nodes,
            solutions: vec![initial_solution; depth],
            voltages: vec![initial.voltages; depth],
            currents: vec![initial.currents; depth],
        }
    }

    /// Push one accepted step; the oldest entry falls off.
    fn shift(&mut self, solution: &[f64], currents: &[f64]) {
        self.solutions.rotate_right(1);
        self.solutions[0].copy_from_slice(solution);
        self.voltages.rotate_right(1);
        for (v, nodes) in self.voltages[0].iter_mut().zip(&self.nodes) {
            *v = nodes.voltage_across(solution);
        }
        self.currents.rotate_right(1);
        self.currents[0].copy_from_slice(currents);
    }
}

/// Per-element voltages and currents at `t_start`.
#[derive(Debug, Clone, Default)]
struct InitialConditions {
    voltages: Vec<f64>,
    currents: Vec<f64>,
}

impl InitialConditions {
    fn collect(netlist: &Netlist, stampers: &[Box<dyn Stamper>]) -> Self {
        let mut initial = Self::default();
        for (element, stamper) in netlist.elements().iter().zip(stampers) {
            initial.voltages.push(stamper.initial_voltage(&element.parameters));
            initial.currents.push(stamper.initial_current(&element.parameters));
        }
        initial
    }

    /// Node potentials implied by elements with one grounded terminal.
    /// Later elements win where two of them disagree.
    fn potentials(&self, nodes: &[StampNodes], size: usize) -> Vec<f64> {
        let mut solution = vec![0.0; size];
        for (n, &v0) in nodes.iter().zip(&self.voltages) {
            if v0 == 0.0 {
                continue;
            }
            match (n.x, n.y) {
                (Some(x), None) => solution[x] = v0,
                (None, Some(y)) => solution[y] = -v0,
                _ => {}
            }
        }
        solution
    }
}

/// Owns the MNA system for one netlist and the history it is stamped from.
#[derive(Debug, Clone)]
pub struct SystemMatrixBuilder {
    ctx: SolverContext,
    matrix: Option<MnaMatrix>,
    history: Option<HistoryBuffers>,
}

impl SystemMatrixBuilder {
    pub fn new(ctx: SolverContext) -> Self {
        Self {
            ctx,
            matrix: None,
            history: None,
        }
    }

    pub fn context(&self) -> &SolverContext {
        &self.ctx
    }

    pub fn is_initialized(&self) -> bool {
        self.matrix.is_some() && self.history.is_some()
    }

    /// Size the system for `netlist` and seed every history level from each
    /// stamper's initial voltage and current.
    pub fn initialize(&mut self, netlist: &Netlist, stampers: &[Box<dyn Stamper>]) -> Result<()> {
        if stampers.len() != netlist.len() {
            return Err(PowerSimError::invalid_topology(format!(
                "{} stampers for {} elements",
                stampers.len(),
                netlist.len()
            )));
        }
        let size = netlist.matrix_size();
        let nodes: Vec<StampNodes> = netlist
            .elements()
            .iter()
            .map(|element| netlist.stamp_nodes(element))
            .collect();
        let initial = InitialConditions::collect(netlist, stampers);
        let solution = initial.potentials(&nodes, size);

        self.matrix = Some(MnaMatrix::new(size));
        self.history = Some(HistoryBuffers::new(
            self.ctx.solver().history_depth(),
            solution,
            nodes,
            initial,
        ));
        Ok(())
    }

    /// Zero the system and stamp every element at `time`.
    pub fn assemble(
        &mut self,
        netlist: &Netlist,
        stampers: &[Box<dyn Stamper>],
        time: f64,
    ) -> Result<()> {
        let (matrix, history) = match (self.matrix.as_mut(), self.history.as_ref()) {
            (Some(m), Some(h)) => (m, h),
            _ => return Err(PowerSimError::NotInitialized),
        };
        matrix.clear();

        for (idx, (element, stamper)) in netlist.elements().iter().zip(stampers).enumerate() {
            let nodes = netlist.stamp_nodes(element);
            let past = history_of(history, idx);
            stamper.stamp_matrix_a(matrix, &nodes, &element.parameters, &self.ctx);
            stamper.stamp_vector_b(matrix, &nodes, &element.parameters, &self.ctx, time, &past);
        }
        Ok(())
    }

    /// Factor and solve the assembled system.
    pub fn solve(&mut self) -> Result<&[f64]> {
        self.matrix
            .as_mut()
            .ok_or(PowerSimError::NotInitialized)?
            .factor_and_solve()
    }

    /// Latest solution vector.
    pub fn solution(&self) -> Option<&[f64]> {
        self.matrix.as_ref().map(|m| m.x.as_slice())
    }

    /// Last accepted solution (`pALT`).
    pub fn previous_solution(&self) -> Option<&[f64]> {
        self.history
            .as_ref()
            .map(|h| h.solutions[0].as_slice())
    }

    pub fn matrix(&self) -> Option<&MnaMatrix> {
        self.matrix.as_ref()
    }

    /// Voltage across element `idx` in the latest solution.
    pub fn element_voltage(&self, netlist: &Netlist, idx: usize) -> Result<f64> {
        let solution = self.solution().ok_or(PowerSimError::NotInitialized)?;
        let element = element_at(netlist, idx)?;
        Ok(netlist.stamp_nodes(element).voltage_across(solution))
    }

    /// Accepted history of element `idx`.
    pub fn element_history(&self, netlist: &Netlist, idx: usize) -> Result<ElementHistory> {
        let history = self.history.as_ref().ok_or(PowerSimError::NotInitialized)?;
        element_at(netlist, idx)?;
        Ok(history_of(history, idx))
    }

    /// Accept a step: the given solution and element currents become the
    /// most recent history entry.
    pub fn shift_history(&mut self, solution: &[f64], currents: &[f64]) -> Result<()> {
        let history = self.history.as_mut().ok_or(PowerSimError::NotInitialized)?;
        if solution.len() != history.solutions[0].len() || currents.len() != history.nodes.len() {
            return Err(PowerSimError::invalid_topology(format!(
                "history shift with {} unknowns and {} currents, expected {} and {}",
                solution.len(),
                currents.len(),
                history.solutions[0].len(),
                history.nodes.len()
            )));
        }
        history.shift(solution, currents);
        Ok(())
    }
}

fn element_at(netlist: &Netlist, idx: usize) -> Result<&crate::circuit::Element> {
    netlist
        .elements()
        .get(idx)
        .ok_or_else(|| PowerSimError::ElementNotFound {
            name: format!("#{idx}"),
        })
}

fn history_of(history: &HistoryBuffers, idx: usize) -> ElementHistory {
    let mut past = ElementHistory::default();
    for k in 0..history.voltages.len().min(MAX_HISTORY_DEPTH) {
        past.voltages[k] = history.voltages[k][idx];
        past.currents[k] = history.currents[k][idx];
    }
    past
}
