//! Linear passive stampers: Resistor, Capacitor, Inductor.

use super::{
    clamp_resistance, slot_or, Stamper, MIN_CAPACITANCE, MIN_INDUCTANCE, MIN_RESISTANCE,
};
use crate::circuit::StampNodes;
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// Decoded resistor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResistorParams {
    pub resistance: f64,
}

/// Stamps `G = 1/R` between the terminals.
#[derive(Debug, Clone)]
pub struct ResistorStamper {
    default_resistance: f64,
}

impl Default for ResistorStamper {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ResistorStamper {
    pub fn new(default_resistance: f64) -> Self {
        Self { default_resistance }
    }

    pub fn decode(&self, params: &[f64]) -> ResistorParams {
        ResistorParams {
            resistance: slot_or(params, 0, self.default_resistance),
        }
    }
}

impl Stamper for ResistorStamper {
    fn name(&self) -> &'static str {
        "resistor"
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    ) {
        let g = self.admittance_weight(self.decode(params).resistance, ctx);
        matrix.stamp_conductance(nodes.x, nodes.y, g);
    }

    fn stamp_vector_b(
        &self,
        _matrix: &mut MnaMatrix,
        _nodes: &StampNodes,
        _params: &[f64],
        _ctx: &SolverContext,
        _time: f64,
        _history: &ElementHistory,
    ) {
    }

    fn calculate_current(
        &self,
        vx: f64,
        vy: f64,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        _history: &ElementHistory,
    ) -> f64 {
        (vx - vy) * self.admittance_weight(self.decode(params).resistance, ctx)
    }

    fn admittance_weight(&self, value: f64, _ctx: &SolverContext) -> f64 {
        1.0 / clamp_resistance(value, MIN_RESISTANCE)
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(self.clone())
    }
}

/// Decoded capacitor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitorParams {
    pub capacitance: f64,
    /// Voltage x to y at the start of the simulation (slot 1)
    pub initial_voltage: f64,
}

/// Capacitor companion model under the active integration scheme.
#[derive(Debug, Clone)]
pub struct CapacitorStamper {
    default_capacitance: f64,
}

impl Default for CapacitorStamper {
    fn default() -> Self {
        Self::new(1e-6)
    }
}

impl CapacitorStamper {
    pub fn new(default_capacitance: f64) -> Self {
        Self {
            default_capacitance,
        }
    }

    /// Decode parameters; the capacitance is clamped to [`MIN_CAPACITANCE`].
    pub fn decode(&self, params: &[f64]) -> CapacitorParams {
        CapacitorParams {
            capacitance: slot_or(params, 0, self.default_capacitance).max(MIN_CAPACITANCE),
            initial_voltage: slot_or(params, 1, 0.0),
        }
    }

    fn history_current(&self, params: &[f64], ctx: &SolverContext, history: &ElementHistory) -> f64 {
        ctx.capacitor_history(self.decode(params).capacitance, history)
    }
}

impl Stamper for CapacitorStamper {
    fn name(&self) -> &'static str {
        "capacitor"
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    ) {
        let g = self.admittance_weight(self.decode(params).capacitance, ctx);
        matrix.stamp_conductance(nodes.x, nodes.y, g);
    }

    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        history: &ElementHistory,
    ) {
        let h = self.history_current(params, ctx, history);
        matrix.stamp_current_injection(nodes.x, nodes.y, h);
    }

    fn calculate_current(
        &self,
        vx: f64,
        vy: f64,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        history: &ElementHistory,
    ) -> f64 {
        let g = self.admittance_weight(self.decode(params).capacitance, ctx);
        g * (vx - vy) - self.history_current(params, ctx, history)
    }

    fn admittance_weight(&self, value: f64, ctx: &SolverContext) -> f64 {
        ctx.capacitor_conductance(value.max(MIN_CAPACITANCE))
    }

    fn initial_voltage(&self, params: &[f64]) -> f64 {
        self.decode(params).initial_voltage
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(self.clone())
    }
}

/// Decoded inductor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InductorParams {
    pub inductance: f64,
    pub initial_current: f64,
}

/// Inductor companion model: a conductance plus a history current, so no
/// branch unknown is needed.
#[derive(Debug, Clone)]
pub struct InductorStamper {
    default_inductance: f64,
}

impl Default for InductorStamper {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

impl InductorStamper {
    pub fn new(default_inductance: f64) -> Self {
        Self { default_inductance }
    }

    /// Decode parameters; the inductance is clamped to [`MIN_INDUCTANCE`].
    pub fn decode(&self, params: &[f64]) -> InductorParams {
        InductorParams {
            inductance: slot_or(params, 0, self.default_inductance).max(MIN_INDUCTANCE),
            initial_current: slot_or(params, 1, 0.0),
        }
    }

    fn history_current(&self, params: &[f64], ctx: &SolverContext, history: &ElementHistory) -> f64 {
        ctx.inductor_history(self.decode(params).inductance, history)
    }
}

impl Stamper for InductorStamper {
    fn name(&self) -> &'static str {
        "inductor"
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    ) {
        let g = self.admittance_weight(self.decode(params).inductance, ctx);
        matrix.stamp_conductance(nodes.x, nodes.y, g);
    }

    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        history: &ElementHistory,
    ) {
        let h = self.history_current(params, ctx, history);
        matrix.stamp_current_injection(nodes.x, nodes.y, h);
    }

    fn calculate_current(
        &self,
        vx: f64,
        vy: f64,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        history: &ElementHistory,
    ) -> f64 {
        let g = self.admittance_weight(self.decode(params).inductance, ctx);
        g * (vx - vy) - self.history_current(params, ctx, history)
    }

    fn admittance_weight(&self, value: f64, ctx: &SolverContext) -> f64 {
        ctx.inductor_conductance(value.max(MIN_INDUCTANCE))
    }

    fn initial_current(&self, params: &[f64]) -> f64 {
        self.decode(params).initial_current
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(self.clone())
    }
}
