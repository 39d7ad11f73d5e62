//! IGBT: gate-controlled, unidirectional, with forward-voltage drop.

use super::switch::{
    gate_asserted, stamp_forward_drop, switch_current, THRESHOLD_ACCEPT, THRESHOLD_PERTURBATION,
};
use super::{clamp_resistance, Stamper, StatefulStamper, SwitchParams, SwitchState, MIN_SWITCH_RESISTANCE};
use crate::circuit::StampNodes;
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// IGBT stamper with per-element state.
///
/// Turns ON when the gate is asserted and the forward voltage exceeds
/// `0.99 * Uf`; turns OFF as soon as the gate drops or the forward voltage
/// collapses below that threshold.
#[derive(Debug, Clone)]
pub struct IgbtStamper {
    params: SwitchParams,
    state: SwitchState,
}

impl Default for IgbtStamper {
    fn default() -> Self {
        Self::new(1e-3, 1e9, 1.5)
    }
}

impl IgbtStamper {
    pub fn new(r_on: f64, r_off: f64, forward_voltage: f64) -> Self {
        Self {
            params: SwitchParams::new(r_on, r_off, forward_voltage),
            state: SwitchState::default(),
        }
    }

    fn decode(&self, params: &[f64]) -> SwitchParams {
        SwitchParams::decode(params, &self.params)
    }

    fn threshold(&self) -> f64 {
        THRESHOLD_PERTURBATION * self.params.forward_voltage
    }

    fn voltage_collapsed(&self, v: f64) -> bool {
        v < self.threshold() + THRESHOLD_ACCEPT
    }
}

impl Stamper for IgbtStamper {
    fn name(&self) -> &'static str {
        "igbt"
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    ) {
        let p = self.decode(params);
        let g = self.admittance_weight(p.resistance(self.state.is_on()), ctx);
        matrix.stamp_conductance(nodes.x, nodes.y, g);
    }

    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
        _time: f64,
        _history: &ElementHistory,
    ) {
        if self.state.is_on() {
            let p = self.decode(params);
            let g = self.admittance_weight(p.resistance(true), ctx);
            stamp_forward_drop(matrix, nodes, g, p.forward_voltage);
        }
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
        let p = self.decode(params);
        let on = self.state.is_on();
        let g = self.admittance_weight(p.resistance(on), ctx);
        switch_current(vx - vy, g, on, p.forward_voltage)
    }

    fn admittance_weight(&self, value: f64, _ctx: &SolverContext) -> f64 {
        1.0 / clamp_resistance(value, MIN_SWITCH_RESISTANCE)
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(Self {
            params: self.params,
            state: SwitchState::default(),
        })
    }

    fn as_stateful(&self) -> Option<&dyn StatefulStamper> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulStamper> {
        Some(self)
    }
}

impl StatefulStamper for IgbtStamper {
    /// Without a gate signal the IGBT can only turn OFF.
    fn update_state(&mut self, vx: f64, vy: f64, _current: f64, _time: f64) {
        if self.state.is_on() && self.voltage_collapsed(vx - vy) {
            self.state.set(false);
        } else {
            self.state.hold();
        }
    }

    fn update_state_with_gate(&mut self, gate: f64, vx: f64, vy: f64, _current: f64, _time: f64) {
        let v = vx - vy;
        let gate_on = gate_asserted(gate);
        let on = if self.state.is_on() {
            gate_on && !self.voltage_collapsed(v)
        } else {
            gate_on && v > self.threshold() - THRESHOLD_ACCEPT
        };
        self.state.set(on);
    }

    fn is_gate_controlled(&self) -> bool {
        true
    }

    fn is_state_changed(&self) -> bool {
        self.state.is_changed()
    }

    fn reset_state_change(&mut self) {
        self.state.reset_change();
    }

    fn is_on(&self) -> bool {
        self.state.is_on()
    }

    fn set_state(&mut self, on: bool) {
        self.state.set(on);
    }

    fn current_resistance(&self) -> f64 {
        self.params.resistance(self.state.is_on())
    }

    fn initialize_state(&mut self, params: &[f64]) {
        self.params = self.decode(params);
        self.state.set(self.params.initial_state().unwrap_or(false));
        self.state.reset_change();
    }
}
