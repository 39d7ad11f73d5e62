//! Thyristor (SCR): latching switch with recovery hold-off.
//!
//! A gate trigger turns the thyristor ON while it is forward biased. Once ON
//! the gate has no further influence: it stays ON until its current reaches
//! zero, and every transition (ON to OFF or OFF to ON) requires the recovery
//! time to have elapsed since the last switch-off.

use super::switch::{
    gate_asserted, stamp_forward_drop, switch_current, THRESHOLD_ACCEPT, THRESHOLD_PERTURBATION,
};
use super::{clamp_resistance, Stamper, StatefulStamper, SwitchParams, SwitchState, MIN_SWITCH_RESISTANCE};
use crate::circuit::StampNodes;
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// Thyristor stamper with per-element state.
#[derive(Debug, Clone)]
pub struct ThyristorStamper {
    params: SwitchParams,
    state: SwitchState,
    last_switch_off_time: f64,
}

impl Default for ThyristorStamper {
    fn default() -> Self {
        Self::new(1e-3, 1e9, 1.5, 10e-6)
    }
}

impl ThyristorStamper {
    pub fn new(r_on: f64, r_off: f64, forward_voltage: f64, recovery_time: f64) -> Self {
        let params = SwitchParams::new(r_on, r_off, forward_voltage).with_recovery_time(recovery_time);
        Self {
            params,
            state: SwitchState::default(),
            last_switch_off_time: params.last_switch_off_time,
        }
    }

    pub fn recovery_time(&self) -> f64 {
        self.params.recovery_time
    }

    /// Time of the last ON to OFF transition (`-inf` if none).
    pub fn last_switch_off_time(&self) -> f64 {
        self.last_switch_off_time
    }

    /// One-shot gate pulse at `time`.
    pub fn fire_trigger(&mut self, vx: f64, vy: f64, time: f64) {
        self.update_state_with_gate(1.0, vx, vy, 0.0, time);
    }

    fn decode(&self, params: &[f64]) -> SwitchParams {
        SwitchParams::decode(params, &self.params)
    }

    fn recovered(&self, time: f64) -> bool {
        time - self.last_switch_off_time >= self.params.recovery_time
    }

    fn forward_biased(&self, v: f64) -> bool {
        v > THRESHOLD_PERTURBATION * self.params.forward_voltage - THRESHOLD_ACCEPT
    }

    /// Commutation: current at zero and recovery elapsed.
    fn try_turn_off(&mut self, current: f64, time: f64) {
        if current <= 0.0 && self.recovered(time) {
            self.last_switch_off_time = time;
            self.state.set(false);
        } else {
            self.state.hold();
        }
    }
}

impl Stamper for ThyristorStamper {
    fn name(&self) -> &'static str {
        "thyristor"
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
        Box::new(Self::new(
            self.params.r_on,
            self.params.r_off,
            self.params.forward_voltage,
            self.params.recovery_time,
        ))
    }

    fn as_stateful(&self) -> Option<&dyn StatefulStamper> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulStamper> {
        Some(self)
    }
}

impl StatefulStamper for ThyristorStamper {
    /// Without a gate trigger the thyristor can only commutate OFF.
    fn update_state(&mut self, _vx: f64, _vy: f64, current: f64, time: f64) {
        if self.state.is_on() {
            self.try_turn_off(current, time);
        } else {
            self.state.hold();
        }
    }

    fn update_state_with_gate(&mut self, gate: f64, vx: f64, vy: f64, current: f64, time: f64) {
        if self.state.is_on() {
            self.try_turn_off(current, time);
        } else {
            let fire = gate_asserted(gate) && self.forward_biased(vx - vy) && self.recovered(time);
            self.state.set(fire);
        }
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
        self.last_switch_off_time = self.params.last_switch_off_time;
        self.state.set(self.params.initial_state().unwrap_or(false));
        self.state.reset_change();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TQ: f64 = 10e-6;

    fn conducting() -> ThyristorStamper {
        let mut t = ThyristorStamper::default();
        t.fire_trigger(10.0, 0.0, 0.0);
        assert!(t.is_on());
        t.reset_state_change();
        t
    }

    #[test]
    fn test_gate_trigger_needs_forward_bias() {
        let mut t = ThyristorStamper::default();
        t.update_state_with_gate(1.0, 1.0, 0.0, 0.0, 0.0);
        assert!(!t.is_on());
        t.update_state_with_gate(0.0, 10.0, 0.0, 0.0, 0.0);
        assert!(!t.is_on());
        t.update_state_with_gate(1.0, 10.0, 0.0, 0.0, 0.0);
        assert!(t.is_on());
    }

    #[test]
    fn test_latches_when_gate_removed() {
        let mut t = conducting();
        for k in 1..100 {
            t.update_state_with_gate(0.0, 1.6, 0.0, 5.0, k as f64 * 1e-6);
            assert!(t.is_on());
            assert!(!t.is_state_changed());
        }
    }

    #[test]
    fn test_turns_off_at_current_zero() {
        let mut t = conducting();
        t.update_state_with_gate(0.0, 1.5, 0.0, 0.0, 1e-3);
        assert!(!t.is_on());
        assert!(t.is_state_changed());
        assert_eq!(t.last_switch_off_time(), 1e-3);
    }

    #[test]
    fn test_retrigger_rejected_during_recovery() {
        let mut t = conducting();
        t.update_state(0.0, 0.0, -1.0, 1e-3);
        assert!(!t.is_on());

        t.fire_trigger(10.0, 0.0, 1e-3 + 0.5 * TQ);
        assert!(!t.is_on(), "turn-on before recovery time elapsed");

        t.fire_trigger(10.0, 0.0, 1e-3 + 1.5 * TQ);
        assert!(t.is_on());
    }

    #[test]
    fn test_turn_off_waits_for_recovery_since_last_off() {
        let mut t = conducting();
        t.update_state(0.0, 0.0, -1.0, 1e-3);
        // Forced back ON inside the recovery window
        t.set_state(true);
        t.update_state(0.0, 0.0, -1.0, 1e-3 + 0.5 * TQ);
        assert!(t.is_on());
        t.update_state(0.0, 0.0, -1.0, 1e-3 + 1.5 * TQ);
        assert!(!t.is_on());
    }

    #[test]
    fn test_last_switch_off_slot() {
        let mut t = ThyristorStamper::default();
        let mut params = SwitchParams::new(1e-3, 1e9, 1.5)
            .with_recovery_time(TQ)
            .to_vec();
        params[SwitchParams::SLOT_LAST_SWITCH_OFF] = 0.0;
        t.initialize_state(&params);
        assert_eq!(t.last_switch_off_time(), 0.0);

        t.fire_trigger(10.0, 0.0, 0.5 * TQ);
        assert!(!t.is_on());
        t.fire_trigger(10.0, 0.0, TQ);
        assert!(t.is_on());
    }

    #[test]
    fn test_instantiate_resets_state() {
        let t = conducting();
        let fresh = t.instantiate();
        assert!(!fresh.as_stateful().unwrap().is_on());
    }
}
