//! Shared switch machinery and the gate-driven ideal switch / MOSFET.
//!
//! Every switching device reads the same parameter layout:
//!
//! | slot | meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | present resistance (selects the initial state)  |
//! | 1    | forward voltage                                 |
//! | 2    | ON resistance                                   |
//! | 3    | OFF resistance                                  |
//! | 8    | gate signal                                     |
//! | 9    | recovery time                                   |
//! | 11   | last switch-off time                            |
//!
//! Slots 4 to 7 and 10 are reserved for runtime bookkeeping of other tools
//! and are ignored here.

use super::{clamp_resistance, slot_or, Stamper, StatefulStamper, MIN_SWITCH_RESISTANCE};
use crate::circuit::StampNodes;
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// Fraction of the forward voltage used as switching threshold.
pub(crate) const THRESHOLD_PERTURBATION: f64 = 0.99;

/// Dead band around the switching threshold.
pub(crate) const THRESHOLD_ACCEPT: f64 = 1e-6;

/// Whether a gate signal counts as asserted.
pub(crate) fn gate_asserted(gate: f64) -> bool {
    gate != 0.0
}

/// Decoded switch parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchParams {
    /// Resistance the element starts with, if given
    pub initial_resistance: Option<f64>,
    pub forward_voltage: f64,
    pub r_on: f64,
    pub r_off: f64,
    pub gate: f64,
    pub recovery_time: f64,
    pub last_switch_off_time: f64,
}

impl SwitchParams {
    pub const SLOT_RESISTANCE: usize = 0;
    pub const SLOT_FORWARD_VOLTAGE: usize = 1;
    pub const SLOT_R_ON: usize = 2;
    pub const SLOT_R_OFF: usize = 3;
    pub const SLOT_GATE: usize = 8;
    pub const SLOT_RECOVERY_TIME: usize = 9;
    pub const SLOT_LAST_SWITCH_OFF: usize = 11;

    /// Parameters with the given ON/OFF resistances and forward voltage.
    pub fn new(r_on: f64, r_off: f64, forward_voltage: f64) -> Self {
        Self {
            initial_resistance: None,
            forward_voltage,
            r_on,
            r_off,
            gate: 0.0,
            recovery_time: 0.0,
            last_switch_off_time: f64::NEG_INFINITY,
        }
    }

    pub fn with_gate(mut self, gate: f64) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_recovery_time(mut self, recovery_time: f64) -> Self {
        self.recovery_time = recovery_time;
        self
    }

    /// Start the element ON.
    pub fn starting_on(mut self) -> Self {
        self.initial_resistance = Some(self.r_on);
        self
    }

    /// Decode a parameter vector; short vectors fall back to `defaults`.
    pub fn decode(params: &[f64], defaults: &SwitchParams) -> Self {
        Self {
            initial_resistance: params
                .get(Self::SLOT_RESISTANCE)
                .copied()
                .or(defaults.initial_resistance),
            forward_voltage: slot_or(params, Self::SLOT_FORWARD_VOLTAGE, defaults.forward_voltage),
            r_on: slot_or(params, Self::SLOT_R_ON, defaults.r_on),
            r_off: slot_or(params, Self::SLOT_R_OFF, defaults.r_off),
            gate: slot_or(params, Self::SLOT_GATE, defaults.gate),
            recovery_time: slot_or(params, Self::SLOT_RECOVERY_TIME, defaults.recovery_time),
            last_switch_off_time: slot_or(
                params,
                Self::SLOT_LAST_SWITCH_OFF,
                defaults.last_switch_off_time,
            ),
        }
    }

    /// Encode into the positional layout.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = vec![0.0; Self::SLOT_LAST_SWITCH_OFF + 1];
        v[Self::SLOT_RESISTANCE] = self.initial_resistance.unwrap_or(self.r_off);
        v[Self::SLOT_FORWARD_VOLTAGE] = self.forward_voltage;
        v[Self::SLOT_R_ON] = self.r_on;
        v[Self::SLOT_R_OFF] = self.r_off;
        v[Self::SLOT_GATE] = self.gate;
        v[Self::SLOT_RECOVERY_TIME] = self.recovery_time;
        v[Self::SLOT_LAST_SWITCH_OFF] = self.last_switch_off_time;
        v
    }

    /// Clamped resistance for a state.
    pub fn resistance(&self, on: bool) -> f64 {
        clamp_resistance(if on { self.r_on } else { self.r_off }, MIN_SWITCH_RESISTANCE)
    }

    /// Initial state implied by slot 0: ON below the geometric mean of the
    /// ON and OFF resistances.
    pub fn initial_state(&self) -> Option<bool> {
        let threshold = (self.resistance(true) * self.resistance(false)).sqrt();
        self.initial_resistance.map(|r| r < threshold)
    }
}

/// ON/OFF state with a change flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchState {
    on: bool,
    changed: bool,
}

impl SwitchState {
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Set the state; the change flag records whether it differs.
    pub fn set(&mut self, on: bool) {
        self.changed = self.on != on;
        self.on = on;
    }

    /// Keep the state and clear the change flag.
    pub fn hold(&mut self) {
        self.changed = false;
    }

    pub fn reset_change(&mut self) {
        self.changed = false;
    }
}

/// Stamp a switch conductance plus, while conducting, the forward-voltage
/// compensation current `G * Uf`.
pub(crate) fn stamp_forward_drop(
    matrix: &mut MnaMatrix,
    nodes: &StampNodes,
    conductance: f64,
    forward_voltage: f64,
) {
    if forward_voltage > 0.0 {
        matrix.stamp_current_injection(nodes.x, nodes.y, conductance * forward_voltage);
    }
}

/// Current through a switch with an optional forward drop.
pub(crate) fn switch_current(v: f64, conductance: f64, on: bool, forward_voltage: f64) -> f64 {
    if on {
        (v - forward_voltage) * conductance
    } else {
        v * conductance
    }
}

/// Gate-driven bidirectional switch without forward drop.
///
/// Used for both the ideal switch and the MOSFET; voltage and current never
/// change its state.
#[derive(Debug, Clone)]
pub struct SwitchStamper {
    label: &'static str,
    params: SwitchParams,
    state: SwitchState,
}

impl SwitchStamper {
    pub fn new(label: &'static str, r_on: f64, r_off: f64) -> Self {
        Self {
            label,
            params: SwitchParams::new(r_on, r_off, 0.0),
            state: SwitchState::default(),
        }
    }

    /// Ideal switch template.
    pub fn ideal() -> Self {
        Self::new("switch", 1e-3, 1e9)
    }

    /// MOSFET template.
    pub fn mosfet() -> Self {
        Self::new("mosfet", 1e-3, 1e9)
    }

    fn decode(&self, params: &[f64]) -> SwitchParams {
        SwitchParams::decode(params, &self.params)
    }

    fn conductance(&self, params: &[f64], ctx: &SolverContext) -> f64 {
        self.admittance_weight(self.decode(params).resistance(self.state.is_on()), ctx)
    }
}

impl Stamper for SwitchStamper {
    fn name(&self) -> &'static str {
        self.label
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    ) {
        matrix.stamp_conductance(nodes.x, nodes.y, self.conductance(params, ctx));
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
        (vx - vy) * self.conductance(params, ctx)
    }

    fn admittance_weight(&self, value: f64, _ctx: &SolverContext) -> f64 {
        1.0 / clamp_resistance(value, MIN_SWITCH_RESISTANCE)
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(Self::new(self.label, self.params.r_on, self.params.r_off))
    }

    fn as_stateful(&self) -> Option<&dyn StatefulStamper> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulStamper> {
        Some(self)
    }
}

impl StatefulStamper for SwitchStamper {
    fn update_state(&mut self, _vx: f64, _vy: f64, _current: f64, _time: f64) {
        self.state.hold();
    }

    fn update_state_with_gate(&mut self, gate: f64, _vx: f64, _vy: f64, _current: f64, _time: f64) {
        self.state.set(gate_asserted(gate));
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
        let on = self
            .params
            .initial_state()
            .unwrap_or_else(|| gate_asserted(self.params.gate));
        self.state.set(on);
        self.state.reset_change();
    }
}
