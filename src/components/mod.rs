//! Stampers for every supported component type.
//!
//! A stamper writes one element's contribution into the MNA system:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source
//! - Switches: Diode, ideal Switch, MOSFET, IGBT, Thyristor
//!
//! Thermal and reluctance networks reuse the electrical stampers through
//! their [`ComponentType`] analogues.
//!
//! Stampers never own topology or parameters. The kernel hands them the
//! matrix rows of the element, its parameter vector and the solver context
//! on every call. Switch stampers keep per-element state, and every element
//! gets its own instance from [`Stamper::instantiate`].

mod diode;
mod igbt;
mod linear;
mod registry;
mod sources;
mod switch;
mod thyristor;

pub use diode::DiodeStamper;
pub use igbt::IgbtStamper;
pub use linear::{CapacitorStamper, InductorStamper, ResistorStamper};
pub use registry::StamperRegistry;
pub use sources::{CurrentSourceStamper, SourceParams, VoltageSourceStamper, Waveform};
pub use switch::{SwitchParams, SwitchStamper, SwitchState};
pub use thyristor::ThyristorStamper;

use std::fmt;

use crate::circuit::StampNodes;
use crate::error::{PowerSimError, Result};
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// Smallest resistance a passive resistor is stamped with.
pub const MIN_RESISTANCE: f64 = 1e-9;

/// Smallest resistance a conducting switch is stamped with.
pub const MIN_SWITCH_RESISTANCE: f64 = 1e-12;

/// Largest resistance any element is stamped with.
pub const MAX_RESISTANCE: f64 = 1e15;

/// Smallest stamped capacitance.
pub const MIN_CAPACITANCE: f64 = 1e-15;

/// Smallest stamped inductance.
pub const MIN_INDUCTANCE: f64 = 1e-12;

/// Clamp a resistance into `[floor, MAX_RESISTANCE]`.
///
/// Zero, negative and NaN inputs all land on the floor.
pub fn clamp_resistance(r: f64, floor: f64) -> f64 {
    r.max(floor).min(MAX_RESISTANCE)
}

/// Read a parameter slot, falling back to a default when the vector is short.
pub(crate) fn slot_or(params: &[f64], index: usize, default: f64) -> f64 {
    params.get(index).copied().unwrap_or(default)
}

/// Component type tag.
///
/// Each tag resolves to exactly one stamper through the
/// [`StamperRegistry`]. Discriminants follow the legacy type indices used by
/// existing circuit files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Resistor,
    Inductor,
    Capacitor,
    VoltageSource,
    CurrentSource,
    Diode,
    Switch,
    Thyristor,
    Igbt,
    Reluctance,
    MmfSource,
    Mosfet,
    HeatFlow,
    TemperatureSource,
    ThermalResistance,
    ThermalCapacitance,
}

impl ComponentType {
    /// Every supported type.
    pub const ALL: [ComponentType; 16] = [
        ComponentType::Resistor,
        ComponentType::Inductor,
        ComponentType::Capacitor,
        ComponentType::VoltageSource,
        ComponentType::CurrentSource,
        ComponentType::Diode,
        ComponentType::Switch,
        ComponentType::Thyristor,
        ComponentType::Igbt,
        ComponentType::Reluctance,
        ComponentType::MmfSource,
        ComponentType::Mosfet,
        ComponentType::HeatFlow,
        ComponentType::TemperatureSource,
        ComponentType::ThermalResistance,
        ComponentType::ThermalCapacitance,
    ];

    /// Legacy type index.
    pub fn index(&self) -> i64 {
        match self {
            ComponentType::Resistor => 1,
            ComponentType::Inductor => 2,
            ComponentType::Capacitor => 3,
            ComponentType::VoltageSource => 4,
            ComponentType::CurrentSource => 5,
            ComponentType::Diode => 6,
            ComponentType::Switch => 7,
            ComponentType::Thyristor => 8,
            ComponentType::Igbt => 10,
            ComponentType::Reluctance => 24,
            ComponentType::MmfSource => 26,
            ComponentType::Mosfet => 28,
            ComponentType::HeatFlow => 44,
            ComponentType::TemperatureSource => 45,
            ComponentType::ThermalResistance => 46,
            ComponentType::ThermalCapacitance => 47,
        }
    }

    /// Decode a legacy type index.
    pub fn from_index(index: i64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.index() == index)
            .ok_or(PowerSimError::InvalidComponentIndex { index })
    }

    /// Whether the element needs an auxiliary branch-current unknown.
    pub fn needs_branch(&self) -> bool {
        matches!(
            self,
            ComponentType::VoltageSource | ComponentType::TemperatureSource | ComponentType::MmfSource
        )
    }

    /// Whether the element is an independent source whose value can be
    /// driven during a run.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            ComponentType::VoltageSource
                | ComponentType::CurrentSource
                | ComponentType::TemperatureSource
                | ComponentType::HeatFlow
                | ComponentType::MmfSource
        )
    }

    /// Whether the element is a switching device.
    pub fn is_switch(&self) -> bool {
        matches!(
            self,
            ComponentType::Diode
                | ComponentType::Switch
                | ComponentType::Thyristor
                | ComponentType::Igbt
                | ComponentType::Mosfet
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::Resistor => "resistor",
            ComponentType::Inductor => "inductor",
            ComponentType::Capacitor => "capacitor",
            ComponentType::VoltageSource => "voltage-source",
            ComponentType::CurrentSource => "current-source",
            ComponentType::Diode => "diode",
            ComponentType::Switch => "switch",
            ComponentType::Thyristor => "thyristor",
            ComponentType::Igbt => "igbt",
            ComponentType::Reluctance => "reluctance",
            ComponentType::MmfSource => "mmf-source",
            ComponentType::Mosfet => "mosfet",
            ComponentType::HeatFlow => "heat-flow",
            ComponentType::TemperatureSource => "temperature-source",
            ComponentType::ThermalResistance => "thermal-resistance",
            ComponentType::ThermalCapacitance => "thermal-capacitance",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contribution of one component kind to the MNA system.
///
/// All currents are measured from terminal `x` to terminal `y` through the
/// element, except for current sources, which report the current they drive
/// into `x`.
pub trait Stamper: fmt::Debug + Send {
    /// Short kind label used in logs and registry listings.
    fn name(&self) -> &'static str;

    /// Add the admittance contribution to `A`.
    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
    );

    /// Add source, history and compensation terms to `b`.
    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        ctx: &SolverContext,
        time: f64,
        history: &ElementHistory,
    );

    /// Element current recovered from a solved terminal voltage pair.
    fn calculate_current(
        &self,
        vx: f64,
        vy: f64,
        params: &[f64],
        ctx: &SolverContext,
        time: f64,
        history: &ElementHistory,
    ) -> f64;

    /// Admittance stamped for a parameter value (resistance, capacitance,
    /// inductance) under the active scheme.
    fn admittance_weight(&self, value: f64, ctx: &SolverContext) -> f64;

    /// Check a parameter vector beyond the generic NaN test.
    fn validate_parameters(&self, _params: &[f64]) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Current flowing at the start of the simulation.
    fn initial_current(&self, _params: &[f64]) -> f64 {
        0.0
    }

    /// Voltage across the element at the start of the simulation.
    fn initial_voltage(&self, _params: &[f64]) -> f64 {
        0.0
    }

    /// Fresh instance for one element, carrying this template's defaults.
    fn instantiate(&self) -> Box<dyn Stamper>;

    fn as_stateful(&self) -> Option<&dyn StatefulStamper> {
        None
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulStamper> {
        None
    }
}

/// Stamper with a discrete ON/OFF state.
///
/// The kernel re-stamps and re-solves at a frozen time while any instance
/// reports [`is_state_changed`](Self::is_state_changed), and calls
/// [`reset_state_change`](Self::reset_state_change) once a step is accepted.
pub trait StatefulStamper: Stamper {
    /// Voltage and current driven update.
    fn update_state(&mut self, vx: f64, vy: f64, current: f64, time: f64);

    /// Gate driven update; devices without a gate ignore the signal.
    fn update_state_with_gate(&mut self, _gate: f64, vx: f64, vy: f64, current: f64, time: f64) {
        self.update_state(vx, vy, current, time);
    }

    /// Whether the kernel should feed a gate signal to this device.
    fn is_gate_controlled(&self) -> bool {
        false
    }

    fn is_state_changed(&self) -> bool;

    fn reset_state_change(&mut self);

    fn is_on(&self) -> bool;

    /// Force the state, flagging a change when it differs.
    fn set_state(&mut self, on: bool);

    /// Resistance stamped in the present state.
    fn current_resistance(&self) -> f64;

    /// Apply initial conditions from the element's parameter vector.
    fn initialize_state(&mut self, params: &[f64]);
}
