//! Independent sources: Voltage Source, Current Source.
//!
//! Both share one parameter layout:
//!
//! | slot | meaning                         | fallback  |
//! |------|---------------------------------|-----------|
//! | 0    | waveform code (0 = DC, 1 = AC)  | DC        |
//! | 1    | amplitude                       | 0         |
//! | 2    | frequency in Hz                 | 1 Hz      |
//! | 3    | phase in radians                | 0         |
//! | 4    | offset added to an AC waveform  | 0         |

use std::f64::consts::TAU;

use super::{slot_or, Stamper};
use crate::circuit::StampNodes;
use crate::solver::{ElementHistory, MnaMatrix, SolverContext};

/// Source waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Dc,
    Ac,
}

impl Waveform {
    /// Decode a waveform code.
    pub fn from_code(code: f64) -> Option<Self> {
        if code == 0.0 {
            Some(Waveform::Dc)
        } else if code == 1.0 {
            Some(Waveform::Ac)
        } else {
            None
        }
    }

    pub fn code(&self) -> f64 {
        match self {
            Waveform::Dc => 0.0,
            Waveform::Ac => 1.0,
        }
    }
}

/// Decoded source parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    pub waveform: Waveform,
    pub amplitude: f64,
    pub frequency: f64,
    pub phase: f64,
    pub offset: f64,
}

impl SourceParams {
    /// Constant source.
    pub fn dc(value: f64) -> Self {
        Self {
            waveform: Waveform::Dc,
            amplitude: value,
            frequency: DEFAULT_FREQUENCY,
            phase: 0.0,
            offset: 0.0,
        }
    }

    /// Sinusoidal source `amplitude * sin(2*pi*frequency*t + phase) + offset`.
    pub fn ac(amplitude: f64, frequency: f64, phase: f64) -> Self {
        Self {
            waveform: Waveform::Ac,
            amplitude,
            frequency,
            phase,
            offset: 0.0,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Decode a parameter vector; an unknown waveform code decodes as DC.
    pub fn decode(params: &[f64]) -> Self {
        Self {
            waveform: params
                .first()
                .and_then(|&code| Waveform::from_code(code))
                .unwrap_or_default(),
            amplitude: slot_or(params, 1, 0.0),
            frequency: slot_or(params, 2, DEFAULT_FREQUENCY),
            phase: slot_or(params, 3, 0.0),
            offset: slot_or(params, 4, 0.0),
        }
    }

    /// Encode into the positional layout.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.waveform.code(),
            self.amplitude,
            self.frequency,
            self.phase,
            self.offset,
        ]
    }

    /// Source value at `time`. The offset only shifts AC waveforms.
    pub fn value_at(&self, time: f64) -> f64 {
        match self.waveform {
            Waveform::Dc => self.amplitude,
            Waveform::Ac => {
                self.amplitude * (TAU * self.frequency * time + self.phase).sin() + self.offset
            }
        }
    }
}

/// Frequency used by AC sources without a frequency slot.
const DEFAULT_FREQUENCY: f64 = 1.0;

fn validate_waveform(params: &[f64]) -> std::result::Result<(), String> {
    match params.first() {
        Some(&code) if Waveform::from_code(code).is_none() => {
            Err(format!("unknown waveform code {code}"))
        }
        _ => Ok(()),
    }
}

/// Ideal voltage source with a branch-current unknown in row `z`.
#[derive(Debug, Clone, Default)]
pub struct VoltageSourceStamper;

impl Stamper for VoltageSourceStamper {
    fn name(&self) -> &'static str {
        "voltage-source"
    }

    fn stamp_matrix_a(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        _params: &[f64],
        _ctx: &SolverContext,
    ) {
        debug_assert!(nodes.z.is_some(), "voltage source stamped without a branch row");
        if let Some(z) = nodes.z {
            matrix.stamp_branch(nodes.x, nodes.y, z);
        }
    }

    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        _ctx: &SolverContext,
        time: f64,
        _history: &ElementHistory,
    ) {
        matrix.add_source(nodes.z, SourceParams::decode(params).value_at(time));
    }

    /// The branch unknown carries the real current; this only repeats the
    /// last accepted value.
    fn calculate_current(
        &self,
        _vx: f64,
        _vy: f64,
        _params: &[f64],
        _ctx: &SolverContext,
        _time: f64,
        history: &ElementHistory,
    ) -> f64 {
        history.i_prev()
    }

    fn admittance_weight(&self, _value: f64, _ctx: &SolverContext) -> f64 {
        0.0
    }

    fn validate_parameters(&self, params: &[f64]) -> std::result::Result<(), String> {
        validate_waveform(params)
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(self.clone())
    }
}

/// Ideal current source driving its value into terminal `x`.
#[derive(Debug, Clone, Default)]
pub struct CurrentSourceStamper;

impl Stamper for CurrentSourceStamper {
    fn name(&self) -> &'static str {
        "current-source"
    }

    fn stamp_matrix_a(
        &self,
        _matrix: &mut MnaMatrix,
        _nodes: &StampNodes,
        _params: &[f64],
        _ctx: &SolverContext,
    ) {
    }

    fn stamp_vector_b(
        &self,
        matrix: &mut MnaMatrix,
        nodes: &StampNodes,
        params: &[f64],
        _ctx: &SolverContext,
        time: f64,
        _history: &ElementHistory,
    ) {
        let i = SourceParams::decode(params).value_at(time);
        matrix.stamp_current_injection(nodes.x, nodes.y, i);
    }

    fn calculate_current(
        &self,
        _vx: f64,
        _vy: f64,
        params: &[f64],
        _ctx: &SolverContext,
        time: f64,
        _history: &ElementHistory,
    ) -> f64 {
        SourceParams::decode(params).value_at(time)
    }

    fn admittance_weight(&self, _value: f64, _ctx: &SolverContext) -> f64 {
        0.0
    }

    fn validate_parameters(&self, params: &[f64]) -> std::result::Result<(), String> {
        validate_waveform(params)
    }

    fn instantiate(&self) -> Box<dyn Stamper> {
        Box::new(self.clone())
    }
}
