//! Integration schemes and companion-model coefficients.
//!
//! Reactive elements are replaced each step by a conductance `G` in parallel
//! with a history current `h` built from previously accepted values:
//!
//! ```text
//!   i(n) = G * v(n) - h
//! ```
//!
//! | element | scheme | G          | h                              |
//! |---------|--------|------------|--------------------------------|
//! | C       | BE     | C/dt       | (C/dt) v0                      |
//! | C       | TRZ    | 2C/dt      | (2C/dt) v0 + i0                |
//! | C       | GS     | 1.5 C/dt   | (C/dt) (2 v0 - 0.5 v1)         |
//! | L       | BE     | dt/L       | -i0                            |
//! | L       | TRZ    | dt/(2L)    | -i0 - dt/(2L) v0               |
//! | L       | GS     | 2dt/(3L)   | -(4/3) i0 + (1/3) i1           |
//!
//! where `v0`, `i0` belong to the previous accepted step and `v1`, `i1` to
//! the one before.

use std::fmt;
use std::str::FromStr;

use crate::error::{PowerSimError, Result};

/// Deepest history any scheme needs.
pub const MAX_HISTORY_DEPTH: usize = 2;

/// Multistep time-integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolverType {
    #[default]
    BackwardEuler,
    Trapezoidal,
    GearShichman,
}

impl SolverType {
    /// All schemes, in legacy index order.
    pub const ALL: [SolverType; 3] = [
        SolverType::BackwardEuler,
        SolverType::Trapezoidal,
        SolverType::GearShichman,
    ];

    /// Decode a legacy solver index (0 = BE, 1 = TRZ, 2 = GS).
    pub fn from_index(index: i64) -> Result<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(PowerSimError::InvalidSolverIndex { index })
    }

    /// Legacy solver index.
    pub fn index(&self) -> usize {
        match self {
            SolverType::BackwardEuler => 0,
            SolverType::Trapezoidal => 1,
            SolverType::GearShichman => 2,
        }
    }

    /// Number of accepted steps the scheme reads back.
    pub fn history_depth(&self) -> usize {
        match self {
            SolverType::BackwardEuler | SolverType::Trapezoidal => 1,
            SolverType::GearShichman => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SolverType::BackwardEuler => "backward-euler",
            SolverType::Trapezoidal => "trapezoidal",
            SolverType::GearShichman => "gear-shichman",
        }
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backward-euler" | "be" => Ok(SolverType::BackwardEuler),
            "trapezoidal" | "trz" => Ok(SolverType::Trapezoidal),
            "gear-shichman" | "gs" => Ok(SolverType::GearShichman),
            other => Err(format!("unknown solver type '{other}'")),
        }
    }
}

/// Voltage and current of one element at previously accepted steps.
///
/// Index 0 is the most recent step. Entries beyond the active scheme's depth
/// stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ElementHistory {
    pub voltages: [f64; MAX_HISTORY_DEPTH],
    pub currents: [f64; MAX_HISTORY_DEPTH],
}

impl ElementHistory {
    /// Previous accepted current.
    pub fn i_prev(&self) -> f64 {
        self.currents[0]
    }
}

/// Step width and scheme shared by every stamper during one simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverContext {
    dt: f64,
    solver: SolverType,
}

impl SolverContext {
    /// Create a context; `dt` must be finite and positive.
    pub fn new(dt: f64, solver: SolverType) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PowerSimError::InvalidTimeStep { dt });
        }
        Ok(Self { dt, solver })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn solver(&self) -> SolverType {
        self.solver
    }

    /// Companion conductance of a capacitance.
    pub fn capacitor_conductance(&self, c: f64) -> f64 {
        match self.solver {
            SolverType::BackwardEuler => c / self.dt,
            SolverType::Trapezoidal => 2.0 * c / self.dt,
            SolverType::GearShichman => 1.5 * c / self.dt,
        }
    }

    /// Companion history current of a capacitance.
    pub fn capacitor_history(&self, c: f64, history: &ElementHistory) -> f64 {
        let [v0, v1] = history.voltages;
        match self.solver {
            SolverType::BackwardEuler => c / self.dt * v0,
            SolverType::Trapezoidal => 2.0 * c / self.dt * v0 + history.currents[0],
            SolverType::GearShichman => c / self.dt * (2.0 * v0 - 0.5 * v1),
        }
    }

    /// Companion conductance of an inductance.
    pub fn inductor_conductance(&self, l: f64) -> f64 {
        match self.solver {
            SolverType::BackwardEuler => self.dt / l,
            SolverType::Trapezoidal => self.dt / (2.0 * l),
            SolverType::GearShichman => 2.0 * self.dt / (3.0 * l),
        }
    }

    /// Companion history current of an inductance.
    pub fn inductor_history(&self, l: f64, history: &ElementHistory) -> f64 {
        let [i0, i1] = history.currents;
        match self.solver {
            SolverType::BackwardEuler => -i0,
            SolverType::Trapezoidal => -i0 - self.dt / (2.0 * l) * history.voltages[0],
            SolverType::GearShichman => -(4.0 / 3.0) * i0 + (1.0 / 3.0) * i1,
        }
    }
}

impl fmt::Display for SolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (dt = {:e} s)", self.solver, self.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_legacy_indices() {
        for solver in SolverType::ALL {
            assert_eq!(SolverType::from_index(solver.index() as i64).unwrap(), solver);
        }
        assert_eq!(
            SolverType::from_index(3),
            Err(PowerSimError::InvalidSolverIndex { index: 3 })
        );
        assert!(SolverType::from_index(-1).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("trapezoidal".parse::<SolverType>().unwrap(), SolverType::Trapezoidal);
        assert_eq!("GS".parse::<SolverType>().unwrap(), SolverType::GearShichman);
        assert!("rk4".parse::<SolverType>().is_err());
        assert_eq!(SolverType::BackwardEuler.to_string(), "backward-euler");
    }

    #[test]
    fn test_invalid_time_step() {
        assert!(SolverContext::new(0.0, SolverType::BackwardEuler).is_err());
        assert!(SolverContext::new(-1e-6, SolverType::BackwardEuler).is_err());
        assert!(SolverContext::new(f64::NAN, SolverType::BackwardEuler).is_err());
        assert!(SolverContext::new(1e-6, SolverType::BackwardEuler).is_ok());
    }

    #[test]
    fn test_capacitor_coefficients() {
        let c = 1e-6;
        let history = ElementHistory {
            voltages: [2.0, 1.0],
            currents: [0.5, 0.0],
        };
        let be = SolverContext::new(1e-3, SolverType::BackwardEuler).unwrap();
        let trz = SolverContext::new(1e-3, SolverType::Trapezoidal).unwrap();
        let gs = SolverContext::new(1e-3, SolverType::GearShichman).unwrap();

        assert_relative_eq!(be.capacitor_conductance(c), 1e-3, max_relative = 1e-12);
        assert_relative_eq!(trz.capacitor_conductance(c), 2e-3, max_relative = 1e-12);
        assert_relative_eq!(gs.capacitor_conductance(c), 1.5e-3, max_relative = 1e-12);

        assert_relative_eq!(be.capacitor_history(c, &history), 2e-3, max_relative = 1e-12);
        assert_relative_eq!(trz.capacitor_history(c, &history), 4e-3 + 0.5, max_relative = 1e-12);
        assert_relative_eq!(gs.capacitor_history(c, &history), 1e-3 * 3.5, max_relative = 1e-12);
    }

    #[test]
    fn test_inductor_coefficients() {
        let l = 1e-3;
        let history = ElementHistory {
            voltages: [1.0, 0.0],
            currents: [3.0, 1.5],
        };
        let be = SolverContext::new(1e-6, SolverType::BackwardEuler).unwrap();
        let trz = SolverContext::new(1e-6, SolverType::Trapezoidal).unwrap();
        let gs = SolverContext::new(1e-6, SolverType::GearShichman).unwrap();

        assert_relative_eq!(be.inductor_conductance(l), 1e-3, max_relative = 1e-12);
        assert_relative_eq!(trz.inductor_conductance(l), 5e-4, max_relative = 1e-12);
        assert_relative_eq!(gs.inductor_conductance(l), 2e-3 / 3.0, max_relative = 1e-12);

        assert_relative_eq!(be.inductor_history(l, &history), -3.0, max_relative = 1e-12);
        assert_relative_eq!(trz.inductor_history(l, &history), -3.0 - 5e-4, max_relative = 1e-12);
        assert_relative_eq!(gs.inductor_history(l, &history), -4.0 + 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_history_depths() {
        assert_eq!(SolverType::BackwardEuler.history_depth(), 1);
        assert_eq!(SolverType::Trapezoidal.history_depth(), 1);
        assert_eq!(SolverType::GearShichman.history_depth(), MAX_HISTORY_DEPTH);
    }
}
