//! Time-stepping kernel with switch-state iteration.

use std::collections::HashMap;
use std::fmt;

use crate::circuit::{validate_netlist, ElementId, Netlist, NodeId};
use crate::components::{
    slot_or, SourceParams, Stamper, StamperRegistry, StatefulStamper, SwitchParams,
};
use crate::error::{PowerSimError, Result};

use super::builder::SystemMatrixBuilder;
use super::integration::{SolverContext, SolverType};
use super::DEFAULT_MAX_SWITCH_ITERATIONS;

/// Lifecycle state of a [`SimulationKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationStatus {
    #[default]
    NotInitialized,
    Running,
    Paused,
    Finished,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimulationStatus::NotInitialized => "not initialized",
            SimulationStatus::Running => "running",
            SimulationStatus::Paused => "paused",
            SimulationStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Configuration for the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Start time (seconds).
    pub t_start: f64,
    /// End time (seconds).
    pub t_end: f64,
    /// Fixed step width (seconds).
    pub dt: f64,
    pub solver: SolverType,
    /// Re-solves allowed per step before the step fails.
    pub max_switch_iterations: usize,
    /// Pause automatically once this time is reached.
    pub t_pause: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1e-3,
            dt: 1e-6,
            solver: SolverType::BackwardEuler,
            max_switch_iterations: DEFAULT_MAX_SWITCH_ITERATIONS,
            t_pause: None,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timing(mut self, t_start: f64, t_end: f64, dt: f64) -> Self {
        self.t_start = t_start;
        self.t_end = t_end;
        self.dt = dt;
        self
    }

    pub fn with_t_end(mut self, t_end: f64) -> Self {
        self.t_end = t_end;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_solver(mut self, solver: SolverType) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_max_switch_iterations(mut self, max_switch_iterations: usize) -> Self {
        self.max_switch_iterations = max_switch_iterations;
        self
    }

    pub fn with_pause_at(mut self, t_pause: f64) -> Self {
        self.t_pause = Some(t_pause);
        self
    }

    /// Number of whole steps between start and end.
    pub fn num_steps(&self) -> usize {
        ((self.t_end - self.t_start) / self.dt + TIME_EPSILON).floor().max(0.0) as usize
    }
}

/// Owned copy of the results at one accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSnapshot {
    pub time: f64,
    pub solution: Vec<f64>,
    pub element_currents: Vec<f64>,
}

/// Relative slack (in steps) when comparing times against step boundaries.
const TIME_EPSILON: f64 = 1e-6;

/// Fixed-step transient kernel.
///
/// Each step evaluates the netlist at `time + dt`, re-stamping and
/// re-solving at that frozen time until no switching device changes state.
/// Only then are element currents recovered, the history shifted and time
/// advanced.
#[derive(Debug)]
pub struct SimulationKernel {
    config: SimulationConfig,
    registry: StamperRegistry,
    netlist: Option<Netlist>,
    stampers: Vec<Box<dyn Stamper>>,
    builder: Option<SystemMatrixBuilder>,
    gate_signals: HashMap<ElementId, f64>,
    currents: Vec<f64>,
    status: SimulationStatus,
    steps: usize,
    time: f64,
    pause_at: Option<f64>,
    last_iterations: usize,
}

impl SimulationKernel {
    /// Kernel with the default stamper registry.
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_registry(config, StamperRegistry::with_defaults())
    }

    pub fn with_registry(config: SimulationConfig, registry: StamperRegistry) -> Self {
        let time = config.t_start;
        let pause_at = config.t_pause;
        Self {
            config,
            registry,
            netlist: None,
            stampers: Vec::new(),
            builder: None,
            gate_signals: HashMap::new(),
            currents: Vec::new(),
            status: SimulationStatus::NotInitialized,
            steps: 0,
            time,
            pause_at,
            last_iterations: 0,
        }
    }

    /// Bind a netlist: validate it, give every element its own stamper and
    /// apply initial switch states.
    pub fn initialize(&mut self, netlist: Netlist) -> Result<()> {
        let ctx = SolverContext::new(self.config.dt, self.config.solver)?;
        validate_netlist(&netlist, &self.registry)?;

        let mut stampers = Vec::with_capacity(netlist.len());
        for element in netlist.elements() {
            let mut stamper = self.registry.instantiate(element.kind)?;
            if let Some(stateful) = stamper.as_stateful_mut() {
                stateful.initialize_state(&element.parameters);
            }
            stampers.push(stamper);
        }

        let mut builder = SystemMatrixBuilder::new(ctx);
        builder.initialize(&netlist, &stampers)?;

        tracing::info!(
            nodes = netlist.num_nodes(),
            branches = netlist.num_branches(),
            elements = netlist.len(),
            solver = %ctx.solver(),
            dt = ctx.dt(),
            "simulation initialized"
        );

        self.currents = netlist
            .elements()
            .iter()
            .zip(&stampers)
            .map(|(e, s)| s.initial_current(&e.parameters))
            .collect();
        self.stampers = stampers;
        self.builder = Some(builder);
        self.netlist = Some(netlist);
        self.gate_signals.clear();
        self.time = self.config.t_start;
        self.steps = 0;
        self.last_iterations = 0;
        self.pause_at = self.config.t_pause;
        self.status = SimulationStatus::Running;
        Ok(())
    }

    /// Advance one step.
    pub fn step(&mut self) -> Result<()> {
        match self.status {
            SimulationStatus::Running => {}
            SimulationStatus::NotInitialized => return Err(PowerSimError::NotInitialized),
            status => return Err(PowerSimError::invalid_status(status, "step")),
        }
        let (netlist, builder) = match (self.netlist.as_ref(), self.builder.as_mut()) {
            (Some(n), Some(b)) => (n, b),
            _ => return Err(PowerSimError::NotInitialized),
        };

        let dt = self.config.dt;
        let next = self.config.t_start + (self.steps + 1) as f64 * dt;
        if next > self.config.t_end + dt * TIME_EPSILON {
            return Err(PowerSimError::EndTimeReached {
                time: self.time,
                t_end: self.config.t_end,
            });
        }
        let ctx = *builder.context();

        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.config.max_switch_iterations {
            iterations += 1;
            builder.assemble(netlist, &self.stampers, next)?;
            builder.solve()?;
            let solution = builder.solution().ok_or(PowerSimError::NotInitialized)?;

            let mut changed = false;
            for (idx, element) in netlist.elements().iter().enumerate() {
                if self.stampers[idx].as_stateful().is_none() {
                    continue;
                }
                let nodes = netlist.stamp_nodes(element);
                let vx = nodes.x.map_or(0.0, |i| solution[i]);
                let vy = nodes.y.map_or(0.0, |i| solution[i]);
                let past = builder.element_history(netlist, idx)?;
                let current = self.stampers[idx].calculate_current(
                    vx,
                    vy,
                    &element.parameters,
                    &ctx,
                    next,
                    &past,
                );

                let Some(device) = self.stampers[idx].as_stateful_mut() else {
                    continue;
                };
                if device.is_gate_controlled() {
                    let gate = self
                        .gate_signals
                        .get(&ElementId(idx))
                        .copied()
                        .unwrap_or_else(|| slot_or(&element.parameters, SwitchParams::SLOT_GATE, 0.0));
                    device.update_state_with_gate(gate, vx, vy, current, next);
                } else {
                    device.update_state(vx, vy, current, next);
                }

                if device.is_state_changed() {
                    changed = true;
                    tracing::debug!(
                        element = %element.name,
                        on = device.is_on(),
                        time = next,
                        iteration = iterations,
                        "switch state changed"
                    );
                }
            }

            tracing::trace!(time = next, iteration = iterations, changed, "switch iteration");
            if !changed {
                converged = true;
                break;
            }
        }
        self.last_iterations = iterations;

        if !converged {
            tracing::error!(
                time = next,
                iterations,
                "switch states did not settle"
            );
            return Err(PowerSimError::SwitchingNonConvergence {
                time: next,
                iterations,
            });
        }

        let solution = builder
            .solution()
            .ok_or(PowerSimError::NotInitialized)?
            .to_vec();
        let mut currents = Vec::with_capacity(netlist.len());
        for (idx, element) in netlist.elements().iter().enumerate() {
            let nodes = netlist.stamp_nodes(element);
            let current = match nodes.z {
                Some(z) => solution[z],
                None => {
                    let past = builder.element_history(netlist, idx)?;
                    let vx = nodes.x.map_or(0.0, |i| solution[i]);
                    let vy = nodes.y.map_or(0.0, |i| solution[i]);
                    self.stampers[idx].calculate_current(
                        vx,
                        vy,
                        &element.parameters,
                        &ctx,
                        next,
                        &past,
                    )
                }
            };
            currents.push(current);
        }

        builder.shift_history(&solution, &currents)?;
        for stamper in &mut self.stampers {
            if let Some(device) = stamper.as_stateful_mut() {
                device.reset_state_change();
            }
        }
        self.currents = currents;
        self.steps += 1;
        self.time = next;

        if let Some(t_pause) = self.pause_at {
            if self.time >= t_pause - dt * TIME_EPSILON {
                self.pause_at = None;
                self.status = SimulationStatus::Paused;
                tracing::info!(time = self.time, "simulation paused");
            }
        }
        Ok(())
    }

    /// Step until `duration` more seconds have elapsed, stopping early at the
    /// end time or a pause.
    pub fn simulate_time(&mut self, duration: f64) -> Result<()> {
        let target = (self.time + duration).min(self.config.t_end);
        let slack = self.config.dt * TIME_EPSILON;
        while self.status == SimulationStatus::Running && self.time + self.config.dt <= target + slack
        {
            self.step()?;
        }
        if self.status == SimulationStatus::NotInitialized {
            return Err(PowerSimError::NotInitialized);
        }
        Ok(())
    }

    /// Run to the end time.
    pub fn run(&mut self) -> Result<()> {
        self.run_with(|_| {})
    }

    /// Run to the end time, calling `observer` after every accepted step.
    ///
    /// Returns early, leaving the kernel paused, when a pause time is hit.
    pub fn run_with<F>(&mut self, mut observer: F) -> Result<()>
    where
        F: FnMut(&Self),
    {
        match self.status {
            SimulationStatus::Running => {}
            SimulationStatus::NotInitialized => return Err(PowerSimError::NotInitialized),
            status => return Err(PowerSimError::invalid_status(status, "run")),
        }
        let _span = tracing::info_span!("run", t_end = self.config.t_end).entered();

        let slack = self.config.dt * TIME_EPSILON;
        while self.status == SimulationStatus::Running {
            let next = self.config.t_start + (self.steps + 1) as f64 * self.config.dt;
            if next > self.config.t_end + slack {
                self.status = SimulationStatus::Finished;
                break;
            }
            self.step()?;
            observer(self);
        }

        tracing::info!(
            steps = self.steps,
            time = self.time,
            status = %self.status,
            "run stopped"
        );
        Ok(())
    }

    /// Pause a running simulation; a no-op in any other state.
    pub fn pause_simulation(&mut self) {
        if self.status == SimulationStatus::Running {
            self.status = SimulationStatus::Paused;
        }
    }

    pub fn resume_simulation(&mut self) -> Result<()> {
        match self.status {
            SimulationStatus::Paused => {
                self.status = SimulationStatus::Running;
                Ok(())
            }
            SimulationStatus::NotInitialized => Err(PowerSimError::NotInitialized),
            status => Err(PowerSimError::invalid_status(status, "resume")),
        }
    }

    pub fn end_simulation(&mut self) -> Result<()> {
        if self.status == SimulationStatus::NotInitialized {
            return Err(PowerSimError::NotInitialized);
        }
        self.status = SimulationStatus::Finished;
        Ok(())
    }

    /// Override the gate signal of a gate-controlled element.
    pub fn set_gate_signal(&mut self, element: ElementId, value: f64) -> Result<()> {
        let gated = self
            .stateful(element)?
            .is_some_and(|device| device.is_gate_controlled());
        if !gated {
            return Err(PowerSimError::NotGateControlled {
                element: self.element_name(element),
            });
        }
        self.gate_signals.insert(element, value);
        Ok(())
    }

    /// Drive an independent source to a constant `value` from the next step
    /// on, replacing its waveform.
    pub fn set_source_value(&mut self, element: ElementId, value: f64) -> Result<()> {
        let name = self.element_name(element);
        let netlist = self.netlist.as_mut().ok_or(PowerSimError::NotInitialized)?;
        let e = netlist
            .element_mut(element)
            .ok_or_else(|| PowerSimError::ElementNotFound {
                name: element.to_string(),
            })?;
        if !e.kind.is_source() {
            return Err(PowerSimError::invalid_parameter(name, "not a source"));
        }
        if !value.is_finite() {
            return Err(PowerSimError::invalid_parameter(
                name,
                format!("source value {value} is not finite"),
            ));
        }
        e.parameters = SourceParams::dc(value).to_vec();
        tracing::debug!(element = %e.name, value, time = self.time, "source value set");
        Ok(())
    }

    /// Force the ON/OFF state of a switching element.
    pub fn set_switch_state(&mut self, element: ElementId, on: bool) -> Result<()> {
        self.stateful(element)?;
        let name = self.element_name(element);
        let device = self
            .stampers
            .get_mut(element.0)
            .and_then(|s| s.as_stateful_mut())
            .ok_or_else(|| PowerSimError::invalid_parameter(name, "not a switching device"))?;
        device.set_state(on);
        Ok(())
    }

    /// ON/OFF state of a switching element.
    pub fn switch_state(&self, element: ElementId) -> Result<bool> {
        self.stateful(element)?
            .map(|device| device.is_on())
            .ok_or_else(|| {
                PowerSimError::invalid_parameter(self.element_name(element), "not a switching device")
            })
    }

    /// Replace start, end and step width. Only allowed before initialization.
    pub fn set_timing(&mut self, t_start: f64, t_end: f64, dt: f64) -> Result<()> {
        if self.status != SimulationStatus::NotInitialized {
            return Err(PowerSimError::invalid_status(self.status, "change timing"));
        }
        self.config.t_start = t_start;
        self.config.t_end = t_end;
        self.config.dt = dt;
        self.time = t_start;
        Ok(())
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &StamperRegistry {
        &self.registry
    }

    pub fn netlist(&self) -> Option<&Netlist> {
        self.netlist.as_ref()
    }

    /// Time of the last accepted step.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Accepted steps since initialization.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    pub fn t_start(&self) -> f64 {
        self.config.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.config.t_end
    }

    /// Solves performed by the last step.
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    /// Solution vector of the last accepted step.
    pub fn solution(&self) -> &[f64] {
        self.builder
            .as_ref()
            .and_then(|b| b.previous_solution())
            .unwrap_or(&[])
    }

    /// Node voltage at the last accepted step (0 for ground or unknown nodes).
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        self.netlist
            .as_ref()
            .and_then(|n| n.node_index(node))
            .and_then(|row| self.solution().get(row).copied())
            .unwrap_or(0.0)
    }

    /// Voltage across an element at the last accepted step.
    pub fn element_voltage(&self, element: ElementId) -> Result<f64> {
        let netlist = self.netlist.as_ref().ok_or(PowerSimError::NotInitialized)?;
        let e = netlist
            .element(element)
            .ok_or_else(|| PowerSimError::ElementNotFound {
                name: element.to_string(),
            })?;
        Ok(netlist.stamp_nodes(e).voltage_across(self.solution()))
    }

    /// Element current at the last accepted step.
    pub fn element_current(&self, element: ElementId) -> Result<f64> {
        if self.netlist.is_none() {
            return Err(PowerSimError::NotInitialized);
        }
        self.currents
            .get(element.0)
            .copied()
            .ok_or_else(|| PowerSimError::ElementNotFound {
                name: element.to_string(),
            })
    }

    pub fn element_currents(&self) -> &[f64] {
        &self.currents
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            time: self.time,
            solution: self.solution().to_vec(),
            element_currents: self.currents.clone(),
        }
    }

    fn stateful(&self, element: ElementId) -> Result<Option<&dyn StatefulStamper>> {
        if self.netlist.is_none() {
            return Err(PowerSimError::NotInitialized);
        }
        let stamper = self
            .stampers
            .get(element.0)
            .ok_or_else(|| PowerSimError::ElementNotFound {
                name: element.to_string(),
            })?;
        Ok(stamper.as_stateful())
    }

    fn element_name(&self, element: ElementId) -> String {
        self.netlist
            .as_ref()
            .and_then(|n| n.element(element))
            .map_or_else(|| element.to_string(), |e| e.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::StampNodes;
    use crate::components::{
        ComponentType, SourceParams, StatefulStamper, SwitchState,
    };
    use crate::solver::{ElementHistory, MnaMatrix};
    use approx::assert_abs_diff_eq;

    fn divider() -> Netlist {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])
            .unwrap();
        b.element("R2", ComponentType::Resistor, "out", "0", &[1000.0])
            .unwrap();
        b.build().unwrap()
    }

    fn kernel(netlist: Netlist, config: SimulationConfig) -> SimulationKernel {
        let mut k = SimulationKernel::new(config);
        k.initialize(netlist).unwrap();
        k
    }

    fn node(k: &SimulationKernel, name: &str) -> f64 {
        let id = k.netlist().unwrap().find_node(name).unwrap();
        k.node_voltage(id)
    }

    fn element(k: &SimulationKernel, name: &str) -> ElementId {
        k.netlist().unwrap().element_id(name).unwrap()
    }

    #[test]
    fn test_voltage_divider() {
        let mut k = kernel(divider(), SimulationConfig::default());
        k.step().unwrap();
        assert_abs_diff_eq!(node(&k, "out"), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(node(&k, "in"), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(k.element_current(element(&k, "R1")).unwrap(), 5e-3, epsilon = 1e-12);
        assert_abs_diff_eq!(k.element_current(element(&k, "V1")).unwrap(), -5e-3, epsilon = 1e-12);
        assert_abs_diff_eq!(k.element_voltage(element(&k, "R2")).unwrap(), 5.0, epsilon = 1e-9);
        assert_eq!(k.last_iterations(), 1);
        assert_eq!(k.steps(), 1);
        assert_abs_diff_eq!(k.time(), 1e-6, epsilon = 1e-18);
    }

    #[test]
    fn test_rc_charging_backward_euler() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])
            .unwrap();
        b.element("C1", ComponentType::Capacitor, "out", "0", &[1e-6])
            .unwrap();

        let config = SimulationConfig::new().with_timing(0.0, 1e-3, 1e-6);
        let mut k = kernel(b.build().unwrap(), config);
        k.run().unwrap();

        assert_eq!(k.status(), SimulationStatus::Finished);
        assert_eq!(k.steps(), 1000);
        assert_abs_diff_eq!(node(&k, "out"), 6.32, epsilon = 0.02);
    }

    #[test]
    fn test_rc_schemes_agree() {
        for solver in SolverType::ALL {
            let mut b = Netlist::builder();
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
                .unwrap();
            b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])
                .unwrap();
            b.element("C1", ComponentType::Capacitor, "out", "0", &[1e-6])
                .unwrap();

            let config = SimulationConfig::new()
                .with_timing(0.0, 1e-3, 1e-6)
                .with_solver(solver);
            let mut k = kernel(b.build().unwrap(), config);
            k.run().unwrap();
            assert_abs_diff_eq!(node(&k, "out"), 6.32, epsilon = 0.02);
        }
    }

    #[test]
    fn test_rl_settles_to_one_amp() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "mid", &[10.0])
            .unwrap();
        b.element("L1", ComponentType::Inductor, "mid", "0", &[1e-3])
            .unwrap();

        let config = SimulationConfig::new().with_timing(0.0, 2e-3, 1e-6);
        let mut k = kernel(b.build().unwrap(), config);
        k.run().unwrap();

        let i = k.element_current(element(&k, "L1")).unwrap();
        assert_abs_diff_eq!(i, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(node(&k, "mid"), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_rl_schemes_agree() {
        for solver in SolverType::ALL {
            let mut b = Netlist::builder();
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
                .unwrap();
            b.element("R1", ComponentType::Resistor, "in", "mid", &[10.0])
                .unwrap();
            b.element("L1", ComponentType::Inductor, "mid", "0", &[1e-3])
                .unwrap();

            let config = SimulationConfig::new()
                .with_timing(0.0, 2e-3, 1e-6)
                .with_solver(solver);
            let mut k = kernel(b.build().unwrap(), config);

            // tau = 100 us
            k.simulate_time(1e-4).unwrap();
            let i = k.element_current(element(&k, "L1")).unwrap();
            assert_abs_diff_eq!(i, 1.0 - (-1.0f64).exp(), epsilon = 5e-3);

            k.run().unwrap();
            let i = k.element_current(element(&k, "L1")).unwrap();
            assert_abs_diff_eq!(i, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_seeded_inductor_holds_its_current() {
        for solver in SolverType::ALL {
            let mut b = Netlist::builder();
            b.element("L1", ComponentType::Inductor, "a", "0", &[1.0, 1.0])
                .unwrap();
            b.element("R1", ComponentType::Resistor, "a", "0", &[1e-3])
                .unwrap();

            let config = SimulationConfig::new().with_solver(solver);
            let mut k = kernel(b.build().unwrap(), config);
            let l1 = element(&k, "L1");
            assert_eq!(k.element_current(l1).unwrap(), 1.0);

            k.step().unwrap();
            assert_abs_diff_eq!(k.element_current(l1).unwrap(), 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(node(&k, "a"), -1e-3, epsilon = 1e-8);

            // tau = L/R = 1000 s, so a thousand steps barely move it
            for _ in 0..999 {
                k.step().unwrap();
            }
            assert_abs_diff_eq!(k.element_current(l1).unwrap(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_precharged_capacitor_discharges() {
        for solver in SolverType::ALL {
            let mut b = Netlist::builder();
            b.element("C1", ComponentType::Capacitor, "top", "0", &[1e-6, 10.0])
                .unwrap();
            b.element("R1", ComponentType::Resistor, "top", "0", &[1000.0])
                .unwrap();

            let config = SimulationConfig::new()
                .with_timing(0.0, 1e-3, 1e-6)
                .with_solver(solver);
            let mut k = kernel(b.build().unwrap(), config);
            assert_eq!(node(&k, "top"), 10.0);

            k.step().unwrap();
            assert_abs_diff_eq!(node(&k, "top"), 10.0, epsilon = 0.02);

            // tau = RC = 1 ms
            k.run().unwrap();
            assert_abs_diff_eq!(node(&k, "top"), 10.0 * (-1.0f64).exp(), epsilon = 0.02);
        }
    }

    #[test]
    fn test_precharged_capacitor_holds_without_load() {
        for solver in SolverType::ALL {
            let mut b = Netlist::builder();
            b.element("C1", ComponentType::Capacitor, "top", "0", &[1e-6, 5.0])
                .unwrap();
            b.element("R1", ComponentType::Resistor, "top", "0", &[1e9])
                .unwrap();

            let mut k = kernel(b.build().unwrap(), SimulationConfig::new().with_solver(solver));
            for _ in 0..10 {
                k.step().unwrap();
            }
            assert_abs_diff_eq!(node(&k, "top"), 5.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_source_value_drives_divider() {
        let mut k = kernel(divider(), SimulationConfig::default());
        let v1 = element(&k, "V1");

        k.step().unwrap();
        assert_abs_diff_eq!(node(&k, "out"), 5.0, epsilon = 1e-9);

        k.set_source_value(v1, 4.0).unwrap();
        k.step().unwrap();
        assert_abs_diff_eq!(node(&k, "out"), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(k.element_current(v1).unwrap(), -2e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_source_value_replaces_ac_waveform() {
        let mut b = Netlist::builder();
        b.element("I1", ComponentType::CurrentSource, "a", "0", &SourceParams::ac(1.0, 50.0, 0.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "a", "0", &[10.0])
            .unwrap();

        let mut k = kernel(b.build().unwrap(), SimulationConfig::default());
        let i1 = element(&k, "I1");
        k.set_source_value(i1, 0.5).unwrap();
        k.step().unwrap();
        assert_abs_diff_eq!(node(&k, "a"), 5.0, epsilon = 1e-9);
        assert_eq!(k.element_current(i1).unwrap(), 0.5);
    }

    #[test]
    fn test_source_value_requires_source() {
        let mut k = SimulationKernel::new(SimulationConfig::default());
        assert_eq!(
            k.set_source_value(ElementId(0), 1.0).unwrap_err(),
            PowerSimError::NotInitialized
        );

        k.initialize(divider()).unwrap();
        let r1 = element(&k, "R1");
        let v1 = element(&k, "V1");
        assert!(matches!(
            k.set_source_value(r1, 1.0).unwrap_err(),
            PowerSimError::InvalidParameter { .. }
        ));
        assert!(k.set_source_value(v1, f64::NAN).is_err());
        assert!(matches!(
            k.set_source_value(ElementId(7), 1.0).unwrap_err(),
            PowerSimError::ElementNotFound { .. }
        ));
    }

    #[test]
    fn test_half_wave_rectifier() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::ac(10.0, 50.0, 0.0).to_vec())
            .unwrap();
        b.element("D1", ComponentType::Diode, "in", "out", &[])
            .unwrap();
        b.element("R1", ComponentType::Resistor, "out", "0", &[1000.0])
            .unwrap();

        let config = SimulationConfig::new().with_timing(0.0, 20e-3, 1e-5);
        let mut k = kernel(b.build().unwrap(), config);
        let d1 = element(&k, "D1");

        k.simulate_time(5e-3).unwrap();
        assert!(k.switch_state(d1).unwrap());
        assert_abs_diff_eq!(node(&k, "out"), 9.3, epsilon = 1e-2);

        k.simulate_time(10e-3).unwrap();
        assert!(!k.switch_state(d1).unwrap());
        assert_abs_diff_eq!(node(&k, "out"), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_thyristor_phase_control() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::ac(100.0, 50.0, 0.0).to_vec())
            .unwrap();
        b.element("T1", ComponentType::Thyristor, "in", "out", &[])
            .unwrap();
        b.element("R1", ComponentType::Resistor, "out", "0", &[10.0])
            .unwrap();

        let config = SimulationConfig::new().with_timing(0.0, 20e-3, 1e-5);
        let mut k = kernel(b.build().unwrap(), config);
        let t1 = element(&k, "T1");

        k.simulate_time(1.5e-3).unwrap();
        assert!(!k.switch_state(t1).unwrap(), "blocks without a gate pulse");
        assert_abs_diff_eq!(node(&k, "out"), 0.0, epsilon = 1e-3);

        k.simulate_time(0.5e-3).unwrap();
        k.set_gate_signal(t1, 1.0).unwrap();
        k.simulate_time(0.1e-3).unwrap();
        assert!(k.switch_state(t1).unwrap());
        k.set_gate_signal(t1, 0.0).unwrap();

        k.simulate_time(1.9e-3).unwrap();
        assert!(k.switch_state(t1).unwrap(), "latched after gate removal");
        assert!(node(&k, "out") > 50.0);

        k.simulate_time(8e-3).unwrap();
        assert!(!k.switch_state(t1).unwrap(), "commutated at current zero");
        assert_abs_diff_eq!(node(&k, "out"), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mosfet_follows_gate() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "d", &[10.0])
            .unwrap();
        b.element("M1", ComponentType::Mosfet, "d", "0", &[])
            .unwrap();

        let mut k = kernel(b.build().unwrap(), SimulationConfig::default());
        let m1 = element(&k, "M1");

        k.step().unwrap();
        assert!(!k.switch_state(m1).unwrap());
        assert_abs_diff_eq!(node(&k, "d"), 10.0, epsilon = 1e-6);

        k.set_gate_signal(m1, 1.0).unwrap();
        k.step().unwrap();
        assert!(k.switch_state(m1).unwrap());
        assert_abs_diff_eq!(node(&k, "d"), 0.0, epsilon = 1e-2);
        assert_eq!(k.last_iterations(), 2);

        k.set_gate_signal(m1, 0.0).unwrap();
        k.step().unwrap();
        assert!(!k.switch_state(m1).unwrap());
    }

    #[test]
    fn test_gate_slot_drives_switch_without_override() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "d", &[10.0])
            .unwrap();
        let params = SwitchParams::new(1e-3, 1e9, 0.0).with_gate(1.0).to_vec();
        b.element("S1", ComponentType::Switch, "d", "0", &params)
            .unwrap();

        let mut k = kernel(b.build().unwrap(), SimulationConfig::default());
        k.step().unwrap();
        assert!(k.switch_state(element(&k, "S1")).unwrap());
        assert_abs_diff_eq!(node(&k, "d"), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_igbt_buck_average_output() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(48.0).to_vec())
            .unwrap();
        b.element("Q1", ComponentType::Igbt, "in", "sw", &[]).unwrap();
        b.element("D1", ComponentType::Diode, "0", "sw", &[]).unwrap();
        b.element("L1", ComponentType::Inductor, "sw", "out", &[1e-3])
            .unwrap();
        b.element("C1", ComponentType::Capacitor, "out", "0", &[100e-6])
            .unwrap();
        b.element("R1", ComponentType::Resistor, "out", "0", &[10.0])
            .unwrap();

        let dt = 1e-6;
        let config = SimulationConfig::new().with_timing(0.0, 12e-3, dt);
        let mut k = kernel(b.build().unwrap(), config);
        let q1 = element(&k, "Q1");
        let out = k.netlist().unwrap().find_node("out").unwrap();

        let period = 100;
        let mut sum = 0.0;
        let mut samples = 0;
        for n in 0..12_000 {
            let gate = if n % period < period / 2 { 1.0 } else { 0.0 };
            k.set_gate_signal(q1, gate).unwrap();
            k.step().unwrap();
            if n >= 10_000 {
                sum += k.node_voltage(out);
                samples += 1;
            }
        }
        let average = sum / samples as f64;
        assert!(average > 15.0 && average < 30.0, "average output {average}");
    }

    /// Device that flips on every update and never settles.
    #[derive(Debug, Clone, Default)]
    struct Chattering {
        state: SwitchState,
    }

    impl Stamper for Chattering {
        fn name(&self) -> &'static str {
            "chattering"
        }

        fn stamp_matrix_a(&self, matrix: &mut MnaMatrix, nodes: &StampNodes, _: &[f64], _: &SolverContext) {
            let g = if self.state.is_on() { 1.0 } else { 1e-9 };
            matrix.stamp_conductance(nodes.x, nodes.y, g);
        }

        fn stamp_vector_b(&self, _: &mut MnaMatrix, _: &StampNodes, _: &[f64], _: &SolverContext, _: f64, _: &ElementHistory) {}

        fn calculate_current(&self, _: f64, _: f64, _: &[f64], _: &SolverContext, _: f64, _: &ElementHistory) -> f64 {
            0.0
        }

        fn admittance_weight(&self, value: f64, _: &SolverContext) -> f64 {
            1.0 / value
        }

        fn instantiate(&self) -> Box<dyn Stamper> {
            Box::new(Self::default())
        }

        fn as_stateful(&self) -> Option<&dyn StatefulStamper> {
            Some(self)
        }

        fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulStamper> {
            Some(self)
        }
    }

    impl StatefulStamper for Chattering {
        fn update_state(&mut self, _: f64, _: f64, _: f64, _: f64) {
            let on = !self.state.is_on();
            self.state.set(on);
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
            1.0
        }

        fn initialize_state(&mut self, _: &[f64]) {}
    }

    #[test]
    fn test_non_convergence_is_a_hard_error() {
        let mut registry = StamperRegistry::with_defaults();
        registry.register(ComponentType::Diode, Box::new(Chattering::default()));

        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(1.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "a", &[1.0])
            .unwrap();
        b.element("X1", ComponentType::Diode, "a", "0", &[]).unwrap();

        let config = SimulationConfig::new().with_max_switch_iterations(5);
        let mut k = SimulationKernel::with_registry(config, registry);
        k.initialize(b.build().unwrap()).unwrap();

        let err = k.step().unwrap_err();
        assert!(matches!(
            err,
            PowerSimError::SwitchingNonConvergence { iterations: 5, .. }
        ));
        assert_eq!(k.time(), 0.0);
        assert_eq!(k.steps(), 0);
        assert_eq!(k.status(), SimulationStatus::Running);
        assert!(k.end_simulation().is_ok());
        assert_eq!(k.status(), SimulationStatus::Finished);
    }

    #[test]
    fn test_pause_at_configured_time() {
        let config = SimulationConfig::new()
            .with_timing(0.0, 1e-4, 1e-6)
            .with_pause_at(5e-5);
        let mut k = kernel(divider(), config);
        k.run().unwrap();
        assert_eq!(k.status(), SimulationStatus::Paused);
        assert_eq!(k.steps(), 50);

        assert!(matches!(
            k.step().unwrap_err(),
            PowerSimError::InvalidStatus { status: SimulationStatus::Paused, .. }
        ));

        k.resume_simulation().unwrap();
        k.run().unwrap();
        assert_eq!(k.status(), SimulationStatus::Finished);
        assert_eq!(k.steps(), 100);
    }

    #[test]
    fn test_step_past_end_time_fails() {
        let config = SimulationConfig::new().with_timing(0.0, 3e-6, 1e-6);
        let mut k = kernel(divider(), config);
        for _ in 0..3 {
            k.step().unwrap();
        }
        assert!(matches!(
            k.step().unwrap_err(),
            PowerSimError::EndTimeReached { .. }
        ));
        assert_eq!(k.steps(), 3);
    }

    #[test]
    fn test_lifecycle_before_initialize() {
        let mut k = SimulationKernel::new(SimulationConfig::default());
        assert_eq!(k.status(), SimulationStatus::NotInitialized);
        assert_eq!(k.step().unwrap_err(), PowerSimError::NotInitialized);
        assert_eq!(k.run().unwrap_err(), PowerSimError::NotInitialized);
        assert!(k.element_current(ElementId(0)).is_err());
        assert!(k.solution().is_empty());

        k.set_timing(1e-3, 2e-3, 1e-5).unwrap();
        assert_eq!(k.time(), 1e-3);
        k.initialize(divider()).unwrap();
        assert!(k.set_timing(0.0, 1.0, 1.0).is_err());
        k.step().unwrap();
        assert_abs_diff_eq!(k.time(), 1.01e-3, epsilon = 1e-15);
    }

    #[test]
    fn test_independent_kernels_on_threads() {
        let handles: Vec<_> = [1000.0, 3000.0]
            .into_iter()
            .map(|r2| {
                std::thread::spawn(move || {
                    let mut b = Netlist::builder();
                    b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(8.0).to_vec())
                        .unwrap();
                    b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])
                        .unwrap();
                    b.element("R2", ComponentType::Resistor, "out", "0", &[r2])
                        .unwrap();
                    let mut k = kernel(b.build().unwrap(), SimulationConfig::new().with_t_end(1e-5));
                    k.run().unwrap();
                    node(&k, "out")
                })
            })
            .collect();

        let results: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_abs_diff_eq!(results[0], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(results[1], 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_time_step_rejected_at_initialize() {
        let mut k = SimulationKernel::new(SimulationConfig::new().with_dt(0.0));
        assert!(matches!(
            k.initialize(divider()).unwrap_err(),
            PowerSimError::InvalidTimeStep { .. }
        ));
    }

    #[test]
    fn test_gate_signal_requires_gated_device() {
        let mut k = kernel(divider(), SimulationConfig::default());
        let r1 = element(&k, "R1");
        assert!(matches!(
            k.set_gate_signal(r1, 1.0).unwrap_err(),
            PowerSimError::NotGateControlled { .. }
        ));
        assert!(k.switch_state(r1).is_err());
        assert!(k.set_switch_state(r1, true).is_err());
    }

    #[test]
    fn test_forced_switch_state_and_snapshot() {
        let mut b = Netlist::builder();
        b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())
            .unwrap();
        b.element("R1", ComponentType::Resistor, "in", "d", &[10.0])
            .unwrap();
        b.element("Q1", ComponentType::Igbt, "d", "0", &[]).unwrap();

        let mut k = kernel(b.build().unwrap(), SimulationConfig::default());
        let q1 = element(&k, "Q1");
        k.set_switch_state(q1, true).unwrap();
        assert!(k.switch_state(q1).unwrap());

        // No gate: the first solve turns it back off
        k.step().unwrap();
        assert!(!k.switch_state(q1).unwrap());

        let snap = k.snapshot();
        assert_eq!(snap.time, k.time());
        assert_eq!(snap.solution, k.solution().to_vec());
        assert_eq!(snap.element_currents.len(), 3);
    }
}
