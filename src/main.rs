//! PowerSim - transient simulator for power-electronic circuits
//!
//! Runs one of the built-in demonstration circuits and writes node voltages
//! as CSV to stdout.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug powersim --circuit buck --t-end 5e-3 --every 10 > buck.csv
//! ```

use std::error::Error;
use std::io::{self, BufWriter, Write};

use clap::{Parser, ValueEnum};
use powersim_core::{
    circuit::NodeId,
    components::{SourceParams, SwitchParams},
    ComponentType, Netlist, SimulationConfig, SimulationKernel, SolverType,
};

/// Built-in demonstration circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Circuit {
    /// 10 V across two 1 kOhm resistors
    Divider,
    /// 10 V step into 1 kOhm / 1 uF
    Rc,
    /// 10 V step into 10 Ohm / 1 mH
    Rl,
    /// 50 Hz half-wave diode rectifier
    Rectifier,
    /// 48 V IGBT buck chopper at 10 kHz, 50 % duty
    Buck,
}

/// Power electronics transient simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Circuit to simulate
    #[arg(short, long, value_enum, default_value_t = Circuit::Rc)]
    circuit: Circuit,

    /// Integration scheme (be, trz, gs)
    #[arg(short, long, default_value_t = SolverType::BackwardEuler)]
    solver: SolverType,

    /// Time step in seconds
    #[arg(long, default_value_t = 1e-6)]
    dt: f64,

    /// End time in seconds
    #[arg(long, default_value_t = 1e-3)]
    t_end: f64,

    /// Print every N-th step
    #[arg(long, default_value_t = 1)]
    every: usize,
}

/// Square gate signal for one element.
struct Pwm {
    element: &'static str,
    frequency: f64,
    duty: f64,
}

impl Pwm {
    /// Gate level for the step that starts at `time` and is evaluated at
    /// `time + dt`.
    fn gate_for_step(&self, time: f64, dt: f64) -> f64 {
        self.gate(time + dt)
    }

    fn gate(&self, time: f64) -> f64 {
        let phase = (time * self.frequency).fract();
        if phase < self.duty {
            1.0
        } else {
            0.0
        }
    }
}

fn build(circuit: Circuit) -> powersim_core::Result<(Netlist, Option<Pwm>)> {
    let mut b = Netlist::builder();
    let mut pwm = None;
    match circuit {
        Circuit::Divider => {
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())?;
            b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])?;
            b.element("R2", ComponentType::Resistor, "out", "0", &[1000.0])?;
        }
        Circuit::Rc => {
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())?;
            b.element("R1", ComponentType::Resistor, "in", "out", &[1000.0])?;
            b.element("C1", ComponentType::Capacitor, "out", "0", &[1e-6])?;
        }
        Circuit::Rl => {
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(10.0).to_vec())?;
            b.element("R1", ComponentType::Resistor, "in", "mid", &[10.0])?;
            b.element("L1", ComponentType::Inductor, "mid", "0", &[1e-3, 0.0])?;
        }
        Circuit::Rectifier => {
            let source = SourceParams::ac(10.0, 50.0, 0.0).to_vec();
            b.element("V1", ComponentType::VoltageSource, "in", "0", &source)?;
            let diode = SwitchParams::new(1e-3, 1e9, 0.7).to_vec();
            b.element("D1", ComponentType::Diode, "in", "out", &diode)?;
            b.element("R1", ComponentType::Resistor, "out", "0", &[1000.0])?;
        }
        Circuit::Buck => {
            b.element("V1", ComponentType::VoltageSource, "in", "0", &SourceParams::dc(48.0).to_vec())?;
            let igbt = SwitchParams::new(1e-3, 1e9, 1.5).to_vec();
            b.element("Q1", ComponentType::Igbt, "in", "sw", &igbt)?;
            let diode = SwitchParams::new(1e-3, 1e9, 0.7).to_vec();
            b.element("D1", ComponentType::Diode, "0", "sw", &diode)?;
            b.element("L1", ComponentType::Inductor, "sw", "out", &[1e-3, 0.0])?;
            b.element("C1", ComponentType::Capacitor, "out", "0", &[100e-6])?;
            b.element("R1", ComponentType::Resistor, "out", "0", &[10.0])?;
            pwm = Some(Pwm {
                element: "Q1",
                frequency: 10e3,
                duty: 0.5,
            });
        }
    }
    Ok((b.build()?, pwm))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let (netlist, pwm) = build(args.circuit)?;
    let nodes: Vec<NodeId> = (1..netlist.num_nodes()).map(NodeId).collect();
    let header: Vec<String> = nodes
        .iter()
        .map(|&n| format!("v({})", netlist.node_name(n)))
        .collect();
    let gated = pwm
        .as_ref()
        .map(|p| netlist.element_id(p.element))
        .transpose()?;

    let config = SimulationConfig::new()
        .with_timing(0.0, args.t_end, args.dt)
        .with_solver(args.solver);
    let steps = config.num_steps();
    let mut kernel = SimulationKernel::new(config);
    kernel.initialize(netlist)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "time,{}", header.join(","))?;

    let every = args.every.max(1);
    for n in 0..steps {
        if let (Some(p), Some(id)) = (&pwm, gated) {
            kernel.set_gate_signal(id, p.gate_for_step(kernel.time(), kernel.dt()))?;
        }
        kernel.step()?;
        if (n + 1) % every == 0 {
            let row: Vec<String> = nodes
                .iter()
                .map(|&node| format!("{:.6e}", kernel.node_voltage(node)))
                .collect();
            writeln!(out, "{:.6e},{}", kernel.time(), row.join(","))?;
        }
    }
    kernel.end_simulation()?;
    out.flush()?;

    Ok(())
}
