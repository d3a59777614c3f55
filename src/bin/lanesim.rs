// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Command line front end for the lanesim lane-parallel simulator.

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lanesim::config::{ScanChainConfig, SimConfig, VcdConfig};
use lanesim::fault::FaultCampaign;
use lanesim::logic::LogicValue;
use lanesim::netlist::Netlist;
use lanesim::scan::PatternMatrix;
use lanesim::signal::InitState;
use lanesim::sim::grading;
use lanesim::sim::stimulus::Stimulus;
use lanesim::sim::vcd_io::{WaveformOptions, WaveformRecorder};
use lanesim::sim::{CompiledModel, SignalMap};
use rand::SeedableRng;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "lanesim", about = "Lane-parallel 4-state gate-level simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a netlist over all lanes.
    ///
    /// Inputs come from a stimulus file or, without one, from seeded random
    /// 0/1 values. Optionally dumps one lane as VCD.
    Sim(SimArgs),

    /// Grade stuck-at faults, one fault per lane, against the gold lane 0.
    FaultGrade(FaultGradeArgs),

    /// Parse a netlist and report ports, gates, registers and ordering
    /// problems without simulating.
    Lint(LintArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum InitArg {
    Zero,
    One,
    Unknown,
    Random,
}

#[derive(Args)]
struct CommonArgs {
    /// Gate-level Verilog netlist. Overrides `netlist` in the config.
    netlist: Option<PathBuf>,

    /// JSON run configuration.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Stimulus file (one row per step, one column per input).
    #[clap(long)]
    stimulus: Option<PathBuf>,

    /// Number of random steps when no stimulus file is given.
    #[clap(long)]
    cycles: Option<usize>,

    /// Seed for random stimulus and random register init.
    #[clap(long)]
    seed: Option<u64>,

    /// Power-on register state.
    #[clap(long, value_enum)]
    register_init: Option<InitArg>,
}

#[derive(Parser)]
struct SimArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of parallel lanes.
    #[clap(long)]
    lanes: Option<usize>,

    /// Write a VCD of one lane to this path.
    #[clap(long)]
    vcd: Option<PathBuf>,

    /// Lane traced in the VCD.
    #[clap(long, default_value_t = 0)]
    vcd_lane: usize,
}

#[derive(Parser)]
struct FaultGradeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Faults to grade, e.g. `n12_SA0,q_SA1`. Adds to the config list.
    #[clap(long, value_delimiter = ',')]
    faults: Vec<String>,

    /// Grade SA0 and SA1 on every wire of the netlist.
    #[clap(long)]
    all: bool,

    /// Write the JSON fault report to this path.
    #[clap(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
struct LintArgs {
    netlist: PathBuf,
}

fn load_config(common: &CommonArgs) -> Result<SimConfig, Box<dyn Error>> {
    let mut config = match &common.config {
        Some(path) => {
            let c = SimConfig::load(path)?;
            clilog::info!("loaded config {}", path.display());
            c
        }
        None => SimConfig::default(),
    };
    if let Some(n) = &common.netlist {
        config.netlist = Some(n.clone());
    }
    if let Some(s) = &common.stimulus {
        config.stimulus = Some(s.clone());
    }
    if let Some(c) = common.cycles {
        config.cycles = c;
    }
    if let Some(s) = common.seed {
        config.random_seed = s;
    }
    if let Some(init) = common.register_init {
        config.register_init = match init {
            InitArg::Zero => InitState::Zero,
            InitArg::One => InitState::One,
            InitArg::Unknown => InitState::Unknown,
            InitArg::Random => InitState::Random {
                seed: config.random_seed,
            },
        };
    }
    Ok(config)
}

fn load_netlist(config: &SimConfig) -> Result<Netlist, Box<dyn Error>> {
    let path = config
        .netlist
        .as_ref()
        .ok_or("no netlist given on the command line or in the config")?;
    let timer = clilog::stimer!("parse_netlist");
    let netlist = Netlist::parse_file(path)?;
    clilog::finish!(timer);
    clilog::info!(
        "netlist '{}': {} ports, {} gates, {} registers",
        netlist.module,
        netlist.ports.len(),
        netlist.num_gates(),
        netlist.registers().count()
    );
    Ok(netlist)
}

fn load_stimulus(config: &SimConfig, model: &CompiledModel) -> Result<Stimulus, Box<dyn Error>> {
    let inputs: Vec<&str> = model.input_names().collect();
    match &config.stimulus {
        Some(path) => {
            let s = Stimulus::load(path, &inputs)?;
            clilog::info!("stimulus {}: {} steps over {:?}", path.display(), s.len(), s.columns);
            Ok(s)
        }
        None => {
            clilog::info!(
                "no stimulus file, using {} random steps (seed {})",
                config.cycles,
                config.random_seed
            );
            let mut rng = rand::rngs::StdRng::seed_from_u64(config.random_seed);
            Ok(Stimulus::random(&inputs, config.cycles, &mut rng))
        }
    }
}

fn parse_pattern(p: &str) -> Result<Vec<LogicValue>, String> {
    p.chars()
        .map(|c| LogicValue::from_char(c).ok_or_else(|| format!("bad scan pattern bit '{}'", c)))
        .collect()
}

fn load_scan_chains(chains: &[ScanChainConfig], model: &mut CompiledModel) -> Result<(), Box<dyn Error>> {
    for c in chains {
        let cells: Vec<&str> = c.cells.iter().map(String::as_str).collect();
        let chain = model.scan_chain(&cells)?;
        if let Some(p) = &c.load {
            let pattern = PatternMatrix::broadcast(model.lanes(), &parse_pattern(p)?);
            chain.scan_load(model.registers_mut(), &pattern)?;
            clilog::info!("scan chain '{}': loaded {} into {} cells", c.name, p, chain.len());
        }
    }
    Ok(())
}

fn format_lane(outputs: &SignalMap, lane: usize) -> String {
    outputs
        .iter()
        .map(|(n, s)| format!("{}={}", n, s.get(lane)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmd_sim(args: SimArgs) -> CliResult {
    let mut config = load_config(&args.common)?;
    if let Some(l) = args.lanes {
        config.lanes = l;
    }
    if let Some(path) = args.vcd {
        let options = config.vcd.take().map(|v| v.options).unwrap_or_default();
        config.vcd = Some(VcdConfig {
            path,
            options: WaveformOptions {
                lane: args.vcd_lane,
                ..options
            },
        });
    }
    config.validate()?;

    let netlist = load_netlist(&config)?;
    let mut model = CompiledModel::new(netlist, config.lanes, &config.model_options())?;
    load_scan_chains(&config.scan_chains, &mut model)?;
    let stimulus = load_stimulus(&config, &model)?;

    let mut recorder = match &config.vcd {
        Some(v) => {
            let file = std::fs::File::create(&v.path)?;
            let buf = std::io::BufWriter::new(file);
            Some(WaveformRecorder::new(buf, &model, &v.options)?)
        }
        None => None,
    };

    let timer = clilog::stimer!("simulation");
    let mut last = SignalMap::new();
    for (i, row) in stimulus.to_signal_maps(config.lanes).iter().enumerate() {
        last = model.step(row)?;
        clilog::debug!("step {}: {}", i, format_lane(&last, 0));
        if let Some(r) = recorder.as_mut() {
            r.sample(&model)?;
        }
    }
    clilog::finish!(timer);
    if let Some(r) = recorder {
        r.finish()?;
    }

    for c in &config.scan_chains {
        let cells: Vec<&str> = c.cells.iter().map(String::as_str).collect();
        let unloaded = model.scan_chain(&cells)?.scan_unload(model.registers())?;
        let bits: String = unloaded.row(0).iter().map(|v| v.to_char()).collect();
        clilog::info!("scan chain '{}' lane 0: {}", c.name, bits);
    }
    println!("after {} steps, lane 0: {}", model.cycle(), format_lane(&last, 0));
    for (name, s) in &last {
        let x = s.count(LogicValue::X) + s.count(LogicValue::Z);
        if x > 0 {
            clilog::warn!("output '{}' is X/Z on {} of {} lanes", name, x, s.lanes());
        }
    }
    Ok(())
}

fn cmd_fault_grade(args: FaultGradeArgs) -> CliResult {
    let mut config = load_config(&args.common)?;
    config.faults.extend(args.faults);
    config.enumerate_faults |= args.all;
    if args.report.is_some() {
        config.report = args.report;
    }
    config.validate()?;

    let netlist = load_netlist(&config)?;
    let mut names = config.faults.clone();
    if config.enumerate_faults {
        let constants: Vec<_> = netlist.constants.iter().map(|(w, _)| *w).collect();
        for (wire, id) in &netlist.wires {
            if !constants.contains(id) {
                names.push(format!("{}_SA0", wire));
                names.push(format!("{}_SA1", wire));
            }
        }
    }
    if names.is_empty() {
        return Err("no faults to grade; pass --faults or --all".into());
    }
    let lanes = config.lanes.max(names.len() + 1);
    let mut campaign = FaultCampaign::new(lanes);
    for n in &names {
        campaign.add_parsed(n)?;
    }
    clilog::info!("{} faults on {} lanes", campaign.len(), lanes);

    let mut model = CompiledModel::new(netlist, lanes, &config.model_options())?;
    load_scan_chains(&config.scan_chains, &mut model)?;
    let stimulus = load_stimulus(&config, &model)?;
    let report = grading::grade(&mut model, &campaign, &stimulus.to_signal_maps(lanes))?;

    println!(
        "{} / {} faults detected ({:.1}%), {} potentially detected",
        report.detected,
        report.total,
        report.coverage * 100.0,
        report.potentially_detected
    );
    for r in report.undetected() {
        println!("  undetected: {}", r.fault);
    }
    if let Some(path) = &config.report {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &report)?;
        clilog::info!("fault report written to {}", path.display());
    }
    Ok(())
}

fn cmd_lint(args: LintArgs) -> CliResult {
    let netlist = Netlist::parse_file(&args.netlist)?;
    println!(
        "module {}: {} inputs, {} outputs, {} wires, {} gates, {} registers",
        netlist.module,
        netlist.inputs().count(),
        netlist.outputs().count(),
        netlist.num_wires(),
        netlist.num_gates(),
        netlist.registers().count()
    );
    let violations = netlist.order_violations();
    for v in &violations {
        clilog::warn!(
            NL_ORDER,
            "line {}: '{}' reads '{}' before its driver '{}' runs",
            v.line,
            netlist.instructions[v.reader].name,
            netlist.wire_name(v.wire),
            netlist.instructions[v.driver].name
        );
    }
    let undriven = netlist.undriven_wires();
    for w in &undriven {
        clilog::warn!("wire '{}' has no driver", netlist.wire_name(*w));
    }
    if violations.is_empty() && undriven.is_empty() {
        println!("no ordering problems");
    } else {
        println!(
            "{} out-of-order reads, {} undriven wires",
            violations.len(),
            undriven.len()
        );
    }
    Ok(())
}

fn main() {
    // Tagged warnings such as NL_ORDER stop after clilog::MAX_PRINT_COUNT.
    clilog::init_stderr_color_debug();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sim(args) => cmd_sim(args),
        Commands::FaultGrade(args) => cmd_fault_grade(args),
        Commands::Lint(args) => cmd_lint(args),
    };
    if let Err(e) = result {
        clilog::error!("{}", e);
        std::process::exit(1);
    }
}
