// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! lanesim: lane-parallel 4-state logic simulator.
//!
//! lanesim evaluates gate-level circuits across many independent lanes at
//! once: fault scenarios, test patterns or random seeds. Each lane carries a
//! 4-state value (0, 1, X, Z) packed as value and strength bits, 32 lanes per
//! machine word, and every kernel processes whole words in parallel.
//!
//! # Pipeline
//!
//! ```text
//! Verilog netlist
//!   → Netlist          (netlist, lexer + parser, typed instruction list)
//!   → CompiledModel    (sim::model, wires, gates, registers per lane)
//!   → step()           (kernels, packed word evaluation on the rayon pool)
//!   → FaultReport/VCD  (sim::grading, sim::vcd_io)
//! ```
//!
//! # Key modules
//!
//! - [`logic`]: the scalar 4-state algebra, used as reference and for scalar access
//! - [`signal`]: [`signal::SignalArray`], N lanes of 4-state values
//! - [`kernels`]: lane-parallel gate, mux, register and force kernels
//! - [`register`]: clocked storage and the two-phase [`register::RegisterBank`]
//! - [`fault`]: stuck-at fault campaigns mapped one fault per lane
//! - [`scan`]: scan chains with zero-time load/unload and serial shift
//! - [`fuse`]: one-time-programmable fuse bank with a sense-amp read path
//! - [`debug`]: named/addressed backdoor register access
//! - [`jtag`]: IEEE 1149.1 TAP controllers, IEEE 1687 SIBs and stacked-die TSV relays
//! - [`netlist`]: flat gate-level netlist compiler
//! - [`sim`]: compiled models, fault grading, stimulus and waveform I/O
//! - [`config`]: JSON run configuration

pub mod logic;

pub mod signal;

pub mod kernels;

pub mod register;

pub mod fault;

pub mod scan;

pub mod fuse;

pub mod debug;

pub mod jtag;

pub mod netlist;

pub mod sim;

pub mod config;

pub use logic::LogicValue;
pub use signal::{InitState, SignalArray};
