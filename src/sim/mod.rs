// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Netlist-level simulation on top of the lane-parallel engine.
//!
//! - [`model`]: compiled netlist model, stepped one clock edge at a time
//! - [`grading`]: stuck-at fault grading against the gold lane
//! - [`stimulus`]: tabular stimulus files
//! - [`vcd_io`]: single-lane VCD waveform export

pub mod grading;
pub mod model;
pub mod stimulus;
pub mod vcd_io;

pub use model::{CompiledModel, ModelError, ModelOptions, SignalMap};
