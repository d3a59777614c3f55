// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! VCD waveform export of a single lane.

use std::io::Write;

use serde::{Deserialize, Serialize};
use vcd_ng::{IdCode, SimulationCommand, TimescaleUnit, Value};

use crate::logic::LogicValue;

use super::model::CompiledModel;

#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error("VCD write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot trace '{0}': no such signal")]
    UnknownSignal(String),
    #[error("lane {lane} is out of range for a {lanes}-lane model")]
    LaneOutOfRange { lane: usize, lanes: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformOptions {
    /// Lane to trace; 0 is the gold lane.
    pub lane: usize,
    /// Time units between samples.
    pub period: u64,
    /// `$timescale` in nanoseconds.
    pub timescale_ns: u32,
    pub scope: String,
    /// Signals to trace; empty means every port.
    pub signals: Vec<String>,
}

impl Default for WaveformOptions {
    fn default() -> Self {
        WaveformOptions {
            lane: 0,
            period: 10,
            timescale_ns: 1,
            scope: "top".into(),
            signals: Vec::new(),
        }
    }
}

fn vcd_value(v: LogicValue) -> Value {
    match v {
        LogicValue::Zero => Value::V0,
        LogicValue::One => Value::V1,
        LogicValue::X => Value::X,
        LogicValue::Z => Value::Z,
    }
}

/// Samples model signals of one lane after each step and streams them as a
/// value change dump.
pub struct WaveformRecorder<W: Write> {
    writer: vcd_ng::Writer<W>,
    lane: usize,
    period: u64,
    vars: Vec<(String, IdCode)>,
    last: Vec<Option<LogicValue>>,
    samples: u64,
    x_transitions: u64,
}

impl<W: Write> WaveformRecorder<W> {
    /// Write the VCD header for `model`'s traced signals.
    pub fn new(out: W, model: &CompiledModel, opts: &WaveformOptions) -> Result<Self, WaveformError> {
        if opts.lane >= model.lanes() {
            return Err(WaveformError::LaneOutOfRange {
                lane: opts.lane,
                lanes: model.lanes(),
            });
        }
        let names: Vec<String> = if opts.signals.is_empty() {
            model.netlist().ports.iter().map(|p| p.name.to_string()).collect()
        } else {
            opts.signals.clone()
        };
        if let Some(missing) = names.iter().find(|n| model.signal(n).is_none()) {
            return Err(WaveformError::UnknownSignal(missing.clone()));
        }

        let mut writer = vcd_ng::Writer::new(out);
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writer.date(&format!("unix time {}", stamp))?;
        writer.version(concat!("lanesim ", env!("CARGO_PKG_VERSION")))?;
        writer.timescale(opts.timescale_ns, TimescaleUnit::NS)?;
        writer.add_module(&opts.scope)?;
        let mut vars = Vec::with_capacity(names.len());
        for n in names {
            let id = writer.add_wire(1, &n)?;
            vars.push((n, id));
        }
        writer.upscope()?;
        writer.enddefinitions()?;

        let last = vec![None; vars.len()];
        Ok(WaveformRecorder {
            writer,
            lane: opts.lane,
            period: opts.period,
            vars,
            last,
            samples: 0,
            x_transitions: 0,
        })
    }

    /// Record the current value of every traced signal at time
    /// `samples * period`. The first sample dumps all values; later samples
    /// only emit changes.
    pub fn sample(&mut self, model: &CompiledModel) -> Result<(), WaveformError> {
        let first = self.samples == 0;
        self.writer.timestamp(self.samples * self.period)?;
        if first {
            self.writer.begin(SimulationCommand::Dumpvars)?;
        }
        for (i, (name, id)) in self.vars.iter().enumerate() {
            let v = model
                .signal(name)
                .ok_or_else(|| WaveformError::UnknownSignal(name.clone()))?
                .get(self.lane);
            if self.last[i] == Some(v) {
                continue;
            }
            if !first && v == LogicValue::X {
                self.x_transitions += 1;
            }
            self.last[i] = Some(v);
            self.writer.change_scalar(*id, vcd_value(v))?;
        }
        if first {
            self.writer.end()?;
        }
        self.samples += 1;
        Ok(())
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Flush the dump and report X transitions.
    pub fn finish(mut self) -> Result<(), WaveformError> {
        self.writer.timestamp(self.samples * self.period)?;
        if self.x_transitions > 0 {
            clilog::warn!(
                "VCD output contains {} X-value transitions across all signals",
                self.x_transitions
            );
        }
        clilog::info!("wrote {} VCD samples of lane {}", self.samples, self.lane);
        Ok(())
    }
}
