// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stuck-at fault grading against the gold lane.
//!
//! A fault is *detected* once any output of its lane is strong and differs
//! from a strong gold value, and *potentially detected* when the gold value
//! is strong but the faulty lane is X or Z. Detection is sticky.

use serde::Serialize;

use crate::fault::{FaultCampaign, StuckAt};
use crate::signal::SignalArray;

use super::model::{CompiledModel, ModelError, SignalMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    Undetected,
    PotentiallyDetected,
    Detected,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaultResult {
    pub fault: String,
    pub signal: String,
    pub stuck: StuckAt,
    pub lane: usize,
    pub status: Detection,
    /// Step and output of the first observation that set `status`.
    pub cycle: Option<u64>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub cycles: u64,
    pub total: usize,
    pub detected: usize,
    pub potentially_detected: usize,
    /// `detected / total`, 0 for an empty campaign.
    pub coverage: f64,
    pub results: Vec<FaultResult>,
}

impl FaultReport {
    pub fn undetected(&self) -> impl Iterator<Item = &FaultResult> {
        self.results.iter().filter(|r| r.status == Detection::Undetected)
    }
}

#[derive(Debug, Clone)]
pub struct FaultGrader {
    results: Vec<FaultResult>,
    cycles: u64,
}

impl FaultGrader {
    pub fn new(campaign: &FaultCampaign) -> FaultGrader {
        let results = campaign
            .faults()
            .map(|f| FaultResult {
                fault: f.name.clone(),
                signal: f.signal.clone(),
                stuck: f.stuck,
                lane: f.lane,
                status: Detection::Undetected,
                cycle: None,
                output: None,
            })
            .collect();
        FaultGrader { results, cycles: 0 }
    }

    fn observe_one(&mut self, cycle: u64, name: &str, values: &SignalArray) {
        let gold = values.get(0);
        if !gold.is_strong() {
            return;
        }
        for r in &mut self.results {
            if r.status == Detection::Detected {
                continue;
            }
            let v = values.get(r.lane);
            let status = if !v.is_strong() {
                Detection::PotentiallyDetected
            } else if v != gold {
                Detection::Detected
            } else {
                continue;
            };
            if status != r.status {
                r.status = status;
                r.cycle = Some(cycle);
                r.output = Some(name.to_string());
            }
        }
    }

    /// Compare one step's outputs of every fault lane against lane 0.
    pub fn observe(&mut self, cycle: u64, outputs: &SignalMap) {
        for (name, values) in outputs {
            self.observe_one(cycle, name, values);
        }
        self.cycles = self.cycles.max(cycle + 1);
    }

    pub fn report(&self) -> FaultReport {
        let total = self.results.len();
        let count = |d: Detection| self.results.iter().filter(|r| r.status == d).count();
        let detected = count(Detection::Detected);
        FaultReport {
            cycles: self.cycles,
            total,
            detected,
            potentially_detected: count(Detection::PotentiallyDetected),
            coverage: if total == 0 { 0.0 } else { detected as f64 / total as f64 },
            results: self.results.clone(),
        }
    }
}

/// Attach `campaign` to `model`, apply `stimulus` one row per step and grade
/// every output after each step.
pub fn grade(
    model: &mut CompiledModel,
    campaign: &FaultCampaign,
    stimulus: &[SignalMap],
) -> Result<FaultReport, ModelError> {
    model.attach_campaign(campaign)?;
    let mut grader = FaultGrader::new(campaign);
    let timer = clilog::stimer!("fault_grade");
    for row in stimulus {
        let cycle = model.cycle();
        let outputs = model.step(row)?;
        grader.observe(cycle, &outputs);
    }
    clilog::finish!(timer);
    let report = grader.report();
    clilog::info!(
        "graded {} faults over {} steps: {} detected, {} potentially detected ({:.1}% coverage)",
        report.total,
        stimulus.len(),
        report.detected,
        report.potentially_detected,
        report.coverage * 100.0
    );
    Ok(report)
}
