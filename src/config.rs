// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Simulation run configuration, loaded from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration. Command line
//! flags take precedence over values from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fault::parse_fault_name;
use crate::signal::InitState;
use crate::sim::model::{ModelOptions, DEFAULT_MEMORY_BUDGET};
use crate::sim::vcd_io::WaveformOptions;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {msg}")]
    Io { path: String, msg: String },
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// VCD export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcdConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: WaveformOptions,
}

/// A named scan chain over register output wires, scan-in side first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanChainConfig {
    pub name: String,
    pub cells: Vec<String>,
    /// Pattern such as `"10x1"` loaded into every lane before the first step.
    #[serde(default)]
    pub load: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub netlist: Option<PathBuf>,
    pub lanes: usize,
    /// Steps to run when no stimulus file is given (random stimulus).
    pub cycles: usize,
    pub random_seed: u64,
    pub register_init: InitState,
    pub memory_budget_bytes: u64,
    /// Fault names in `<signal>_SA0` / `<signal>_SA1` form.
    pub faults: Vec<String>,
    /// Add SA0 and SA1 on every wire of the netlist.
    pub enumerate_faults: bool,
    pub stimulus: Option<PathBuf>,
    pub vcd: Option<VcdConfig>,
    pub scan_chains: Vec<ScanChainConfig>,
    /// Where to write the JSON fault report.
    pub report: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            netlist: None,
            lanes: 32,
            cycles: 16,
            random_seed: 0,
            register_init: InitState::Unknown,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
            faults: Vec::new(),
            enumerate_faults: false,
            stimulus: None,
            vcd: None,
            scan_chains: Vec::new(),
            report: None,
        }
    }
}

impl SimConfig {
    pub fn from_json(src: &str) -> Result<SimConfig, ConfigError> {
        let config: SimConfig = serde_json::from_str(src).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SimConfig, ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        let reader = std::io::BufReader::new(file);
        let config: SimConfig =
            serde_json::from_reader(reader).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::Invalid("lanes must be at least 1".into()));
        }
        if let Some(bad) = self.faults.iter().find(|f| parse_fault_name(f).is_none()) {
            return Err(ConfigError::Invalid(format!(
                "fault '{}' is not of the form <signal>_SA0 or <signal>_SA1",
                bad
            )));
        }
        for chain in &self.scan_chains {
            if chain.cells.is_empty() {
                return Err(ConfigError::Invalid(format!("scan chain '{}' has no cells", chain.name)));
            }
            if let Some(p) = &chain.load {
                if p.chars().count() != chain.cells.len() {
                    return Err(ConfigError::Invalid(format!(
                        "scan chain '{}' has {} cells but its load pattern has {} bits",
                        chain.name,
                        chain.cells.len(),
                        p.chars().count()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            register_init: self.register_init,
            memory_budget_bytes: self.memory_budget_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let c = SimConfig::from_json("{}").unwrap();
        assert_eq!(c, SimConfig::default());
        assert_eq!(c.model_options(), ModelOptions::default());
    }

    #[test]
    fn test_full_config() {
        let c = SimConfig::from_json(
            r#"{
                "netlist": "tests/netlists/shift3.v",
                "lanes": 64,
                "register_init": { "random": { "seed": 3 } },
                "faults": ["d_SA0", "s1_SA1"],
                "vcd": { "path": "out.vcd", "lane": 2, "signals": ["q"] },
                "scan_chains": [ { "name": "core", "cells": ["s0", "s1", "q"], "load": "101" } ],
                "report": "faults.json"
            }"#,
        )
        .unwrap();
        assert_eq!(c.lanes, 64);
        assert_eq!(c.register_init, InitState::Random { seed: 3 });
        let vcd = c.vcd.unwrap();
        assert_eq!(vcd.options.lane, 2);
        assert_eq!(vcd.options.period, 10, "unset fields keep their defaults");
        assert_eq!(c.scan_chains[0].load.as_deref(), Some("101"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(SimConfig::from_json(r#"{"lanes": 0}"#), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            SimConfig::from_json(r#"{"faults": ["clk_SA2"]}"#),
            Err(ConfigError::Invalid(m)) if m.contains("clk_SA2")
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{"scan_chains": [{"name": "c", "cells": ["a"], "load": "10"}]}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(SimConfig::from_json(r#"{"lanes": "many"}"#), Err(ConfigError::Parse(_))));
        assert!(matches!(
            SimConfig::load("/nonexistent/lanesim.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
