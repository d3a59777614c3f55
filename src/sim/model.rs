// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Executable lane-parallel model of a compiled netlist.
//!
//! Every wire owns one [`SignalArray`]; every `dff` owns one [`Register`] in
//! a [`RegisterBank`]. A call to [`CompiledModel::step`] is one edge of the
//! single global clock: gates are evaluated in textual order, then all
//! registers commit together from their pre-edge D/R values. The `clk`
//! operand of a `dff` is carried in the netlist but not sampled.
//!
//! [`Register`]: crate::register::Register

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::fault::{FaultCampaign, FaultMasks};
use crate::kernels::{self, WordOp2};
use crate::netlist::{GateKind, Netlist};
use crate::register::{RegId, RegisterBank};
use crate::scan::{ScanChain, ScanError};
use crate::signal::{words_for, InitState, SignalArray};

/// Named lane-parallel values, used for both step inputs and outputs.
pub type SignalMap = IndexMap<String, SignalArray>;

/// Default ceiling on model state memory.
pub const DEFAULT_MEMORY_BUDGET: u64 = 16 << 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("a model needs at least one lane")]
    NoLanes,
    #[error("{lanes} lanes need about {needed} bytes of state, budget is {budget}")]
    CapacityExceeded { lanes: usize, needed: u64, budget: u64 },
    #[error("'{0}' is not an input of the model")]
    UnknownInput(String),
    #[error("signal '{name}' has {got} lanes, model has {expected}")]
    LaneMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("fault target '{0}' is not a signal of the model")]
    UnknownSignal(String),
    #[error("'{0}' is not driven by a register")]
    NotARegister(String),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Power-on state of every register.
    pub register_init: InitState,
    pub memory_budget_bytes: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        ModelOptions {
            register_init: InitState::Unknown,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
        }
    }
}

#[derive(Debug, Clone)]
struct Gate {
    op: WordOp2,
    invert: bool,
    output: usize,
    inputs: SmallVec<[usize; 4]>,
}

#[derive(Debug, Clone, Copy)]
struct RegBinding {
    id: RegId,
    q: usize,
    d: usize,
    rst: usize,
}

fn gate_op(kind: GateKind) -> (WordOp2, bool) {
    match kind {
        GateKind::And | GateKind::Buf | GateKind::Dff => (kernels::and_word, false),
        GateKind::Nand | GateKind::Not => (kernels::and_word, true),
        GateKind::Or => (kernels::or_word, false),
        GateKind::Nor => (kernels::or_word, true),
        GateKind::Xor => (kernels::xor_word, false),
        GateKind::Xnor => (kernels::xor_word, true),
    }
}

#[derive(Debug)]
pub struct CompiledModel {
    netlist: Netlist,
    lanes: usize,
    wires: Vec<SignalArray>,
    gates: Vec<Gate>,
    regs: Vec<RegBinding>,
    bank: RegisterBank,
    reg_of_wire: Vec<Option<RegId>>,
    /// Last applied value of every wire driven by neither a gate nor a
    /// register: inputs, constants and floating wires.
    held: Vec<(usize, SignalArray)>,
    held_slot: Vec<Option<usize>>,
    forces: Vec<Option<FaultMasks>>,
    cycle: u64,
}

impl CompiledModel {
    pub fn new(netlist: Netlist, lanes: usize, options: &ModelOptions) -> Result<CompiledModel, ModelError> {
        if lanes == 0 {
            return Err(ModelError::NoLanes);
        }
        let num_regs = netlist.registers().count();
        let needed = ((netlist.num_wires() + num_regs) * words_for(lanes) * 8) as u64;
        if needed > options.memory_budget_bytes {
            return Err(ModelError::CapacityExceeded {
                lanes,
                needed,
                budget: options.memory_budget_bytes,
            });
        }

        let mut wires = vec![SignalArray::unknown(lanes); netlist.num_wires()];
        for &(w, v) in &netlist.constants {
            wires[w.index()] = SignalArray::filled(lanes, v);
        }

        let mut bank = RegisterBank::new(lanes);
        let mut gates = Vec::with_capacity(netlist.num_gates());
        let mut regs = Vec::with_capacity(num_regs);
        let mut reg_of_wire = vec![None; netlist.num_wires()];
        let mut gate_driven = vec![false; netlist.num_wires()];
        for inst in &netlist.instructions {
            if inst.kind.is_sequential() {
                let id = bank.alloc(options.register_init);
                let q = inst.output.index();
                wires[q].copy_from(bank.q(id));
                reg_of_wire[q] = Some(id);
                regs.push(RegBinding {
                    id,
                    q,
                    d: inst.inputs[0].index(),
                    rst: inst.inputs[2].index(),
                });
            } else {
                let (op, invert) = gate_op(inst.kind);
                gate_driven[inst.output.index()] = true;
                gates.push(Gate {
                    op,
                    invert,
                    output: inst.output.index(),
                    inputs: inst.inputs.iter().map(|w| w.index()).collect(),
                });
            }
        }
        let mut held = Vec::new();
        let mut held_slot = vec![None; netlist.num_wires()];
        for w in 0..netlist.num_wires() {
            if !gate_driven[w] && reg_of_wire[w].is_none() {
                held_slot[w] = Some(held.len());
                held.push((w, wires[w].clone()));
            }
        }

        for v in netlist.order_violations() {
            clilog::warn!(
                NL_ORDER,
                "line {}: gate '{}' reads '{}' before its driver '{}' (line {}) runs; it sees the previous step's value",
                v.line,
                netlist.instructions[v.reader].name,
                netlist.wire_name(v.wire),
                netlist.instructions[v.driver].name,
                netlist.instructions[v.driver].line
            );
        }
        for w in netlist.undriven_wires() {
            clilog::warn!("wire '{}' has no driver and stays X", netlist.wire_name(w));
        }
        clilog::info!(
            "compiled '{}': {} wires, {} gates, {} registers, {} lanes",
            netlist.module,
            netlist.num_wires(),
            gates.len(),
            regs.len(),
            lanes
        );

        let forces = vec![None; netlist.num_wires()];
        Ok(CompiledModel {
            netlist,
            lanes,
            wires,
            gates,
            regs,
            bank,
            reg_of_wire,
            held,
            held_slot,
            forces,
            cycle: 0,
        })
    }

    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Number of completed steps.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.netlist.inputs().map(|p| p.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.netlist.outputs().map(|p| p.name.as_str())
    }

    /// Current value of any named wire. Register outputs read the register
    /// state, so backdoor writes show up immediately.
    pub fn signal(&self, name: &str) -> Option<&SignalArray> {
        let w = self.netlist.wire_id(name)?.index();
        match self.reg_of_wire[w] {
            Some(id) => Some(self.bank.q(id)),
            None => Some(&self.wires[w]),
        }
    }

    pub fn registers(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn registers_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    /// Register driving the wire `q`.
    pub fn register_of(&self, q: &str) -> Option<RegId> {
        let w = self.netlist.wire_id(q)?;
        self.reg_of_wire[w.index()]
    }

    /// A scan chain over the registers driving `q_wires`, position 0 first.
    pub fn scan_chain(&self, q_wires: &[&str]) -> Result<ScanChain, ModelError> {
        let cells = q_wires
            .iter()
            .map(|q| self.register_of(q).ok_or_else(|| ModelError::NotARegister(q.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScanChain::new(cells)?)
    }

    /// Route the campaign's faults onto model wires, replacing any previous
    /// campaign. Every fault must name a wire of the netlist.
    pub fn attach_campaign(&mut self, campaign: &FaultCampaign) -> Result<(), ModelError> {
        if campaign.lanes() != self.lanes {
            return Err(ModelError::LaneMismatch {
                name: "fault campaign".into(),
                expected: self.lanes,
                got: campaign.lanes(),
            });
        }
        let mut forces = vec![None; self.wires.len()];
        for sig in campaign.signals() {
            let w = self
                .netlist
                .wire_id(sig)
                .ok_or_else(|| ModelError::UnknownSignal(sig.to_string()))?;
            forces[w.index()] = campaign.masks_for_signal(sig);
        }
        clilog::debug!("attached {} faults on {} signals", campaign.len(), campaign.signals().len());
        self.forces = forces;
        Ok(())
    }

    pub fn detach_faults(&mut self) {
        self.forces.iter_mut().for_each(|f| *f = None);
    }

    /// One clock edge. Inputs not mentioned keep their previous values.
    /// Returns every output port, sampled after the registers commit.
    pub fn step(&mut self, inputs: &SignalMap) -> Result<SignalMap, ModelError> {
        let mut applied: SmallVec<[(usize, &SignalArray); 8]> = SmallVec::new();
        for (name, value) in inputs {
            let port = self
                .netlist
                .port(name)
                .filter(|p| p.direction.is_input())
                .ok_or_else(|| ModelError::UnknownInput(name.clone()))?;
            if value.lanes() != self.lanes {
                return Err(ModelError::LaneMismatch {
                    name: name.clone(),
                    expected: self.lanes,
                    got: value.lanes(),
                });
            }
            applied.push((port.wire.index(), value));
        }
        for (w, value) in applied {
            match self.held_slot[w] {
                Some(slot) => self.held[slot].1.copy_from(value),
                None => self.wires[w].copy_from(value),
            }
        }
        for (w, value) in &self.held {
            self.wires[*w].copy_from(value);
            if let Some(m) = &self.forces[*w] {
                m.apply(&mut self.wires[*w]);
            }
        }
        for r in &self.regs {
            self.wires[r.q].copy_from(self.bank.q(r.id));
            if let Some(m) = &self.forces[r.q] {
                m.apply(&mut self.wires[r.q]);
            }
        }

        for g in &self.gates {
            let out = {
                let ins: SmallVec<[&SignalArray; 4]> = g.inputs.iter().map(|&i| &self.wires[i]).collect();
                kernels::reduce(&ins, g.op, g.invert)
            };
            self.wires[g.output] = out;
            if let Some(m) = &self.forces[g.output] {
                m.apply(&mut self.wires[g.output]);
            }
        }

        {
            let updates: Vec<_> = self
                .regs
                .iter()
                .map(|r| (r.id, &self.wires[r.d], &self.wires[r.rst]))
                .collect();
            self.bank.clock_all(&updates);
        }
        for r in &self.regs {
            if let Some(m) = &self.forces[r.q] {
                m.apply(self.bank.get_mut(r.id).q_mut());
            }
            self.wires[r.q].copy_from(self.bank.q(r.id));
        }
        self.cycle += 1;

        Ok(self
            .netlist
            .outputs()
            .map(|p| (p.name.to_string(), self.wires[p.wire.index()].clone()))
            .collect())
    }

    /// Instance name and Q wire of every register, in netlist order.
    pub fn register_names(&self) -> impl Iterator<Item = (&CompactString, &str, RegId)> + '_ {
        self.netlist
            .registers()
            .zip(self.regs.iter())
            .map(|(inst, r)| (&inst.name, self.netlist.wire_name(inst.output), r.id))
    }
}
