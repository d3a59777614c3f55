// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! 3D-stacked dies sharing one JTAG port.
//!
//! ```text
//!            TDO ▲                      ▲ TCK/TMS/TDI
//!   Die2   [TAP | IR | BYPASS]
//!              TSV_TDO_Die2_Die1 │  │ TSV_{TCK,TMS,TDI}_Die1_Die2
//!   Die1   [TAP | IR | BYPASS]
//!              TSV_TDO_Die1_Base │  │ TSV_{TCK,TMS,TDI}_Base_Die1
//!   Base   [TAP | IR | BYPASS]
//!            TDO ▼                      ▲ pins
//! ```
//!
//! TCK and TMS are relayed unchanged; TDI passes serially through every
//! die's selected register, and TDO travels back down through the relays.
//! The latched instruction selects the data register: [`IDCODE_OPCODE`]
//! selects the 32-bit IDCODE register, every other opcode (all-ones
//! included) selects BYPASS. Test-logic reset loads all-ones.
//! Faults in a [`FaultCampaign`] that target a relay name are forced onto
//! that relay, one lane per fault.

use std::collections::HashMap;

use crate::fault::{FaultCampaign, FaultMasks};
use crate::kernels;
use crate::logic::LogicValue;
use crate::register::Register;
use crate::scan::ScanRegister;
use crate::signal::{InitState, SignalArray};

use super::{TapController, TapSignals, TapState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("fault targets '{0}', which is not a TSV relay of this stack")]
    UnknownRelay(String),
    #[error("a die stack needs at least one die")]
    Empty,
    #[error("instruction register must be at least 2 bits, got {0}")]
    IrTooShort(usize),
}

/// Opcode of the IDCODE instruction, right-aligned in the IR.
pub const IDCODE_OPCODE: u32 = 0b01;

/// IDCODE of a die built without [`DieWrapper::with_idcode`]. Bit 0 is the
/// mandatory marker bit.
pub const DEFAULT_IDCODE: u32 = 0x0000_0001;

const IDCODE_BITS: usize = 32;

/// Data register selected by a lane's latched instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRegister {
    Bypass,
    Idcode,
}

/// The three forward JTAG wires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JtagPins {
    pub tck: SignalArray,
    pub tms: SignalArray,
    pub tdi: SignalArray,
}

impl JtagPins {
    /// Pins with TCK high on every lane.
    pub fn clocked(tms: SignalArray, tdi: SignalArray) -> JtagPins {
        JtagPins {
            tck: SignalArray::ones(tms.lanes()),
            tms,
            tdi,
        }
    }
}

/// Outputs of one die for one step.
#[derive(Debug, Clone)]
pub struct DieIo {
    /// Forward wires for the die above.
    pub up: JtagPins,
    /// TDO towards the die below.
    pub tdo_down: SignalArray,
}

/// One die's test wrapper: a TAP, an instruction register, a bypass
/// register and an IDCODE register.
#[derive(Debug, Clone)]
pub struct DieWrapper {
    name: String,
    tap: TapController,
    ir: ScanRegister,
    instruction: Vec<Register>,
    bypass: Register,
    idcode: u32,
    id_reg: ScanRegister,
}

impl DieWrapper {
    pub fn new(name: &str, lanes: usize, ir_len: usize) -> Result<DieWrapper, StackError> {
        if ir_len < 2 {
            return Err(StackError::IrTooShort(ir_len));
        }
        let ir = ScanRegister::new(lanes, ir_len, InitState::Zero).map_err(|_| StackError::IrTooShort(ir_len))?;
        let id_reg =
            ScanRegister::new(lanes, IDCODE_BITS, InitState::Zero).map_err(|_| StackError::IrTooShort(ir_len))?;
        Ok(DieWrapper {
            name: name.to_string(),
            tap: TapController::new(lanes),
            ir,
            instruction: (0..ir_len).map(|_| Register::new(lanes, InitState::One)).collect(),
            bypass: Register::new(lanes, InitState::Zero),
            idcode: DEFAULT_IDCODE,
            id_reg,
        })
    }

    pub fn with_idcode(mut self, idcode: u32) -> DieWrapper {
        self.idcode = idcode;
        self
    }

    pub fn idcode(&self) -> u32 {
        self.idcode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tap(&self) -> &TapController {
        &self.tap
    }

    pub fn tap_mut(&mut self) -> &mut TapController {
        &mut self.tap
    }

    pub fn bypass(&self) -> &SignalArray {
        self.bypass.q()
    }

    /// Latched instruction of `lane`, LSB first out of the shift path.
    /// `None` if any bit is not strong.
    pub fn instruction(&self, lane: usize) -> Option<u32> {
        let n = self.instruction.len();
        let mut word = 0u32;
        for (k, r) in self.instruction.iter().enumerate() {
            let bit = r.q().get(lane).to_bool()?;
            word |= (bit as u32) << (n - 1 - k);
        }
        Some(word)
    }

    /// Data register selected on `lane`, `None` while the instruction is
    /// not strong.
    pub fn data_register(&self, lane: usize) -> Option<DataRegister> {
        match self.instruction(lane)? {
            IDCODE_OPCODE => Some(DataRegister::Idcode),
            _ => Some(DataRegister::Bypass),
        }
    }

    /// Lanes whose latched instruction equals [`IDCODE_OPCODE`].
    fn idcode_selected(&self, lanes: usize) -> SignalArray {
        let n = self.instruction.len();
        self.instruction
            .iter()
            .enumerate()
            .fold(SignalArray::ones(lanes), |sel, (k, r)| {
                let want = IDCODE_OPCODE.checked_shr((n - 1 - k) as u32).unwrap_or(0) & 1 == 1;
                if want {
                    kernels::and(&sel, r.q())
                } else {
                    kernels::and(&sel, &kernels::not(r.q()))
                }
            })
    }

    /// Asynchronous TRST_N: lanes that reach TEST_LOGIC_RESET go back to
    /// BYPASS.
    pub fn reset(&mut self, trst_n: &SignalArray) {
        let tlr = self.tap.reset(trst_n).test_logic_reset.clone();
        let ones = SignalArray::ones(trst_n.lanes());
        for latch in &mut self.instruction {
            kernels::merge(latch.q_mut(), &ones, &tlr);
        }
    }

    /// One TCK edge. `tdo_above` is the TDO arriving from the die above;
    /// without one, this die's own serial output is returned as TDO.
    ///
    /// Capture and shift act on the edge where the TAP is in CAPTURE or
    /// SHIFT; the instruction latches as the TAP enters UPDATE_IR.
    pub fn step_io(&mut self, pins: &JtagPins, tdo_above: Option<&SignalArray>) -> DieIo {
        let tck = &pins.tck;
        let lanes = tck.lanes();
        let pre: TapSignals = self.tap.signals().clone();
        let post: TapSignals = self.tap.step_clocked(tck, &pins.tms).clone();
        let ir_out = self.ir.cell(self.ir.len() - 1).clone();
        let bypass_out = self.bypass.q().clone();
        let id_out = self.id_reg.cell(IDCODE_BITS - 1).clone();
        let id_sel = self.idcode_selected(lanes);
        let bypass_sel = kernels::not(&id_sel);

        let capture_dr = kernels::and(&pre.capture_dr, tck);
        let shift_dr = kernels::and(&pre.shift_dr, tck);
        let bypass_capture = kernels::and(&capture_dr, &bypass_sel);
        let bypass_shift = kernels::and(&shift_dr, &bypass_sel);
        let held = kernels::mux(&bypass_capture, &SignalArray::zeros(lanes), &bypass_out);
        self.bypass.load(&kernels::mux(&bypass_shift, &pins.tdi, &held));

        // IDCODE bit 0 sits nearest TDO
        let id_bits: Vec<SignalArray> = (0..IDCODE_BITS)
            .map(|pos| {
                let bit = (self.idcode >> (IDCODE_BITS - 1 - pos)) & 1 == 1;
                SignalArray::filled(lanes, LogicValue::from_bool(bit))
            })
            .collect();
        self.id_reg.capture(&id_bits, &kernels::and(&capture_dr, &id_sel));
        self.id_reg.shift(&pins.tdi, &kernels::and(&shift_dr, &id_sel));

        // IR captures ...01 with the 1 nearest TDO
        let n = self.ir.len();
        let pattern: Vec<SignalArray> = (0..n)
            .map(|pos| {
                if pos == n - 1 {
                    SignalArray::ones(lanes)
                } else {
                    SignalArray::zeros(lanes)
                }
            })
            .collect();
        self.ir.capture(&pattern, &kernels::and(&pre.capture_ir, tck));
        self.ir.shift(&pins.tdi, &kernels::and(&pre.shift_ir, tck));
        let update_ir = kernels::and(&post.update_ir, tck);
        let ones = SignalArray::ones(lanes);
        for (pos, latch) in self.instruction.iter_mut().enumerate() {
            kernels::merge(latch.q_mut(), self.ir.cell(pos), &update_ir);
            kernels::merge(latch.q_mut(), &ones, &post.test_logic_reset);
        }

        let dr_out = kernels::mux(&id_sel, &id_out, &bypass_out);
        let local_out = kernels::mux(&pre.shift_ir, &ir_out, &dr_out);
        DieIo {
            up: JtagPins {
                tck: pins.tck.clone(),
                tms: pins.tms.clone(),
                tdi: local_out.clone(),
            },
            tdo_down: tdo_above.cloned().unwrap_or(local_out),
        }
    }
}

/// Names of the relays between die `from` and die `to`.
fn relay_name(sig: &str, from: &str, to: &str) -> String {
    format!("TSV_{}_{}_{}", sig, from, to)
}

/// A stack of dies, index 0 at the bottom (connected to the pins).
#[derive(Debug, Clone)]
pub struct DieStack {
    dies: Vec<DieWrapper>,
    faults: HashMap<String, FaultMasks>,
    history: Vec<Vec<Vec<Option<TapState>>>>,
    record: bool,
}

impl DieStack {
    pub fn new(names: &[&str], lanes: usize, ir_len: usize) -> Result<DieStack, StackError> {
        if names.is_empty() {
            return Err(StackError::Empty);
        }
        let dies = names
            .iter()
            .map(|n| DieWrapper::new(n, lanes, ir_len))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DieStack {
            history: vec![Vec::new(); dies.len()],
            dies,
            faults: HashMap::new(),
            record: false,
        })
    }

    pub fn dies(&self) -> &[DieWrapper] {
        &self.dies
    }

    pub fn die(&self, i: usize) -> &DieWrapper {
        &self.dies[i]
    }

    /// Every relay name in the stack, bottom to top.
    pub fn relay_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for w in self.dies.windows(2) {
            let (lo, hi) = (w[0].name(), w[1].name());
            for sig in ["TCK", "TMS", "TDI"] {
                names.push(relay_name(sig, lo, hi));
            }
            names.push(relay_name("TDO", hi, lo));
        }
        names
    }

    /// Route the campaign's faults onto relays. Every fault must target a
    /// relay of this stack.
    pub fn attach_campaign(&mut self, campaign: &FaultCampaign) -> Result<(), StackError> {
        let relays = self.relay_names();
        for sig in campaign.signals() {
            if !relays.iter().any(|r| r == sig) {
                return Err(StackError::UnknownRelay(sig.to_string()));
            }
        }
        self.faults = relays
            .into_iter()
            .filter_map(|r| campaign.masks_for_signal(&r).map(|m| (r, m)))
            .collect();
        clilog::debug!("attached {} faulted TSV relays", self.faults.len());
        Ok(())
    }

    /// Keep every die's per-lane TAP state after each step.
    pub fn record_trajectories(&mut self, on: bool) {
        self.record = on;
    }

    /// Recorded states of die `die`, one entry per step.
    pub fn trajectory(&self, die: usize) -> &[Vec<Option<TapState>>] {
        &self.history[die]
    }

    fn relay(&self, name: &str, mut sig: SignalArray) -> SignalArray {
        if let Some(m) = self.faults.get(name) {
            m.apply(&mut sig);
        }
        sig
    }

    /// Step the whole stack on one edge and return TDO at the pins.
    pub fn step(&mut self, pins: &JtagPins) -> SignalArray {
        let mut input = pins.clone();
        let mut locals = Vec::with_capacity(self.dies.len());
        for i in 0..self.dies.len() {
            let io = self.dies[i].step_io(&input, None);
            locals.push(io.tdo_down);
            if let Some(above) = self.dies.get(i + 1) {
                let (lo, hi) = (self.dies[i].name(), above.name());
                input = JtagPins {
                    tck: self.relay(&relay_name("TCK", lo, hi), io.up.tck),
                    tms: self.relay(&relay_name("TMS", lo, hi), io.up.tms),
                    tdi: self.relay(&relay_name("TDI", lo, hi), io.up.tdi),
                };
            }
        }
        let mut tdo = locals
            .pop()
            .unwrap_or_else(|| SignalArray::unknown(pins.tdi.lanes()));
        for i in (0..self.dies.len() - 1).rev() {
            tdo = self.relay(&relay_name("TDO", self.dies[i + 1].name(), self.dies[i].name()), tdo);
        }
        if self.record {
            for (i, d) in self.dies.iter().enumerate() {
                self.history[i].push(d.tap().states());
            }
        }
        tdo
    }

    /// Asynchronous TRST_N on every die.
    pub fn reset(&mut self, trst_n: &SignalArray) {
        for d in &mut self.dies {
            d.reset(trst_n);
        }
    }

    /// Lanes where die `die`'s TAP state differs from the gold lane.
    pub fn divergent_lanes(&self, die: usize) -> Vec<usize> {
        self.dies[die].tap().divergent_lanes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::StuckAt;
    use crate::logic::LogicValue;

    fn pins(lanes: usize, tms: u8, tdi: u8) -> JtagPins {
        let f = |b: u8| if b == 0 { SignalArray::zeros(lanes) } else { SignalArray::ones(lanes) };
        JtagPins::clocked(f(tms), f(tdi))
    }

    #[test]
    fn test_relay_names() {
        let s = DieStack::new(&["Base", "Die1"], 2, 4).unwrap();
        assert_eq!(
            s.relay_names(),
            vec!["TSV_TCK_Base_Die1", "TSV_TMS_Base_Die1", "TSV_TDI_Base_Die1", "TSV_TDO_Die1_Base"]
        );
    }

    #[test]
    fn test_tck_stuck_low_freezes_upper_die() {
        let mut stack = DieStack::new(&["Base", "Die1"], 4, 4).unwrap();
        let mut c = FaultCampaign::new(4);
        let lane = c.add_fault("TSV_TCK_Base_Die1", StuckAt::Zero).unwrap();
        stack.attach_campaign(&c).unwrap();
        stack.record_trajectories(true);

        // reset, then walk to SHIFT_DR
        for tms in [1, 1, 1, 1, 1, 0, 1, 0, 0] {
            stack.step(&pins(4, tms, 0));
        }
        assert_eq!(stack.die(0).tap().state(0), Some(TapState::ShiftDr));
        assert_eq!(stack.die(0).tap().state(lane), Some(TapState::ShiftDr));
        assert_eq!(stack.die(1).tap().state(0), Some(TapState::ShiftDr));
        assert_eq!(stack.die(1).tap().state(lane), Some(TapState::TestLogicReset));
        assert_eq!(stack.divergent_lanes(0), Vec::<usize>::new());
        assert_eq!(stack.divergent_lanes(1), vec![lane]);

        let traj = stack.trajectory(1);
        assert_eq!(traj.len(), 9);
        assert!(traj.iter().all(|t| t[lane] == Some(TapState::TestLogicReset)));
        assert_eq!(traj[5][0], Some(TapState::RunTestIdle));
    }

    #[test]
    fn test_unknown_relay_rejected() {
        let mut stack = DieStack::new(&["Base", "Die1"], 4, 4).unwrap();
        let mut c = FaultCampaign::new(4);
        c.add_fault("TSV_TCK_Die1_Die2", StuckAt::Zero).unwrap();
        assert_eq!(
            stack.attach_campaign(&c),
            Err(StackError::UnknownRelay("TSV_TCK_Die1_Die2".into()))
        );
    }

    #[test]
    fn test_bypass_path_through_two_dies() {
        let mut stack = DieStack::new(&["Base", "Die1"], 1, 4).unwrap();
        for tms in [1, 1, 1, 1, 1, 0, 1, 0] {
            stack.step(&pins(1, tms, 0));
        }
        // in CAPTURE_DR: the first edge captures, later edges shift
        let tdi = [0u8, 1, 0, 1, 1, 0, 0];
        let tdo: Vec<_> = tdi.iter().map(|&b| stack.step(&pins(1, 0, b)).get(0)).collect();
        // two bypass bits: TDO repeats TDI two edges later
        assert_eq!(&tdo[3..], &[LogicValue::One, LogicValue::Zero, LogicValue::One, LogicValue::One]);
        assert_eq!(&tdo[..3], &[LogicValue::Zero; 3]);
    }

    #[test]
    fn test_instruction_capture_and_update() {
        let mut die = DieWrapper::new("Base", 1, 4).unwrap();
        let step = |d: &mut DieWrapper, tms: u8, tdi: u8| d.step_io(&pins(1, tms, tdi), None).tdo_down.get(0);
        for tms in [1, 1, 1, 1, 1] {
            step(&mut die, tms, 0);
        }
        assert_eq!(die.instruction(0), Some(0b1111), "reset selects BYPASS");
        // RTI, SelDR, SelIR, CapIR, then capture on the edge into SHIFT_IR
        for tms in [0, 1, 1, 0, 0] {
            step(&mut die, tms, 0);
        }
        // shift in 0b0010 LSB first; the captured 01 comes out first
        let mut out = Vec::new();
        for (i, b) in [0u8, 1, 0, 0].into_iter().enumerate() {
            let tms = if i == 3 { 1 } else { 0 };
            out.push(step(&mut die, tms, b));
        }
        assert_eq!(out[0], LogicValue::One);
        assert_eq!(out[1], LogicValue::Zero);
        step(&mut die, 1, 0); // UPDATE_IR
        assert_eq!(die.instruction(0), Some(0b0010));
        assert_eq!(die.data_register(0), Some(DataRegister::Bypass));
    }

    #[test]
    fn test_idcode_instruction_selects_idcode_register() {
        let idcode = 0x1234_5679;
        let mut die = DieWrapper::new("Base", 1, 4).unwrap().with_idcode(idcode);
        let step = |d: &mut DieWrapper, tms: u8, tdi: u8| d.step_io(&pins(1, tms, tdi), None).tdo_down.get(0);
        for tms in [1, 1, 1, 1, 1, 0, 1, 1, 0, 0] {
            step(&mut die, tms, 0);
        }
        // shift IDCODE_OPCODE in LSB first, leave through EXIT1_IR into UPDATE_IR
        for (i, b) in [1u8, 0, 0, 0].into_iter().enumerate() {
            step(&mut die, if i == 3 { 1 } else { 0 }, b);
        }
        step(&mut die, 1, 0);
        assert_eq!(die.instruction(0), Some(IDCODE_OPCODE));
        assert_eq!(die.data_register(0), Some(DataRegister::Idcode));

        // SELECT_DR, CAPTURE_DR, then capture on the edge into SHIFT_DR
        for tms in [1, 0, 0] {
            step(&mut die, tms, 0);
        }
        let word = (0..32).fold(0u32, |w, i| match step(&mut die, 0, 0) {
            LogicValue::One => w | (1 << i),
            _ => w,
        });
        assert_eq!(word, idcode);
    }

    fn walk_to_shift_dr(stack: &mut DieStack, lanes: usize) {
        for tms in [1, 1, 1, 1, 1, 0, 1, 0, 0] {
            stack.step(&pins(lanes, tms, 0));
        }
    }

    #[test]
    fn test_tms_stuck_high_holds_upper_die_in_reset() {
        let mut stack = DieStack::new(&["Base", "Die1"], 4, 4).unwrap();
        let mut c = FaultCampaign::new(4);
        let lane = c.add_fault("TSV_TMS_Base_Die1", StuckAt::One).unwrap();
        stack.attach_campaign(&c).unwrap();
        walk_to_shift_dr(&mut stack, 4);
        assert_eq!(stack.die(1).tap().state(0), Some(TapState::ShiftDr));
        assert_eq!(stack.die(1).tap().state(lane), Some(TapState::TestLogicReset));
        assert_eq!(stack.divergent_lanes(0), Vec::<usize>::new());
        assert_eq!(stack.divergent_lanes(1), vec![lane]);
    }

    #[test]
    fn test_tdi_stuck_high_reaches_tdo() {
        let mut stack = DieStack::new(&["Base", "Die1"], 2, 4).unwrap();
        let mut c = FaultCampaign::new(2);
        let lane = c.add_fault("TSV_TDI_Base_Die1_SA1", StuckAt::One).unwrap();
        stack.attach_campaign(&c).unwrap();
        walk_to_shift_dr(&mut stack, 2);
        let tdo: Vec<_> = (0..4).map(|_| stack.step(&pins(2, 0, 0))).collect();
        let last = &tdo[3];
        assert_eq!(last.get(0), LogicValue::Zero);
        assert_eq!(last.get(lane), LogicValue::One);
        assert_eq!(stack.divergent_lanes(1), Vec::<usize>::new(), "TAPs still agree");
    }

    #[test]
    fn test_tdo_stuck_low_masks_data() {
        let mut stack = DieStack::new(&["Base", "Die1"], 2, 4).unwrap();
        let mut c = FaultCampaign::new(2);
        let lane = c.add_fault("TSV_TDO_Die1_Base_SA0", StuckAt::Zero).unwrap();
        stack.attach_campaign(&c).unwrap();
        walk_to_shift_dr(&mut stack, 2);
        let tdo: Vec<_> = (0..4).map(|_| stack.step(&pins(2, 0, 1))).collect();
        assert_eq!(tdo[3].get(0), LogicValue::One);
        assert!(tdo.iter().all(|t| t.get(lane) == LogicValue::Zero));
    }

    #[test]
    fn test_reset_returns_every_die_to_bypass() {
        let mut stack = DieStack::new(&["Base", "Die1"], 2, 4).unwrap();
        // reset, then RTI, SELECT_DR, SELECT_IR, CAPTURE_IR, SHIFT_IR
        for tms in [1, 1, 1, 1, 1, 0, 1, 1, 0, 0] {
            stack.step(&pins(2, tms, 0));
        }
        // eight zeros fill both IRs, then UPDATE_IR
        for i in 0..8 {
            stack.step(&pins(2, if i == 7 { 1 } else { 0 }, 0));
        }
        stack.step(&pins(2, 1, 0));
        for die in stack.dies() {
            assert_eq!(die.instruction(0), Some(0), "die {}", die.name());
            assert_eq!(die.tap().state(0), Some(TapState::UpdateIr));
        }

        stack.reset(&SignalArray::from_bits(&[0, 1]));
        for die in stack.dies() {
            assert_eq!(die.tap().state(0), Some(TapState::TestLogicReset));
            assert_eq!(die.instruction(0), Some(0b1111), "die {}", die.name());
            assert_eq!(die.data_register(0), Some(DataRegister::Bypass));
            // TRST_N high leaves the lane alone
            assert_eq!(die.tap().state(1), Some(TapState::UpdateIr));
            assert_eq!(die.instruction(1), Some(0));
        }
    }
}
