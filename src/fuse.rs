// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-time-programmable fuse banks.
//!
//! Fuses only move from 0 to 1 and are always strong. The bank also models
//! the sense amplifiers of an eFuse macro: [`FuseBank::step`] burns and
//! senses in one clock, and the sensed outputs hold between reads.

use crate::kernels;
use crate::logic::LogicValue;
use crate::register::Register;
use crate::signal::{InitState, SignalArray};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuseError {
    #[error("fuse bit {bit} is out of range (bank has {len} bits)")]
    OutOfRange { bit: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct FuseBank {
    fuses: Vec<Register>,
    sense: Vec<Register>,
}

impl FuseBank {
    pub fn new(bits: usize, lanes: usize) -> FuseBank {
        FuseBank {
            fuses: (0..bits).map(|_| Register::new(lanes, InitState::Zero)).collect(),
            sense: (0..bits).map(|_| Register::new(lanes, InitState::Zero)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fuses.is_empty()
    }

    fn check(&self, bit: usize) -> Result<(), FuseError> {
        if bit < self.fuses.len() {
            Ok(())
        } else {
            Err(FuseError::OutOfRange { bit, len: self.fuses.len() })
        }
    }

    /// Burn `write_data` into fuse `bit` on lanes with `program_enable`.
    ///
    /// # Panics
    /// If `bit` is out of range.
    pub fn program(&mut self, bit: usize, program_enable: &SignalArray, write_data: &SignalArray) {
        kernels::burn(self.fuses[bit].q_mut(), program_enable, write_data);
    }

    /// Raw fuse state of `bit`.
    ///
    /// # Panics
    /// If `bit` is out of range.
    pub fn read(&self, bit: usize) -> &SignalArray {
        self.fuses[bit].q()
    }

    /// One clock of the fuse macro.
    ///
    /// Lanes with `prog_en` burn `wdata` into fuse `addr`. Then the sense
    /// outputs of every bit reload from the fuses where `read_en` is 1, hold
    /// where it is 0 and go X where it is weak.
    pub fn step(
        &mut self,
        read_en: &SignalArray,
        prog_en: &SignalArray,
        addr: usize,
        wdata: &SignalArray,
    ) -> Result<(), FuseError> {
        self.check(addr)?;
        self.program(addr, prog_en, wdata);
        for (fuse, sense) in self.fuses.iter().zip(self.sense.iter_mut()) {
            let next = kernels::mux(read_en, fuse.q(), sense.q());
            sense.load(&next);
        }
        Ok(())
    }

    /// Sensed output of `bit`, as seen by the logic reading the macro.
    pub fn q(&self, bit: usize) -> &SignalArray {
        self.sense[bit].q()
    }

    /// Burn fuse `bit` directly on the lanes in `lane_mask`, bypassing the
    /// programming interface.
    pub fn backdoor_burn(&mut self, bit: usize, lane_mask: &SignalArray) -> Result<(), FuseError> {
        self.check(bit)?;
        let ones = SignalArray::ones(lane_mask.lanes());
        kernels::burn(self.fuses[bit].q_mut(), lane_mask, &ones);
        Ok(())
    }

    pub fn backdoor_read(&self) -> Vec<SignalArray> {
        self.fuses.iter().map(|f| f.q().clone()).collect()
    }

    /// Whole-bank reset to the unprogrammed state.
    pub fn reset(&mut self) {
        for r in self.fuses.iter_mut().chain(self.sense.iter_mut()) {
            let lanes = r.lanes();
            r.load(&SignalArray::filled(lanes, LogicValue::Zero));
        }
    }
}
