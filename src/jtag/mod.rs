// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! IEEE 1149.1 test access port, one independent controller per lane.
//!
//! Lane state is stored structure-of-arrays as a bitmask of the TAP states
//! the lane may be in. With strong TMS and TCK the mask always has exactly
//! one bit set and the controller behaves like the textbook state machine.
//! A weak TMS advances through both transitions and keeps the union; a weak
//! TCK keeps the union of holding and advancing. Five TMS=1 clocks reach
//! TEST_LOGIC_RESET from every state, so an indeterminate lane becomes
//! determinate again after a reset sequence.
//!
//! Control outputs are derived from the state after the transition: strong
//! 1 when every possible state asserts them, strong 0 when none does, X
//! otherwise.
//!
//! - [`sib`]: segment insertion bits for dynamically sized scan paths
//! - [`stack`]: die wrappers and through-silicon-via relays for 3D stacks

use rayon::prelude::*;

use crate::logic::LogicValue;
use crate::signal::{SignalArray, LANES_PER_WORD};

pub mod sib;

pub mod stack;

/// Lanes per rayon task when stepping controllers.
const PAR_MIN_LANES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TapState {
    TestLogicReset = 0,
    RunTestIdle = 1,
    SelectDrScan = 2,
    CaptureDr = 3,
    ShiftDr = 4,
    Exit1Dr = 5,
    PauseDr = 6,
    Exit2Dr = 7,
    UpdateDr = 8,
    SelectIrScan = 9,
    CaptureIr = 10,
    ShiftIr = 11,
    Exit1Ir = 12,
    PauseIr = 13,
    Exit2Ir = 14,
    UpdateIr = 15,
}

use TapState::*;

/// `NEXT[state][tms]`.
const NEXT: [[TapState; 2]; 16] = [
    [RunTestIdle, TestLogicReset], // TestLogicReset
    [RunTestIdle, SelectDrScan],   // RunTestIdle
    [CaptureDr, SelectIrScan],     // SelectDrScan
    [ShiftDr, Exit1Dr],            // CaptureDr
    [ShiftDr, Exit1Dr],            // ShiftDr
    [PauseDr, UpdateDr],           // Exit1Dr
    [PauseDr, Exit2Dr],            // PauseDr
    [ShiftDr, UpdateDr],           // Exit2Dr
    [RunTestIdle, SelectDrScan],   // UpdateDr
    [CaptureIr, TestLogicReset],   // SelectIrScan
    [ShiftIr, Exit1Ir],            // CaptureIr
    [ShiftIr, Exit1Ir],            // ShiftIr
    [PauseIr, UpdateIr],           // Exit1Ir
    [PauseIr, Exit2Ir],            // PauseIr
    [ShiftIr, UpdateIr],           // Exit2Ir
    [RunTestIdle, SelectDrScan],   // UpdateIr
];

impl TapState {
    pub const ALL: [TapState; 16] = [
        TestLogicReset,
        RunTestIdle,
        SelectDrScan,
        CaptureDr,
        ShiftDr,
        Exit1Dr,
        PauseDr,
        Exit2Dr,
        UpdateDr,
        SelectIrScan,
        CaptureIr,
        ShiftIr,
        Exit1Ir,
        PauseIr,
        Exit2Ir,
        UpdateIr,
    ];

    #[inline]
    pub fn next(self, tms: bool) -> TapState {
        NEXT[self as usize][tms as usize]
    }

    #[inline]
    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn from_index(i: u8) -> Option<TapState> {
        TapState::ALL.get(i as usize).copied()
    }
}

impl std::fmt::Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestLogicReset => "TEST_LOGIC_RESET",
            RunTestIdle => "RUN_TEST_IDLE",
            SelectDrScan => "SELECT_DR_SCAN",
            CaptureDr => "CAPTURE_DR",
            ShiftDr => "SHIFT_DR",
            Exit1Dr => "EXIT1_DR",
            PauseDr => "PAUSE_DR",
            Exit2Dr => "EXIT2_DR",
            UpdateDr => "UPDATE_DR",
            SelectIrScan => "SELECT_IR_SCAN",
            CaptureIr => "CAPTURE_IR",
            ShiftIr => "SHIFT_IR",
            Exit1Ir => "EXIT1_IR",
            PauseIr => "PAUSE_IR",
            Exit2Ir => "EXIT2_IR",
            UpdateIr => "UPDATE_IR",
        };
        write!(f, "{}", s)
    }
}

/// Map a possible-state set through one TMS value.
#[inline]
fn advance_set(set: u16, tms: bool) -> u16 {
    let mut out = 0;
    let mut rest = set;
    while rest != 0 {
        let i = rest.trailing_zeros() as usize;
        out |= NEXT[i][tms as usize].bit();
        rest &= rest - 1;
    }
    out
}

#[inline]
fn step_set(set: u16, tck: LogicValue, tms: LogicValue) -> u16 {
    let advanced = match tms.to_bool() {
        Some(b) => advance_set(set, b),
        None => advance_set(set, false) | advance_set(set, true),
    };
    match tck.to_bool() {
        Some(true) => advanced,
        Some(false) => set,
        None => set | advanced,
    }
}

/// Per-lane flag: 1 if every possible state is `state`, 0 if none is.
fn state_flag(possible: &[u16], lanes: usize, state: TapState) -> SignalArray {
    let m = state.bit();
    let (value, strength): (Vec<u32>, Vec<u32>) = possible
        .par_chunks(LANES_PER_WORD)
        .map(|chunk| {
            let (mut v, mut s) = (0u32, 0u32);
            for (i, &set) in chunk.iter().enumerate() {
                if set == m {
                    v |= 1 << i;
                    s |= 1 << i;
                } else if set & m == 0 {
                    s |= 1 << i;
                }
            }
            (v, s)
        })
        .unzip();
    SignalArray::from_raw(lanes, value, strength)
}

/// Control outputs of a TAP for the attached scan infrastructure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapSignals {
    pub test_logic_reset: SignalArray,
    pub capture_dr: SignalArray,
    pub shift_dr: SignalArray,
    pub update_dr: SignalArray,
    pub capture_ir: SignalArray,
    pub shift_ir: SignalArray,
    pub update_ir: SignalArray,
}

impl TapSignals {
    fn from_sets(possible: &[u16], lanes: usize) -> TapSignals {
        TapSignals {
            test_logic_reset: state_flag(possible, lanes, TestLogicReset),
            capture_dr: state_flag(possible, lanes, CaptureDr),
            shift_dr: state_flag(possible, lanes, ShiftDr),
            update_dr: state_flag(possible, lanes, UpdateDr),
            capture_ir: state_flag(possible, lanes, CaptureIr),
            shift_ir: state_flag(possible, lanes, ShiftIr),
            update_ir: state_flag(possible, lanes, UpdateIr),
        }
    }
}

/// Lane-parallel TAP controller.
#[derive(Debug, Clone)]
pub struct TapController {
    lanes: usize,
    possible: Vec<u16>,
    signals: TapSignals,
}

impl TapController {
    /// All lanes start in TEST_LOGIC_RESET.
    pub fn new(lanes: usize) -> TapController {
        let possible = vec![TestLogicReset.bit(); lanes];
        let signals = TapSignals::from_sets(&possible, lanes);
        TapController {
            lanes,
            possible,
            signals,
        }
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// One TCK rising edge on every lane.
    pub fn step(&mut self, tms: &SignalArray) -> &TapSignals {
        let tck = SignalArray::ones(self.lanes);
        self.step_clocked(&tck, tms)
    }

    /// Advance lanes where `tck` is 1, hold where it is 0.
    pub fn step_clocked(&mut self, tck: &SignalArray, tms: &SignalArray) -> &TapSignals {
        assert_eq!(tck.lanes(), self.lanes, "TCK lane count mismatch");
        assert_eq!(tms.lanes(), self.lanes, "TMS lane count mismatch");
        self.possible
            .par_iter_mut()
            .enumerate()
            .with_min_len(PAR_MIN_LANES)
            .for_each(|(lane, set)| {
                *set = step_set(*set, tck.get(lane), tms.get(lane));
            });
        self.refresh()
    }

    /// Asynchronous test reset, active low.
    pub fn reset(&mut self, trst_n: &SignalArray) -> &TapSignals {
        assert_eq!(trst_n.lanes(), self.lanes, "TRST_N lane count mismatch");
        for (lane, set) in self.possible.iter_mut().enumerate() {
            match trst_n.get(lane).to_bool() {
                Some(false) => *set = TestLogicReset.bit(),
                Some(true) => {}
                None => *set |= TestLogicReset.bit(),
            }
        }
        self.refresh()
    }

    fn refresh(&mut self) -> &TapSignals {
        self.signals = TapSignals::from_sets(&self.possible, self.lanes);
        &self.signals
    }

    pub fn signals(&self) -> &TapSignals {
        &self.signals
    }

    /// The state of `lane`, or `None` when it is indeterminate.
    pub fn state(&self, lane: usize) -> Option<TapState> {
        let set = self.possible[lane];
        if set.count_ones() == 1 {
            TapState::from_index(set.trailing_zeros() as u8)
        } else {
            None
        }
    }

    pub fn states(&self) -> Vec<Option<TapState>> {
        (0..self.lanes).map(|l| self.state(l)).collect()
    }

    /// Every state `lane` may be in.
    pub fn possible_states(&self, lane: usize) -> Vec<TapState> {
        let set = self.possible[lane];
        TapState::ALL.iter().copied().filter(|s| set & s.bit() != 0).collect()
    }

    /// Backdoor: place `lane` in `state`.
    pub fn set_state(&mut self, lane: usize, state: TapState) {
        self.possible[lane] = state.bit();
        self.refresh();
    }

    /// Lanes whose possible-state set differs from lane 0's.
    pub fn divergent_lanes(&self) -> Vec<usize> {
        match self.possible.first() {
            Some(&gold) => (1..self.lanes).filter(|&l| self.possible[l] != gold).collect(),
            None => Vec::new(),
        }
    }
}
