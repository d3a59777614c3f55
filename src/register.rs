// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Clocked storage.
//!
//! One [`Register`] holds the Q state of a single storage bit across all
//! lanes. Components that share registers (scan chains, the debug port, the
//! compiled model) refer to them through [`RegId`]s into a [`RegisterBank`].

use crate::kernels;
use crate::signal::{InitState, SignalArray};

/// A clocked 1-bit storage element across all lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    q: SignalArray,
}

impl Register {
    pub fn new(lanes: usize, init: InitState) -> Register {
        Register {
            q: SignalArray::with_init(lanes, init),
        }
    }

    pub fn from_q(q: SignalArray) -> Register {
        Register { q }
    }

    #[inline]
    pub fn q(&self) -> &SignalArray {
        &self.q
    }

    #[inline]
    pub fn q_mut(&mut self) -> &mut SignalArray {
        &mut self.q
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.q.lanes()
    }

    /// Apply one clock edge with data `d` and reset `r`.
    pub fn clock(&mut self, d: &SignalArray, r: &SignalArray) {
        kernels::register_update(&mut self.q, d, r);
    }

    /// Replace the state wholesale.
    pub fn load(&mut self, q: &SignalArray) {
        self.q.copy_from(q);
    }
}

/// Index of a register inside a [`RegisterBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(pub u32);

impl RegId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of registers sharing one lane count.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    lanes: usize,
    regs: Vec<Register>,
}

impl RegisterBank {
    pub fn new(lanes: usize) -> RegisterBank {
        RegisterBank { lanes, regs: Vec::new() }
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn alloc(&mut self, init: InitState) -> RegId {
        let id = RegId(self.regs.len() as u32);
        self.regs.push(Register::new(self.lanes, init));
        id
    }

    /// Allocate `n` consecutive registers.
    pub fn alloc_many(&mut self, n: usize, init: InitState) -> Vec<RegId> {
        (0..n).map(|_| self.alloc(init)).collect()
    }

    pub fn contains(&self, id: RegId) -> bool {
        id.index() < self.regs.len()
    }

    pub fn get(&self, id: RegId) -> &Register {
        &self.regs[id.index()]
    }

    pub fn get_mut(&mut self, id: RegId) -> &mut Register {
        &mut self.regs[id.index()]
    }

    pub fn q(&self, id: RegId) -> &SignalArray {
        self.regs[id.index()].q()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegId, &Register)> {
        self.regs.iter().enumerate().map(|(i, r)| (RegId(i as u32), r))
    }

    /// Clock a set of registers on the same edge.
    ///
    /// Every next state is computed before any is committed, so `updates`
    /// may be given in any order.
    pub fn clock_all(&mut self, updates: &[(RegId, &SignalArray, &SignalArray)]) {
        let next: Vec<SignalArray> = updates
            .iter()
            .map(|&(_, d, r)| kernels::register_next(d, r))
            .collect();
        for (&(id, _, _), q) in updates.iter().zip(next) {
            self.regs[id.index()].q = q;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::LogicValue;

    #[test]
    fn test_flip_flop_recovers_after_unknown_reset() {
        let mut ff = Register::new(1, InitState::Zero);
        let d = SignalArray::ones(1);
        ff.clock(&d, &SignalArray::unknown(1));
        assert_eq!(ff.q().get(0), LogicValue::X);
        ff.clock(&d, &SignalArray::zeros(1));
        assert_eq!(ff.q().get(0), LogicValue::One);
    }

    #[test]
    fn test_reset_clears_any_data() {
        let mut ff = Register::new(4, InitState::One);
        let d = SignalArray::from_values(&LogicValue::ALL);
        ff.clock(&d, &SignalArray::ones(4));
        assert_eq!(ff.q(), &SignalArray::zeros(4));
    }

    #[test]
    fn test_clock_all_is_synchronous() {
        // three-stage shift register: r0 <- in, r1 <- r0, r2 <- r1
        let mut bank = RegisterBank::new(2);
        let ids = bank.alloc_many(3, InitState::Zero);
        let rst = SignalArray::zeros(2);
        let input = SignalArray::from_bits(&[1, 0]);
        for _ in 0..2 {
            let q0 = bank.q(ids[0]).clone();
            let q1 = bank.q(ids[1]).clone();
            bank.clock_all(&[(ids[2], &q1, &rst), (ids[1], &q0, &rst), (ids[0], &input, &rst)]);
        }
        assert_eq!(bank.q(ids[0]).get(0), LogicValue::One);
        assert_eq!(bank.q(ids[1]).get(0), LogicValue::One);
        assert_eq!(bank.q(ids[2]).get(0), LogicValue::Zero);
        assert_eq!(bank.q(ids[1]).get(1), LogicValue::Zero);
    }
}
