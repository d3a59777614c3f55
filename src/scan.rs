// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Scan chains with zero-time bulk load and unload.
//!
//! A [`ScanChain`] is an ordered list of registers in a [`RegisterBank`].
//! [`ScanChain::scan_load`] writes column `i` of a pattern matrix straight
//! into register `i` for every lane at once, so loading costs one write per
//! register instead of one shift per bit. [`ScanChain::shift`] keeps the
//! conventional serial path for JTAG data registers.
//!
//! Load and unload borrow the bank mutably, so they cannot interleave with a
//! simulation step on the same registers.

use serde::{Deserialize, Serialize};

use crate::kernels;
use crate::logic::LogicValue;
use crate::register::{RegId, RegisterBank};
use crate::signal::{InitState, SignalArray};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("pattern is {rows}x{width} but the chain needs {lanes}x{len} (lanes x length)")]
    ShapeMismatch {
        rows: usize,
        width: usize,
        lanes: usize,
        len: usize,
    },
    #[error("scan chain must contain at least one register")]
    EmptyChain,
    #[error("register {0:?} appears twice in the scan chain")]
    DuplicateCell(RegId),
    #[error("register {0:?} does not exist in the bank")]
    MissingCell(RegId),
    #[error("pattern rows have different widths (row {row} has {got}, expected {expected})")]
    RaggedRows { row: usize, got: usize, expected: usize },
}

/// `lanes x width` matrix of logic values, one row per lane and one column
/// per chain position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatrix {
    rows: usize,
    width: usize,
    cells: Vec<LogicValue>,
}

impl PatternMatrix {
    pub fn filled(rows: usize, width: usize, v: LogicValue) -> PatternMatrix {
        PatternMatrix {
            rows,
            width,
            cells: vec![v; rows * width],
        }
    }

    pub fn from_rows(rows: Vec<Vec<LogicValue>>) -> Result<PatternMatrix, ScanError> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut cells = Vec::with_capacity(rows.len() * width);
        for (i, r) in rows.iter().enumerate() {
            if r.len() != width {
                return Err(ScanError::RaggedRows {
                    row: i,
                    got: r.len(),
                    expected: width,
                });
            }
            cells.extend_from_slice(r);
        }
        Ok(PatternMatrix {
            rows: rows.len(),
            width,
            cells,
        })
    }

    /// Strong pattern from 0/1 integers.
    pub fn from_bits(rows: &[Vec<u8>]) -> Result<PatternMatrix, ScanError> {
        Self::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|&b| LogicValue::from_bool(b != 0)).collect())
                .collect(),
        )
    }

    /// The same row on every lane.
    pub fn broadcast(lanes: usize, row: &[LogicValue]) -> PatternMatrix {
        let mut cells = Vec::with_capacity(lanes * row.len());
        for _ in 0..lanes {
            cells.extend_from_slice(row);
        }
        PatternMatrix {
            rows: lanes,
            width: row.len(),
            cells,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, lane: usize) -> &[LogicValue] {
        &self.cells[lane * self.width..(lane + 1) * self.width]
    }

    pub fn get(&self, lane: usize, pos: usize) -> LogicValue {
        self.cells[lane * self.width + pos]
    }

    pub fn set(&mut self, lane: usize, pos: usize, v: LogicValue) {
        self.cells[lane * self.width + pos] = v;
    }

    /// Column `pos` as a signal array across lanes.
    pub fn column(&self, pos: usize) -> SignalArray {
        let mut s = SignalArray::unknown(self.rows);
        for lane in 0..self.rows {
            s.set(lane, self.get(lane, pos));
        }
        s
    }
}

/// Ordered registers forming one logical shift register. Position 0 is
/// nearest scan-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanChain {
    cells: Vec<RegId>,
}

impl ScanChain {
    pub fn new(cells: Vec<RegId>) -> Result<ScanChain, ScanError> {
        if cells.is_empty() {
            return Err(ScanError::EmptyChain);
        }
        let mut seen = std::collections::HashSet::new();
        for &c in &cells {
            if !seen.insert(c) {
                return Err(ScanError::DuplicateCell(c));
            }
        }
        Ok(ScanChain { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[RegId] {
        &self.cells
    }

    fn check_bank(&self, bank: &RegisterBank) -> Result<(), ScanError> {
        match self.cells.iter().find(|&&c| !bank.contains(c)) {
            Some(&c) => Err(ScanError::MissingCell(c)),
            None => Ok(()),
        }
    }

    /// Write pattern column `i` into register `i`, every lane at once.
    pub fn scan_load(&self, bank: &mut RegisterBank, patterns: &PatternMatrix) -> Result<(), ScanError> {
        self.check_bank(bank)?;
        if patterns.rows() != bank.lanes() || patterns.width() != self.len() {
            return Err(ScanError::ShapeMismatch {
                rows: patterns.rows(),
                width: patterns.width(),
                lanes: bank.lanes(),
                len: self.len(),
            });
        }
        for (pos, &c) in self.cells.iter().enumerate() {
            bank.get_mut(c).load(&patterns.column(pos));
        }
        Ok(())
    }

    /// Read every register back into a pattern matrix.
    pub fn scan_unload(&self, bank: &RegisterBank) -> Result<PatternMatrix, ScanError> {
        self.check_bank(bank)?;
        let lanes = bank.lanes();
        let mut p = PatternMatrix::filled(lanes, self.len(), LogicValue::X);
        for (pos, &c) in self.cells.iter().enumerate() {
            let q = bank.q(c);
            for lane in 0..lanes {
                p.set(lane, pos, q.get(lane));
            }
        }
        Ok(p)
    }

    /// One serial shift. Lanes where `shift_en` is strong 1 move every bit
    /// one position towards scan-out and take `scan_in` at position 0; lanes
    /// where it is 0 hold. Returns the scan-out bit from before the edge.
    pub fn shift(&self, bank: &mut RegisterBank, scan_in: &SignalArray, shift_en: &SignalArray) -> SignalArray {
        let scan_out = bank.q(self.cells[self.cells.len() - 1]).clone();
        let rst = SignalArray::zeros(bank.lanes());
        let next: Vec<SignalArray> = self
            .cells
            .iter()
            .enumerate()
            .map(|(pos, &c)| {
                let d = if pos == 0 { scan_in } else { bank.q(self.cells[pos - 1]) };
                kernels::mux(shift_en, d, bank.q(c))
            })
            .collect();
        let updates: Vec<_> = self.cells.iter().zip(next.iter()).map(|(&c, d)| (c, d, &rst)).collect();
        bank.clock_all(&updates);
        scan_out
    }
}

/// A scan chain that owns its registers; the building block for JTAG data
/// and instruction registers.
#[derive(Debug, Clone)]
pub struct ScanRegister {
    bank: RegisterBank,
    chain: ScanChain,
}

impl ScanRegister {
    pub fn new(lanes: usize, len: usize, init: InitState) -> Result<ScanRegister, ScanError> {
        let mut bank = RegisterBank::new(lanes);
        let chain = ScanChain::new(bank.alloc_many(len, init))?;
        Ok(ScanRegister { bank, chain })
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn lanes(&self) -> usize {
        self.bank.lanes()
    }

    pub fn shift(&mut self, scan_in: &SignalArray, shift_en: &SignalArray) -> SignalArray {
        self.chain.shift(&mut self.bank, scan_in, shift_en)
    }

    /// Parallel capture: lanes where `en` is strong 1 load `values`.
    pub fn capture(&mut self, values: &[SignalArray], en: &SignalArray) {
        for (&c, v) in self.chain.cells().iter().zip(values) {
            kernels::merge(self.bank.get_mut(c).q_mut(), v, en);
        }
    }

    pub fn cell(&self, pos: usize) -> &SignalArray {
        self.bank.q(self.chain.cells()[pos])
    }

    pub fn load(&mut self, patterns: &PatternMatrix) -> Result<(), ScanError> {
        self.chain.scan_load(&mut self.bank, patterns)
    }

    pub fn unload(&self) -> PatternMatrix {
        let lanes = self.bank.lanes();
        let mut p = PatternMatrix::filled(lanes, self.len(), LogicValue::X);
        for pos in 0..self.len() {
            let q = self.cell(pos);
            for lane in 0..lanes {
                p.set(lane, pos, q.get(lane));
            }
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicValue::*;

    fn bank_with_chain(lanes: usize, len: usize) -> (RegisterBank, ScanChain) {
        let mut bank = RegisterBank::new(lanes);
        let chain = ScanChain::new(bank.alloc_many(len, InitState::Unknown)).unwrap();
        (bank, chain)
    }

    #[test]
    fn test_load_unload_three_bits() {
        let (mut bank, chain) = bank_with_chain(1, 3);
        let p = PatternMatrix::from_bits(&[vec![1, 0, 1]]).unwrap();
        chain.scan_load(&mut bank, &p).unwrap();
        let out = chain.scan_unload(&bank).unwrap();
        assert_eq!(out.row(0), &[One, Zero, One]);
        assert_eq!(out, p);
    }

    #[test]
    fn test_round_trip_with_unknowns_across_lanes() {
        let lanes = 37;
        let (mut bank, chain) = bank_with_chain(lanes, 5);
        let rows = (0..lanes)
            .map(|lane| (0..5).map(|pos| LogicValue::ALL[(lane * 3 + pos) % 4]).collect())
            .collect();
        let p = PatternMatrix::from_rows(rows).unwrap();
        chain.scan_load(&mut bank, &p).unwrap();
        assert_eq!(chain.scan_unload(&bank).unwrap(), p);
    }

    #[test]
    fn test_shape_mismatch() {
        let (mut bank, chain) = bank_with_chain(2, 3);
        let p = PatternMatrix::from_bits(&[vec![1, 0], vec![0, 1]]).unwrap();
        assert_eq!(
            chain.scan_load(&mut bank, &p),
            Err(ScanError::ShapeMismatch {
                rows: 2,
                width: 2,
                lanes: 2,
                len: 3
            })
        );
        assert!(matches!(
            PatternMatrix::from_bits(&[vec![1, 0], vec![0]]),
            Err(ScanError::RaggedRows { row: 1, .. })
        ));
    }

    #[test]
    fn test_chain_construction_errors() {
        assert_eq!(ScanChain::new(vec![]), Err(ScanError::EmptyChain));
        assert_eq!(
            ScanChain::new(vec![RegId(0), RegId(1), RegId(0)]),
            Err(ScanError::DuplicateCell(RegId(0)))
        );
        let bank = RegisterBank::new(1);
        let chain = ScanChain::new(vec![RegId(3)]).unwrap();
        assert_eq!(chain.scan_unload(&bank), Err(ScanError::MissingCell(RegId(3))));
    }

    #[test]
    fn test_serial_shift_matches_bulk_load() {
        // shifting 1,0,1 in bit by bit lands the first bit at the far end
        let (mut bank, chain) = bank_with_chain(2, 3);
        let en = SignalArray::from_bits(&[1, 0]);
        for b in [1u8, 0, 1] {
            chain.shift(&mut bank, &SignalArray::from_bits(&[b, b]), &en);
        }
        let out = chain.scan_unload(&bank).unwrap();
        assert_eq!(out.row(0), &[One, Zero, One]);
        assert_eq!(out.row(1), &[X, X, X], "disabled lane must hold");

        let out_bit = chain.shift(&mut bank, &SignalArray::zeros(2), &en);
        assert_eq!(out_bit.get(0), One);
        assert_eq!(chain.scan_unload(&bank).unwrap().row(0), &[Zero, One, Zero]);
    }

    #[test]
    fn test_scan_register_capture() {
        let mut r = ScanRegister::new(2, 2, InitState::Zero).unwrap();
        r.capture(&[SignalArray::ones(2), SignalArray::ones(2)], &SignalArray::from_bits(&[0, 1]));
        assert_eq!(r.unload().row(0), &[Zero, Zero]);
        assert_eq!(r.unload().row(1), &[One, One]);
    }
}
