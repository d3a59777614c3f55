// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Segment insertion bits (IEEE 1687).
//!
//! A [`Sib`] splices a wrapped [`ScanSegment`] into the scan path on a per
//! lane basis. Membership is a per-lane flag, so opening or closing a
//! segment never edits the path structure. SIBs are segments themselves and
//! nest into hierarchical paths.

use crate::kernels;
use crate::register::Register;
use crate::scan::ScanRegister;
use crate::signal::{InitState, SignalArray};

use super::TapSignals;

/// Shift and update enables seen by one segment.
#[derive(Debug, Clone)]
pub struct SegmentControl {
    pub shift: SignalArray,
    pub update: SignalArray,
}

impl SegmentControl {
    /// Data-register controls for one TAP edge: shift while the TAP was in
    /// SHIFT_DR before the edge, update as it enters UPDATE_DR.
    pub fn from_tap(pre: &TapSignals, post: &TapSignals) -> SegmentControl {
        SegmentControl {
            shift: pre.shift_dr.clone(),
            update: post.update_dr.clone(),
        }
    }

    fn gated(&self, en: &SignalArray) -> SegmentControl {
        SegmentControl {
            shift: kernels::and(&self.shift, en),
            update: kernels::and(&self.update, en),
        }
    }
}

/// A piece of scan path between TDI and TDO.
pub trait ScanSegment {
    /// Clock the segment once. Returns the bit presented at TDO before the
    /// edge.
    fn clock(&mut self, tdi: &SignalArray, ctl: &SegmentControl) -> SignalArray;

    /// Number of shift positions `lane` currently adds to the path, `None`
    /// when that depends on an unknown SIB state.
    fn shift_length(&self, lane: usize) -> Option<usize>;
}

impl ScanSegment for ScanRegister {
    fn clock(&mut self, tdi: &SignalArray, ctl: &SegmentControl) -> SignalArray {
        self.shift(tdi, &ctl.shift)
    }

    fn shift_length(&self, _lane: usize) -> Option<usize> {
        Some(self.len())
    }
}

/// Path membership of a wrapped segment on one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Included,
    Bypassed,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Sib<S> {
    open: Register,
    control: SignalArray,
    segment: S,
}

impl<S: ScanSegment> Sib<S> {
    /// A closed SIB around `segment`.
    pub fn new(lanes: usize, segment: S) -> Sib<S> {
        Sib {
            open: Register::new(lanes, InitState::Zero),
            control: SignalArray::zeros(lanes),
            segment,
        }
    }

    /// Drive the control bit sampled on the next update-DR pulse.
    pub fn set_control(&mut self, control: SignalArray) {
        assert_eq!(control.lanes(), self.open.lanes(), "control lane count mismatch");
        self.control = control;
    }

    pub fn is_open(&self) -> &SignalArray {
        self.open.q()
    }

    pub fn membership(&self, lane: usize) -> Membership {
        match self.open.q().get(lane).to_bool() {
            Some(true) => Membership::Included,
            Some(false) => Membership::Bypassed,
            None => Membership::Unknown,
        }
    }

    pub fn segment(&self) -> &S {
        &self.segment
    }

    pub fn segment_mut(&mut self) -> &mut S {
        &mut self.segment
    }
}

impl<S: ScanSegment> ScanSegment for Sib<S> {
    fn clock(&mut self, tdi: &SignalArray, ctl: &SegmentControl) -> SignalArray {
        let open = self.open.q().clone();
        let inner = self.segment.clock(tdi, &ctl.gated(&open));
        let tdo = kernels::mux(&open, &inner, tdi);
        let toggle = kernels::and(&ctl.update, &self.control);
        self.open.load(&kernels::xor(&open, &toggle));
        tdo
    }

    /// An open SIB adds exactly its wrapped segment's positions; the SIB
    /// cell itself is not a shift stage (closed, TDO = TDI). A one-cell
    /// segment therefore adds the single unit of an IEEE 1687 insertion.
    fn shift_length(&self, lane: usize) -> Option<usize> {
        match self.membership(lane) {
            Membership::Included => self.segment.shift_length(lane),
            Membership::Bypassed => Some(0),
            Membership::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::LogicValue;

    fn ctl(lanes: usize, shift: bool, update: bool) -> SegmentControl {
        let f = |b| if b { SignalArray::ones(lanes) } else { SignalArray::zeros(lanes) };
        SegmentControl {
            shift: f(shift),
            update: f(update),
        }
    }

    fn sib(lanes: usize, len: usize) -> Sib<ScanRegister> {
        Sib::new(lanes, ScanRegister::new(lanes, len, InitState::Zero).unwrap())
    }

    #[test]
    fn test_closed_sib_is_transparent() {
        let mut s = sib(2, 2);
        let tdi = SignalArray::from_bits(&[1, 0]);
        assert_eq!(s.clock(&tdi, &ctl(2, true, false)), tdi);
        assert_eq!(s.shift_length(0), Some(0));
        assert_eq!(s.membership(1), Membership::Bypassed);
        assert_eq!(s.segment().unload().row(0), &[LogicValue::Zero, LogicValue::Zero]);
    }

    #[test]
    fn test_update_with_control_toggles_per_lane() {
        let mut s = sib(2, 2);
        s.set_control(SignalArray::from_bits(&[1, 0]));
        s.clock(&SignalArray::zeros(2), &ctl(2, false, true));
        assert_eq!(s.membership(0), Membership::Included);
        assert_eq!(s.membership(1), Membership::Bypassed);
        assert_eq!(s.shift_length(0), Some(2));
        assert_eq!(s.shift_length(1), Some(0));

        // second pulse closes it again
        s.clock(&SignalArray::zeros(2), &ctl(2, false, true));
        assert_eq!(s.membership(0), Membership::Bypassed);
    }

    #[test]
    fn test_open_sib_inserts_segment() {
        let mut s = sib(2, 2);
        s.set_control(SignalArray::from_bits(&[1, 0]));
        s.clock(&SignalArray::zeros(2), &ctl(2, false, true));
        s.set_control(SignalArray::zeros(2));

        let ones = SignalArray::ones(2);
        let shift = ctl(2, true, false);
        let outs: Vec<_> = (0..3).map(|_| s.clock(&ones, &shift)).collect();
        // lane 0 sees the two reset cells before the first 1 arrives
        assert_eq!(
            outs.iter().map(|o| o.get(0)).collect::<Vec<_>>(),
            vec![LogicValue::Zero, LogicValue::Zero, LogicValue::One]
        );
        assert!(outs.iter().all(|o| o.get(1) == LogicValue::One));
    }

    #[test]
    fn test_sib_driven_by_tap() {
        use crate::jtag::TapController;
        let mut tap = TapController::new(1);
        let mut s = sib(1, 2);
        s.set_control(SignalArray::ones(1));
        // RTI, SelDR, CapDR, Exit1DR, UpdDR
        for tms in [0u8, 1, 0, 1, 1] {
            let pre = tap.signals().clone();
            let post = tap.step(&SignalArray::from_bits(&[tms])).clone();
            s.clock(&SignalArray::zeros(1), &SegmentControl::from_tap(&pre, &post));
        }
        assert_eq!(s.membership(0), Membership::Included);
        assert_eq!(s.shift_length(0), Some(2));
    }

    #[test]
    fn test_nested_sibs_and_unknown_membership() {
        let mut outer = Sib::new(1, sib(1, 3));
        assert_eq!(outer.shift_length(0), Some(0));
        outer.set_control(SignalArray::ones(1));
        outer.clock(&SignalArray::zeros(1), &ctl(1, false, true));
        assert_eq!(outer.shift_length(0), Some(0), "inner still closed");
        outer.set_control(SignalArray::zeros(1));
        outer.segment_mut().set_control(SignalArray::ones(1));
        outer.clock(&SignalArray::zeros(1), &ctl(1, false, true));
        assert_eq!(outer.shift_length(0), Some(3));

        let mut s = sib(1, 1);
        s.set_control(SignalArray::filled(1, LogicValue::X));
        s.clock(&SignalArray::zeros(1), &ctl(1, false, true));
        assert_eq!(s.membership(0), Membership::Unknown);
        assert_eq!(s.shift_length(0), None);
    }
}
