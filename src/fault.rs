// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stuck-at fault campaigns.
//!
//! A campaign reserves one lane per fault. Lane 0 is the fault-free gold
//! reference and is never assigned:
//!
//! ```text
//! lane:   0      1        2        3      ...   N-1
//!       gold   A_SA0    A_SA1    B_SA0    ...
//! ```
//!
//! Faults are applied through [`kernels::force`] with the masks produced
//! here, so a fault touches exactly its own lane.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::kernels;
use crate::signal::SignalArray;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("fault campaign is full: {lanes} lanes hold at most {capacity} faults")]
    CapacityExhausted { lanes: usize, capacity: usize },
    #[error("fault '{0}' is already registered")]
    DuplicateFault(String),
    #[error("fault '{0}' is not registered")]
    UnknownFault(String),
    #[error("fault '{name}' is named stuck-at-{named} but registered as stuck-at-{given}")]
    StuckMismatch { name: String, named: StuckAt, given: StuckAt },
    #[error("'{0}' is not a <signal>_SA<0|1> fault name")]
    BadName(String),
}

/// The value a faulty signal is stuck at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StuckAt {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
}

impl StuckAt {
    pub fn from_bit(b: bool) -> StuckAt {
        if b {
            StuckAt::One
        } else {
            StuckAt::Zero
        }
    }

    pub fn bit(self) -> bool {
        self == StuckAt::One
    }
}

impl std::fmt::Display for StuckAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bit() as u8)
    }
}

/// Split a `<signal>_SA<0|1>` fault name into its target and stuck value.
pub fn parse_fault_name(name: &str) -> Option<(&str, StuckAt)> {
    let (signal, suffix) = name.rsplit_once('_')?;
    let stuck = match suffix {
        "SA0" | "sa0" => StuckAt::Zero,
        "SA1" | "sa1" => StuckAt::One,
        _ => return None,
    };
    if signal.is_empty() {
        return None;
    }
    Some((signal, stuck))
}

/// One registered fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub name: String,
    /// Signal the fault is injected on.
    pub signal: String,
    pub stuck: StuckAt,
    pub lane: usize,
}

/// Per-lane override masks for [`kernels::force`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultMasks {
    pub enable: SignalArray,
    pub value: SignalArray,
}

impl FaultMasks {
    pub fn new(lanes: usize) -> FaultMasks {
        FaultMasks {
            enable: SignalArray::zeros(lanes),
            value: SignalArray::zeros(lanes),
        }
    }

    fn mark(&mut self, fault: &Fault) {
        self.enable.set(fault.lane, true.into());
        self.value.set(fault.lane, fault.stuck.bit().into());
    }

    /// Force the faulty lanes of `signal`.
    #[inline]
    pub fn apply(&self, signal: &mut SignalArray) {
        kernels::force(signal, &self.enable, &self.value);
    }
}

/// A batch of stuck-at faults sharing one lane space.
#[derive(Debug, Clone)]
pub struct FaultCampaign {
    lanes: usize,
    next_lane: usize,
    faults: IndexMap<String, Fault>,
}

impl FaultCampaign {
    pub fn new(lanes: usize) -> FaultCampaign {
        FaultCampaign {
            lanes,
            next_lane: 1,
            faults: IndexMap::new(),
        }
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Maximum number of faults this campaign can hold.
    pub fn capacity(&self) -> usize {
        self.lanes.saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Reserve the next free lane for fault `name` stuck at `stuck`.
    ///
    /// A name of the form `<signal>_SA<0|1>` targets `<signal>` and its
    /// suffix must agree with `stuck`; any other name targets the signal of
    /// the same name.
    pub fn add_fault(&mut self, name: &str, stuck: StuckAt) -> Result<usize, FaultError> {
        if self.faults.contains_key(name) {
            return Err(FaultError::DuplicateFault(name.to_string()));
        }
        let signal = match parse_fault_name(name) {
            Some((_, named)) if named != stuck => {
                return Err(FaultError::StuckMismatch {
                    name: name.to_string(),
                    named,
                    given: stuck,
                })
            }
            Some((signal, _)) => signal,
            None => name,
        };
        if self.next_lane >= self.lanes {
            return Err(FaultError::CapacityExhausted {
                lanes: self.lanes,
                capacity: self.capacity(),
            });
        }
        let lane = self.next_lane;
        self.next_lane += 1;
        self.faults.insert(
            name.to_string(),
            Fault {
                name: name.to_string(),
                signal: signal.to_string(),
                stuck,
                lane,
            },
        );
        Ok(lane)
    }

    /// Register a fault whose stuck value is taken from its `_SA<0|1>` name.
    pub fn add_parsed(&mut self, name: &str) -> Result<usize, FaultError> {
        let (_, stuck) = parse_fault_name(name).ok_or_else(|| FaultError::BadName(name.to_string()))?;
        self.add_fault(name, stuck)
    }

    /// Register SA0 and SA1 on every given signal. Returns the number of
    /// faults added. On error the campaign is left as it was.
    pub fn enumerate_stuck_at<I, S>(&mut self, signals: I) -> Result<usize, FaultError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (old_len, old_next) = (self.faults.len(), self.next_lane);
        let result = signals.into_iter().try_for_each(|s| -> Result<(), FaultError> {
            let s = s.as_ref();
            self.add_fault(&format!("{}_SA0", s), StuckAt::Zero)?;
            self.add_fault(&format!("{}_SA1", s), StuckAt::One)?;
            Ok(())
        });
        if let Err(e) = result {
            self.faults.truncate(old_len);
            self.next_lane = old_next;
            return Err(e);
        }
        Ok(self.faults.len() - old_len)
    }

    pub fn get(&self, name: &str) -> Option<&Fault> {
        self.faults.get(name)
    }

    /// The fault occupying `lane`, if any.
    pub fn fault_at_lane(&self, lane: usize) -> Option<&Fault> {
        lane.checked_sub(1).and_then(|i| self.faults.get_index(i)).map(|(_, f)| f)
    }

    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.faults.values()
    }

    /// Distinct target signals, in registration order.
    pub fn signals(&self) -> Vec<&str> {
        let mut seen = indexmap::IndexSet::new();
        for f in self.faults.values() {
            seen.insert(f.signal.as_str());
        }
        seen.into_iter().collect()
    }

    /// Masks for a single fault: enabled only on that fault's lane.
    pub fn get_masks(&self, name: &str) -> Result<FaultMasks, FaultError> {
        let fault = self
            .faults
            .get(name)
            .ok_or_else(|| FaultError::UnknownFault(name.to_string()))?;
        let mut masks = FaultMasks::new(self.lanes);
        masks.mark(fault);
        Ok(masks)
    }

    /// Combined masks of every fault on `signal`, or `None` if no fault
    /// targets it.
    pub fn masks_for_signal(&self, signal: &str) -> Option<FaultMasks> {
        let mut masks: Option<FaultMasks> = None;
        for f in self.faults.values().filter(|f| f.signal == signal) {
            masks.get_or_insert_with(|| FaultMasks::new(self.lanes)).mark(f);
        }
        masks
    }

    /// Apply every fault on `signal` to `array`. Returns whether any fault
    /// targets the signal.
    pub fn inject(&self, signal: &str, array: &mut SignalArray) -> bool {
        match self.masks_for_signal(signal) {
            Some(m) => {
                m.apply(array);
                true
            }
            None => false,
        }
    }
}
