// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Lane-parallel signal storage.
//!
//! A [`SignalArray`] holds one [`LogicValue`] per lane as two packed bit
//! vectors, `value` and `strength`, 32 lanes per `u32` word. Lane `i` lives
//! at bit `i & 31` of word `i >> 5`. Bits past the last lane are kept zero
//! so whole-word comparisons stay exact.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::logic::LogicValue;

/// Number of lanes packed in one storage word.
pub const LANES_PER_WORD: usize = 32;

#[inline]
pub(crate) fn words_for(lanes: usize) -> usize {
    (lanes + LANES_PER_WORD - 1) / LANES_PER_WORD
}

/// Mask of valid lane bits in the last word.
#[inline]
fn tail_mask(lanes: usize) -> u32 {
    match lanes % LANES_PER_WORD {
        0 => u32::MAX,
        r => (1u32 << r) - 1,
    }
}

/// Initial state of a freshly created array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    Zero,
    One,
    #[default]
    Unknown,
    /// Uniform strong 0/1 per lane, drawn from a seeded generator.
    Random { seed: u64 },
}

/// N independent 4-state values, one per lane.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SignalArray {
    lanes: usize,
    pub(crate) value: Vec<u32>,
    pub(crate) strength: Vec<u32>,
}

impl SignalArray {
    fn filled_words(lanes: usize, value: u32, strength: u32) -> SignalArray {
        let n = words_for(lanes);
        let mut s = SignalArray {
            lanes,
            value: vec![value; n],
            strength: vec![strength; n],
        };
        s.clear_tail();
        s
    }

    pub fn zeros(lanes: usize) -> SignalArray {
        Self::filled_words(lanes, 0, u32::MAX)
    }

    pub fn ones(lanes: usize) -> SignalArray {
        Self::filled_words(lanes, u32::MAX, u32::MAX)
    }

    pub fn unknown(lanes: usize) -> SignalArray {
        Self::filled_words(lanes, 0, 0)
    }

    pub fn high_z(lanes: usize) -> SignalArray {
        Self::filled_words(lanes, u32::MAX, 0)
    }

    /// Every lane set to `v`.
    pub fn filled(lanes: usize, v: LogicValue) -> SignalArray {
        match v {
            LogicValue::Zero => Self::zeros(lanes),
            LogicValue::One => Self::ones(lanes),
            LogicValue::X => Self::unknown(lanes),
            LogicValue::Z => Self::high_z(lanes),
        }
    }

    /// Strong random 0/1 on every lane.
    pub fn random<R: Rng + ?Sized>(lanes: usize, rng: &mut R) -> SignalArray {
        let n = words_for(lanes);
        let mut s = SignalArray {
            lanes,
            value: (0..n).map(|_| rng.gen::<u32>()).collect(),
            strength: vec![u32::MAX; n],
        };
        s.clear_tail();
        s
    }

    pub fn with_init(lanes: usize, init: InitState) -> SignalArray {
        match init {
            InitState::Zero => Self::zeros(lanes),
            InitState::One => Self::ones(lanes),
            InitState::Unknown => Self::unknown(lanes),
            InitState::Random { seed } => {
                use rand::SeedableRng;
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                Self::random(lanes, &mut rng)
            }
        }
    }

    pub fn from_values(values: &[LogicValue]) -> SignalArray {
        let mut s = Self::unknown(values.len());
        for (lane, &v) in values.iter().enumerate() {
            s.set(lane, v);
        }
        s
    }

    /// Strong array from 0/1 integers; any non-zero entry is 1.
    pub fn from_bits(bits: &[u8]) -> SignalArray {
        let mut s = Self::zeros(bits.len());
        for (lane, &b) in bits.iter().enumerate() {
            if b != 0 {
                s.value[lane >> 5] |= 1 << (lane & 31);
            }
        }
        s
    }

    /// Strong array that is 1 on the listed lanes and 0 elsewhere.
    pub fn lane_mask(lanes: usize, set: &[usize]) -> SignalArray {
        let mut s = Self::zeros(lanes);
        for &lane in set {
            s.set(lane, LogicValue::One);
        }
        s
    }

    /// Build from raw packed words. Bits past `lanes` are cleared.
    pub fn from_raw(lanes: usize, value: Vec<u32>, strength: Vec<u32>) -> SignalArray {
        assert_eq!(value.len(), words_for(lanes), "value word count for {} lanes", lanes);
        assert_eq!(strength.len(), words_for(lanes), "strength word count for {} lanes", lanes);
        let mut s = SignalArray { lanes, value, strength };
        s.clear_tail();
        s
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    #[inline]
    pub fn words(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn value_words(&self) -> &[u32] {
        &self.value
    }

    #[inline]
    pub fn strength_words(&self) -> &[u32] {
        &self.strength
    }

    #[inline]
    pub fn get(&self, lane: usize) -> LogicValue {
        assert!(lane < self.lanes, "lane {} out of range ({} lanes)", lane, self.lanes);
        let (w, b) = (lane >> 5, lane & 31);
        LogicValue::from_bits(self.value[w] >> b & 1 != 0, self.strength[w] >> b & 1 != 0)
    }

    #[inline]
    pub fn set(&mut self, lane: usize, v: LogicValue) {
        assert!(lane < self.lanes, "lane {} out of range ({} lanes)", lane, self.lanes);
        let (w, bit) = (lane >> 5, 1u32 << (lane & 31));
        let (val, st) = v.bits();
        if val {
            self.value[w] |= bit;
        } else {
            self.value[w] &= !bit;
        }
        if st {
            self.strength[w] |= bit;
        } else {
            self.strength[w] &= !bit;
        }
    }

    pub fn to_values(&self) -> Vec<LogicValue> {
        (0..self.lanes).map(|i| self.get(i)).collect()
    }

    /// Number of lanes holding `v`.
    pub fn count(&self, v: LogicValue) -> usize {
        let (want_v, want_s) = v.bits();
        let mask = tail_mask(self.lanes);
        let last = self.words().saturating_sub(1);
        self.value
            .iter()
            .zip(self.strength.iter())
            .enumerate()
            .map(|(i, (&val, &st))| {
                let vm = if want_v { val } else { !val };
                let sm = if want_s { st } else { !st };
                let m = if i == last { mask } else { u32::MAX };
                (vm & sm & m).count_ones() as usize
            })
            .sum()
    }

    pub fn is_all_strong(&self) -> bool {
        self.count(LogicValue::Zero) + self.count(LogicValue::One) == self.lanes
    }

    /// Overwrite this array with `other`, keeping the allocation.
    pub fn copy_from(&mut self, other: &SignalArray) {
        assert_eq!(self.lanes, other.lanes, "lane count mismatch");
        self.value.copy_from_slice(&other.value);
        self.strength.copy_from_slice(&other.strength);
    }

    #[inline]
    pub(crate) fn clear_tail(&mut self) {
        if let Some(last) = self.value.len().checked_sub(1) {
            let m = tail_mask(self.lanes);
            self.value[last] &= m;
            self.strength[last] &= m;
        }
    }
}

impl std::fmt::Debug for SignalArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const SHOWN: usize = 64;
        write!(f, "SignalArray[{}](", self.lanes)?;
        for i in 0..self.lanes.min(SHOWN) {
            write!(f, "{}", self.get(i))?;
        }
        if self.lanes > SHOWN {
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_constructors() {
        for lanes in [1usize, 31, 32, 33, 100] {
            assert_eq!(SignalArray::zeros(lanes).count(LogicValue::Zero), lanes);
            assert_eq!(SignalArray::ones(lanes).count(LogicValue::One), lanes);
            assert_eq!(SignalArray::unknown(lanes).count(LogicValue::X), lanes);
            assert_eq!(SignalArray::high_z(lanes).count(LogicValue::Z), lanes);
            assert_eq!(SignalArray::zeros(lanes).words(), words_for(lanes));
        }
    }

    #[test]
    fn test_tail_bits_stay_clear() {
        let s = SignalArray::ones(33);
        assert_eq!(s.value_words()[1], 1);
        assert_eq!(s.strength_words()[1], 1);
        assert_eq!(SignalArray::high_z(33), SignalArray::from_values(&[LogicValue::Z; 33]));
    }

    #[test]
    fn test_get_set() {
        let mut s = SignalArray::zeros(70);
        s.set(69, LogicValue::Z);
        s.set(5, LogicValue::X);
        s.set(32, LogicValue::One);
        assert_eq!(s.get(69), LogicValue::Z);
        assert_eq!(s.get(5), LogicValue::X);
        assert_eq!(s.get(32), LogicValue::One);
        assert_eq!(s.get(0), LogicValue::Zero);
        assert_eq!(s.count(LogicValue::Zero), 67);
    }

    #[test]
    fn test_from_bits_and_mask() {
        let s = SignalArray::from_bits(&[0, 0, 1, 1]);
        assert_eq!(
            s.to_values(),
            vec![LogicValue::Zero, LogicValue::Zero, LogicValue::One, LogicValue::One]
        );
        let m = SignalArray::lane_mask(40, &[0, 39]);
        assert_eq!(m.count(LogicValue::One), 2);
        assert!(m.is_all_strong());
    }

    #[test]
    fn test_random_is_strong_and_seeded() {
        let a = SignalArray::with_init(1000, InitState::Random { seed: 7 });
        let b = SignalArray::with_init(1000, InitState::Random { seed: 7 });
        assert_eq!(a, b);
        assert!(a.is_all_strong());
        let ones = a.count(LogicValue::One);
        assert!(ones > 350 && ones < 650, "unbalanced random fill: {}", ones);

        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let c = SignalArray::random(5, &mut rng);
        assert_eq!(c.count(LogicValue::Zero) + c.count(LogicValue::One), 5);
    }
}
