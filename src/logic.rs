// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! 4-state logic values and their two-bit encoding.
//!
//! Every value is stored as a (value, strength) bit pair:
//!
//! ```text
//! state | value | strength
//! ------+-------+---------
//!   0   |   0   |    1
//!   1   |   1   |    1
//!   X   |   0   |    0
//!   Z   |   1   |    0
//! ```
//!
//! The value bit carries no meaning when strength is 0. The scalar operators
//! here are the reference truth tables; [`crate::kernels`] implements the
//! same rules on packed words and is tested against them.

use serde::{Deserialize, Serialize};

/// One 4-state logic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicValue {
    /// Strong 0.
    Zero,
    /// Strong 1.
    One,
    /// Unknown (weak, value bit 0).
    #[default]
    X,
    /// High impedance (weak, value bit 1).
    Z,
}

impl LogicValue {
    /// All four states in the conventional 0, 1, X, Z order.
    pub const ALL: [LogicValue; 4] = [LogicValue::Zero, LogicValue::One, LogicValue::X, LogicValue::Z];

    /// Decode a (value, strength) bit pair.
    #[inline]
    pub fn from_bits(value: bool, strength: bool) -> LogicValue {
        match (value, strength) {
            (false, true) => LogicValue::Zero,
            (true, true) => LogicValue::One,
            (false, false) => LogicValue::X,
            (true, false) => LogicValue::Z,
        }
    }

    /// Encode to a (value, strength) bit pair.
    #[inline]
    pub fn bits(self) -> (bool, bool) {
        match self {
            LogicValue::Zero => (false, true),
            LogicValue::One => (true, true),
            LogicValue::X => (false, false),
            LogicValue::Z => (true, false),
        }
    }

    #[inline]
    pub fn from_bool(b: bool) -> LogicValue {
        if b {
            LogicValue::One
        } else {
            LogicValue::Zero
        }
    }

    #[inline]
    pub fn is_strong(self) -> bool {
        matches!(self, LogicValue::Zero | LogicValue::One)
    }

    /// The boolean value of a strong state, `None` for X and Z.
    #[inline]
    pub fn to_bool(self) -> Option<bool> {
        match self {
            LogicValue::Zero => Some(false),
            LogicValue::One => Some(true),
            _ => None,
        }
    }

    pub fn and(self, other: LogicValue) -> LogicValue {
        use LogicValue::*;
        match (self, other) {
            (Zero, _) | (_, Zero) => Zero,
            (One, One) => One,
            _ => X,
        }
    }

    pub fn or(self, other: LogicValue) -> LogicValue {
        use LogicValue::*;
        match (self, other) {
            (One, _) | (_, One) => One,
            (Zero, Zero) => Zero,
            _ => X,
        }
    }

    pub fn xor(self, other: LogicValue) -> LogicValue {
        match (self.to_bool(), other.to_bool()) {
            (Some(a), Some(b)) => LogicValue::from_bool(a ^ b),
            _ => LogicValue::X,
        }
    }

    /// Inversion. Weak inputs (X and Z) both invert to X.
    pub fn not(self) -> LogicValue {
        match self.to_bool() {
            Some(a) => LogicValue::from_bool(!a),
            None => LogicValue::X,
        }
    }

    /// Buffer. Strong values pass, weak values become X.
    pub fn buf(self) -> LogicValue {
        if self.is_strong() {
            self
        } else {
            LogicValue::X
        }
    }

    /// 2:1 multiplexer: `sel` = 1 picks `a`, 0 picks `b`. With a weak select
    /// the output is defined only when both data inputs agree and are strong.
    pub fn mux(sel: LogicValue, a: LogicValue, b: LogicValue) -> LogicValue {
        match sel {
            LogicValue::One => a,
            LogicValue::Zero => b,
            _ if a == b && a.is_strong() => a,
            _ => LogicValue::X,
        }
    }

    /// Next state of a clocked register given data `d` and reset `r`.
    ///
    /// A weak reset wins over everything and yields X; a strong-1 reset
    /// clears; otherwise `d` is copied verbatim (including Z).
    pub fn register_next(d: LogicValue, r: LogicValue) -> LogicValue {
        match r {
            LogicValue::X | LogicValue::Z => LogicValue::X,
            LogicValue::One => LogicValue::Zero,
            LogicValue::Zero => d,
        }
    }

    /// VCD scalar code.
    pub fn to_char(self) -> char {
        match self {
            LogicValue::Zero => '0',
            LogicValue::One => '1',
            LogicValue::X => 'x',
            LogicValue::Z => 'z',
        }
    }

    pub fn from_char(c: char) -> Option<LogicValue> {
        match c {
            '0' => Some(LogicValue::Zero),
            '1' => Some(LogicValue::One),
            'x' | 'X' => Some(LogicValue::X),
            'z' | 'Z' => Some(LogicValue::Z),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl std::str::FromStr for LogicValue {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => LogicValue::from_char(c)
                .ok_or_else(|| format!("Invalid logic value '{}', expected 0/1/x/z", s)),
            _ => Err(format!("Invalid logic value '{}', expected 0/1/x/z", s)),
        }
    }
}

impl From<bool> for LogicValue {
    fn from(b: bool) -> Self {
        LogicValue::from_bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicValue::*;

    #[test]
    fn test_encoding_table() {
        assert_eq!(Zero.bits(), (false, true));
        assert_eq!(One.bits(), (true, true));
        assert_eq!(X.bits(), (false, false));
        assert_eq!(Z.bits(), (true, false));
        for v in LogicValue::ALL {
            let (val, st) = v.bits();
            assert_eq!(LogicValue::from_bits(val, st), v);
        }
    }

    #[test]
    fn test_commutativity() {
        for a in LogicValue::ALL {
            for b in LogicValue::ALL {
                assert_eq!(a.and(b), b.and(a), "AND({a},{b})");
                assert_eq!(a.or(b), b.or(a), "OR({a},{b})");
                assert_eq!(a.xor(b), b.xor(a), "XOR({a},{b})");
            }
        }
    }

    #[test]
    fn test_controlling_values() {
        for v in LogicValue::ALL {
            assert_eq!(Zero.and(v), Zero, "AND(0,{v})");
            assert_eq!(One.or(v), One, "OR(1,{v})");
        }
        assert_eq!(One.and(One), One);
        assert_eq!(One.and(Z), X);
        assert_eq!(Zero.or(Zero), Zero);
        assert_eq!(Zero.or(X), X);
    }

    #[test]
    fn test_xor_strength() {
        for a in LogicValue::ALL {
            for b in LogicValue::ALL {
                let r = a.xor(b);
                assert_eq!(r.is_strong(), a.is_strong() && b.is_strong(), "XOR({a},{b})");
                if !r.is_strong() {
                    assert_eq!(r, X);
                }
            }
        }
        assert_eq!(One.xor(Zero), One);
        assert_eq!(One.xor(One), Zero);
    }

    #[test]
    fn test_not_weak_inputs_become_unknown() {
        assert_eq!(X.not(), X);
        assert_eq!(Z.not(), X);
        assert_eq!(Zero.not(), One);
        assert_eq!(One.not(), Zero);
        for v in [Zero, One] {
            assert_eq!(v.not().not(), v);
        }
        // never produces Z
        for v in LogicValue::ALL {
            assert_ne!(v.not(), Z);
        }
    }

    #[test]
    fn test_register_next_priority() {
        for d in LogicValue::ALL {
            assert_eq!(LogicValue::register_next(d, X), X);
            assert_eq!(LogicValue::register_next(d, Z), X);
            assert_eq!(LogicValue::register_next(d, One), Zero);
            assert_eq!(LogicValue::register_next(d, Zero), d);
        }
    }

    #[test]
    fn test_mux() {
        assert_eq!(LogicValue::mux(One, Z, Zero), Z);
        assert_eq!(LogicValue::mux(Zero, Z, Zero), Zero);
        assert_eq!(LogicValue::mux(X, One, One), One);
        assert_eq!(LogicValue::mux(X, One, Zero), X);
        assert_eq!(LogicValue::mux(Z, X, X), X);
    }

    #[test]
    fn test_parse() {
        assert_eq!("x".parse::<LogicValue>().unwrap(), X);
        assert_eq!("Z".parse::<LogicValue>().unwrap(), Z);
        assert_eq!(" 1 ".parse::<LogicValue>().unwrap(), One);
        assert!("2".parse::<LogicValue>().is_err());
        assert!("01".parse::<LogicValue>().is_err());
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(LogicValue::default(), X);
        assert_eq!(LogicValue::default().bits(), (false, false));
    }
}
