// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Lane-parallel 4-state evaluation kernels.
//!
//! Each kernel is a pure function of one packed word (32 lanes) per operand,
//! so a word maps to one execution unit with no cross-word traffic. Words
//! are distributed over the rayon pool once an array is large enough to pay
//! for the fork.
//!
//! Word-level encoding, with `v`/`s` the value and strength words:
//!
//! ```text
//! strong 0 = s & !v      strong 1 = s & v      weak = !s
//! ```
//!
//! Weak results are always written as X (value bit 0).
//!
//! [`force`], [`register_update`], [`merge`] and [`burn`] are the only
//! in-place kernels; everything else allocates a fresh output array.

use rayon::prelude::*;

use crate::signal::SignalArray;

/// Arrays shorter than this many words are processed on the calling thread.
pub const PAR_MIN_WORDS: usize = 512;

/// A kernel on one word pair: `(av, as, bv, bs) -> (v, s)`.
pub type WordOp2 = fn(u32, u32, u32, u32) -> (u32, u32);

#[inline]
pub fn and_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let a1 = as_ & av;
    let b1 = bs & bv;
    let a0 = as_ & !av;
    let b0 = bs & !bv;
    let one = a1 & b1;
    (one, a0 | b0 | one)
}

#[inline]
pub fn or_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let a1 = as_ & av;
    let b1 = bs & bv;
    let a0 = as_ & !av;
    let b0 = bs & !bv;
    let one = a1 | b1;
    (one, one | (a0 & b0))
}

#[inline]
pub fn xor_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let both = as_ & bs;
    ((av ^ bv) & both, both)
}

/// Strong values invert; X and Z both become X.
#[inline]
pub fn not_word(av: u32, as_: u32) -> (u32, u32) {
    (!av & as_, as_)
}

#[inline]
pub fn buf_word(av: u32, as_: u32) -> (u32, u32) {
    (av & as_, as_)
}

#[inline]
pub fn nand_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let (v, s) = and_word(av, as_, bv, bs);
    not_word(v, s)
}

#[inline]
pub fn nor_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let (v, s) = or_word(av, as_, bv, bs);
    not_word(v, s)
}

#[inline]
pub fn xnor_word(av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let (v, s) = xor_word(av, as_, bv, bs);
    not_word(v, s)
}

/// `sel` strong 1 picks `a`, strong 0 picks `b`; a weak select is defined
/// only where `a` and `b` agree and are strong.
#[inline]
pub fn mux_word(sv: u32, ss: u32, av: u32, as_: u32, bv: u32, bs: u32) -> (u32, u32) {
    let s1 = ss & sv;
    let s0 = ss & !sv;
    let sw = !ss;
    let agree = as_ & bs & !(av ^ bv);
    (
        (s1 & av) | (s0 & bv) | (sw & agree & av),
        (s1 & as_) | (s0 & bs) | (sw & agree),
    )
}

/// Next Q: weak reset gives X, strong-1 reset gives 0, else D verbatim.
#[inline]
pub fn register_next_word(dv: u32, ds: u32, rv: u32, rs: u32) -> (u32, u32) {
    let reset = rs & rv;
    let pass = rs & !rv;
    (pass & dv, reset | (pass & ds))
}

fn map1(a: &SignalArray, f: fn(u32, u32) -> (u32, u32)) -> SignalArray {
    let (value, strength): (Vec<u32>, Vec<u32>) = (0..a.words())
        .into_par_iter()
        .with_min_len(PAR_MIN_WORDS)
        .map(|w| f(a.value[w], a.strength[w]))
        .unzip();
    SignalArray::from_raw(a.lanes(), value, strength)
}

fn map2(a: &SignalArray, b: &SignalArray, f: WordOp2) -> SignalArray {
    assert_eq!(a.lanes(), b.lanes(), "operand lane count mismatch");
    let (value, strength): (Vec<u32>, Vec<u32>) = (0..a.words())
        .into_par_iter()
        .with_min_len(PAR_MIN_WORDS)
        .map(|w| f(a.value[w], a.strength[w], b.value[w], b.strength[w]))
        .unzip();
    SignalArray::from_raw(a.lanes(), value, strength)
}

pub fn and(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, and_word)
}

pub fn or(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, or_word)
}

pub fn xor(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, xor_word)
}

pub fn not(a: &SignalArray) -> SignalArray {
    map1(a, not_word)
}

pub fn buf(a: &SignalArray) -> SignalArray {
    map1(a, buf_word)
}

pub fn nand(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, nand_word)
}

pub fn nor(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, nor_word)
}

pub fn xnor(a: &SignalArray, b: &SignalArray) -> SignalArray {
    map2(a, b, xnor_word)
}

/// Left fold of `op` over two or more operands, optionally inverting the
/// result. Every word walks all operands once, so an n-input gate costs one
/// pass over memory instead of n-1 intermediate arrays.
pub fn reduce(inputs: &[&SignalArray], op: WordOp2, invert: bool) -> SignalArray {
    assert!(!inputs.is_empty(), "reduce over zero operands");
    let lanes = inputs[0].lanes();
    for x in inputs {
        assert_eq!(x.lanes(), lanes, "operand lane count mismatch");
    }
    let (value, strength): (Vec<u32>, Vec<u32>) = (0..inputs[0].words())
        .into_par_iter()
        .with_min_len(PAR_MIN_WORDS)
        .map(|w| {
            let (mut v, mut s) = (inputs[0].value[w], inputs[0].strength[w]);
            for x in &inputs[1..] {
                (v, s) = op(v, s, x.value[w], x.strength[w]);
            }
            if invert {
                not_word(v, s)
            } else if inputs.len() == 1 {
                buf_word(v, s)
            } else {
                (v, s)
            }
        })
        .unzip();
    SignalArray::from_raw(lanes, value, strength)
}

pub fn mux(sel: &SignalArray, a: &SignalArray, b: &SignalArray) -> SignalArray {
    assert_eq!(sel.lanes(), a.lanes(), "operand lane count mismatch");
    assert_eq!(sel.lanes(), b.lanes(), "operand lane count mismatch");
    let (value, strength): (Vec<u32>, Vec<u32>) = (0..sel.words())
        .into_par_iter()
        .with_min_len(PAR_MIN_WORDS)
        .map(|w| {
            mux_word(
                sel.value[w],
                sel.strength[w],
                a.value[w],
                a.strength[w],
                b.value[w],
                b.strength[w],
            )
        })
        .unzip();
    SignalArray::from_raw(sel.lanes(), value, strength)
}

/// Next register state from data `d` and reset `r`.
pub fn register_next(d: &SignalArray, r: &SignalArray) -> SignalArray {
    map2(d, r, register_next_word)
}

/// In-place register update: `q = register_next(d, r)`.
pub fn register_update(q: &mut SignalArray, d: &SignalArray, r: &SignalArray) {
    assert_eq!(q.lanes(), d.lanes(), "operand lane count mismatch");
    assert_eq!(q.lanes(), r.lanes(), "operand lane count mismatch");
    let SignalArray { value, strength, .. } = q;
    value
        .par_iter_mut()
        .zip(strength.par_iter_mut())
        .enumerate()
        .with_min_len(PAR_MIN_WORDS)
        .for_each(|(w, (qv, qs))| {
            (*qv, *qs) = register_next_word(d.value[w], d.strength[w], r.value[w], r.strength[w]);
        });
}

/// Backdoor override: lanes where `enable` is strong 1 become the value bit
/// of `value`, strong. Other lanes are untouched.
pub fn force(target: &mut SignalArray, enable: &SignalArray, value: &SignalArray) {
    assert_eq!(target.lanes(), enable.lanes(), "operand lane count mismatch");
    assert_eq!(target.lanes(), value.lanes(), "operand lane count mismatch");
    let SignalArray { value: tv, strength: ts, .. } = target;
    tv.par_iter_mut()
        .zip(ts.par_iter_mut())
        .enumerate()
        .with_min_len(PAR_MIN_WORDS)
        .for_each(|(w, (v, s))| {
            let en = enable.value[w] & enable.strength[w];
            *v = (*v & !en) | (value.value[w] & en);
            *s |= en;
        });
}

/// Lanes where `mask` is strong 1 take `src` verbatim (value and strength).
pub fn merge(target: &mut SignalArray, src: &SignalArray, mask: &SignalArray) {
    assert_eq!(target.lanes(), src.lanes(), "operand lane count mismatch");
    assert_eq!(target.lanes(), mask.lanes(), "operand lane count mismatch");
    let SignalArray { value: tv, strength: ts, .. } = target;
    tv.par_iter_mut()
        .zip(ts.par_iter_mut())
        .enumerate()
        .with_min_len(PAR_MIN_WORDS)
        .for_each(|(w, (v, s))| {
            let en = mask.value[w] & mask.strength[w];
            *v = (*v & !en) | (src.value[w] & en);
            *s = (*s & !en) | (src.strength[w] & en);
        });
}

/// One-time-programmable update: `fuse |= enable & data`, counting only
/// lanes where both are strong 1. The result is always strong.
pub fn burn(fuse: &mut SignalArray, enable: &SignalArray, data: &SignalArray) {
    assert_eq!(fuse.lanes(), enable.lanes(), "operand lane count mismatch");
    assert_eq!(fuse.lanes(), data.lanes(), "operand lane count mismatch");
    {
        let SignalArray { value: fv, strength: fs, .. } = &mut *fuse;
        fv.par_iter_mut()
            .zip(fs.par_iter_mut())
            .enumerate()
            .with_min_len(PAR_MIN_WORDS)
            .for_each(|(w, (v, s))| {
                let b = enable.value[w] & enable.strength[w] & data.value[w] & data.strength[w];
                *v = (*v & *s) | b;
                *s = u32::MAX;
            });
    }
    fuse.clear_tail();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::LogicValue;

    /// All 16 operand pairs, repeated so that every pair lands in several
    /// bit positions and across a word boundary.
    fn pair_grid(lanes: usize) -> (SignalArray, SignalArray, Vec<(LogicValue, LogicValue)>) {
        let mut pairs = Vec::with_capacity(lanes);
        for i in 0..lanes {
            let a = LogicValue::ALL[i % 4];
            let b = LogicValue::ALL[(i / 4 + i / 16) % 4];
            pairs.push((a, b));
        }
        let a = SignalArray::from_values(&pairs.iter().map(|p| p.0).collect::<Vec<_>>());
        let b = SignalArray::from_values(&pairs.iter().map(|p| p.1).collect::<Vec<_>>());
        (a, b, pairs)
    }

    fn check_binary(
        name: &str,
        kernel: fn(&SignalArray, &SignalArray) -> SignalArray,
        reference: fn(LogicValue, LogicValue) -> LogicValue,
    ) {
        let (a, b, pairs) = pair_grid(77);
        let out = kernel(&a, &b);
        for (lane, &(x, y)) in pairs.iter().enumerate() {
            assert_eq!(out.get(lane), reference(x, y), "{}({}, {}) at lane {}", name, x, y, lane);
        }
    }

    #[test]
    fn test_binary_kernels_match_reference() {
        check_binary("and", and, LogicValue::and);
        check_binary("or", or, LogicValue::or);
        check_binary("xor", xor, LogicValue::xor);
        check_binary("nand", nand, |a, b| a.and(b).not());
        check_binary("nor", nor, |a, b| a.or(b).not());
        check_binary("xnor", xnor, |a, b| a.xor(b).not());
        check_binary("register_next", register_next, LogicValue::register_next);
    }

    #[test]
    fn test_unary_kernels_match_reference() {
        let vals: Vec<_> = (0..50).map(|i| LogicValue::ALL[i % 4]).collect();
        let a = SignalArray::from_values(&vals);
        let n = not(&a);
        let bf = buf(&a);
        for (lane, &v) in vals.iter().enumerate() {
            assert_eq!(n.get(lane), v.not(), "not({}) at lane {}", v, lane);
            assert_eq!(bf.get(lane), v.buf(), "buf({}) at lane {}", v, lane);
        }
        assert_eq!(n.count(LogicValue::Z), 0);
    }

    #[test]
    fn test_not_of_weak_is_unknown() {
        let a = SignalArray::from_values(&[LogicValue::X, LogicValue::Z]);
        assert_eq!(not(&a).to_values(), vec![LogicValue::X, LogicValue::X]);
        let strong = SignalArray::from_bits(&[0, 1, 1, 0]);
        assert_eq!(not(&not(&strong)), strong);
    }

    #[test]
    fn test_mux_matches_reference() {
        let mut sel = Vec::new();
        let mut a = Vec::new();
        let mut b = Vec::new();
        for s in LogicValue::ALL {
            for x in LogicValue::ALL {
                for y in LogicValue::ALL {
                    sel.push(s);
                    a.push(x);
                    b.push(y);
                }
            }
        }
        let out = mux(
            &SignalArray::from_values(&sel),
            &SignalArray::from_values(&a),
            &SignalArray::from_values(&b),
        );
        for lane in 0..sel.len() {
            assert_eq!(out.get(lane), LogicValue::mux(sel[lane], a[lane], b[lane]), "lane {}", lane);
        }
    }

    #[test]
    fn test_reduce_three_inputs() {
        let a = SignalArray::from_bits(&[1, 1, 1, 0]);
        let b = SignalArray::from_bits(&[1, 1, 0, 0]);
        let c = SignalArray::from_values(&[LogicValue::One, LogicValue::X, LogicValue::X, LogicValue::X]);
        let out = reduce(&[&a, &b, &c], and_word, false);
        assert_eq!(
            out.to_values(),
            vec![LogicValue::One, LogicValue::X, LogicValue::Zero, LogicValue::Zero]
        );
        let out = reduce(&[&a, &b, &c], and_word, true);
        assert_eq!(
            out.to_values(),
            vec![LogicValue::Zero, LogicValue::X, LogicValue::One, LogicValue::One]
        );
    }

    #[test]
    fn test_large_arrays_take_parallel_path() {
        let lanes = PAR_MIN_WORDS * 32 * 4 + 5;
        let a = SignalArray::ones(lanes);
        let b = SignalArray::unknown(lanes);
        assert_eq!(and(&a, &b).count(LogicValue::X), lanes);
        assert_eq!(or(&a, &b).count(LogicValue::One), lanes);
        assert_eq!(not(&a).count(LogicValue::Zero), lanes);
    }

    #[test]
    fn test_register_update_in_place() {
        use LogicValue::*;
        let mut q = SignalArray::from_values(&[One, One, One, One, Zero, Zero]);
        let d = SignalArray::from_values(&[Zero, One, Z, One, X, One]);
        let r = SignalArray::from_values(&[Zero, Zero, Zero, One, Z, X]);
        register_update(&mut q, &d, &r);
        assert_eq!(q.to_values(), vec![Zero, One, Z, Zero, X, X]);
    }

    #[test]
    fn test_force_touches_only_enabled_lanes() {
        use LogicValue::*;
        let mut t = SignalArray::from_values(&[X, Z, One, Zero, X]);
        let en = SignalArray::from_values(&[One, Zero, One, X, One]);
        let val = SignalArray::from_values(&[One, One, Zero, One, Zero]);
        force(&mut t, &en, &val);
        assert_eq!(t.to_values(), vec![One, Z, Zero, Zero, Zero]);
    }

    #[test]
    fn test_merge_copies_strength() {
        use LogicValue::*;
        let mut t = SignalArray::from_values(&[Zero, Zero, Zero]);
        let src = SignalArray::from_values(&[Z, X, One]);
        let mask = SignalArray::from_bits(&[1, 0, 1]);
        merge(&mut t, &src, &mask);
        assert_eq!(t.to_values(), vec![Z, Zero, One]);
    }

    #[test]
    fn test_burn_is_monotonic_and_strong() {
        use LogicValue::*;
        let mut f = SignalArray::zeros(4);
        burn(
            &mut f,
            &SignalArray::from_values(&[One, One, X, Zero]),
            &SignalArray::from_values(&[One, X, One, One]),
        );
        assert_eq!(f.to_values(), vec![One, Zero, Zero, Zero]);
        burn(&mut f, &SignalArray::ones(4), &SignalArray::zeros(4));
        assert_eq!(f.get(0), One);
        assert!(f.is_all_strong());
    }
}
