// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Flat gate-level netlist IR.
//!
//! A [`Netlist`] is one module: its ports, an interned wire table and a list
//! of primitive instances kept in source order. Instances are never
//! reordered; the simulator evaluates them in the order they were written.
//! [`Netlist::order_violations`] reports reads of wires whose driver appears
//! later in the file.

pub mod lexer;
pub mod parser;

use std::path::Path;

use compact_str::CompactString;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::logic::LogicValue;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetlistError {
    #[error("cannot read netlist: {0}")]
    Io(String),
    #[error("line {line}: syntax error: {msg}")]
    Syntax { line: usize, msg: String },
    #[error("line {line}: unsupported primitive '{name}'")]
    UnsupportedPrimitive { line: usize, name: String },
    #[error("line {line}: malformed port list: {msg}")]
    MalformedPortList { line: usize, msg: String },
    #[error("line {line}: bad module header: {msg}")]
    BadHeader { line: usize, msg: String },
    #[error("line {line}: '{gate}' expects {expected}, got {got}")]
    Arity {
        line: usize,
        gate: String,
        expected: &'static str,
        got: usize,
    },
    #[error("line {line}: unsupported construct: {what}")]
    Unsupported { line: usize, what: String },
    #[error("line {line}: wire '{wire}' has more than one driver")]
    MultipleDrivers { line: usize, wire: String },
    #[error("line {line}: gate drives module input '{wire}'")]
    DrivesInput { line: usize, wire: String },
    #[error("unexpected end of file")]
    UnexpectedEof,
}

impl NetlistError {
    /// Source line of the error, if it has one.
    pub fn line(&self) -> Option<usize> {
        use NetlistError::*;
        match self {
            Syntax { line, .. }
            | UnsupportedPrimitive { line, .. }
            | MalformedPortList { line, .. }
            | BadHeader { line, .. }
            | Arity { line, .. }
            | Unsupported { line, .. }
            | MultipleDrivers { line, .. }
            | DrivesInput { line, .. } => Some(*line),
            Io(_) | UnexpectedEof => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(pub u32);

impl WireId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    Buf,
    Dff,
}

impl GateKind {
    /// The primitive keyword for `name`, if supported.
    pub fn from_keyword(name: &str) -> Option<GateKind> {
        Some(match name {
            "and" => GateKind::And,
            "or" => GateKind::Or,
            "xor" => GateKind::Xor,
            "nand" => GateKind::Nand,
            "nor" => GateKind::Nor,
            "xnor" => GateKind::Xnor,
            "not" => GateKind::Not,
            "buf" => GateKind::Buf,
            "dff" => GateKind::Dff,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            GateKind::And => "and",
            GateKind::Or => "or",
            GateKind::Xor => "xor",
            GateKind::Nand => "nand",
            GateKind::Nor => "nor",
            GateKind::Xnor => "xnor",
            GateKind::Not => "not",
            GateKind::Buf => "buf",
            GateKind::Dff => "dff",
        }
    }

    pub fn is_sequential(self) -> bool {
        self == GateKind::Dff
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

impl PortDirection {
    pub fn from_keyword(s: &str) -> Option<PortDirection> {
        match s {
            "input" => Some(PortDirection::Input),
            "output" => Some(PortDirection::Output),
            "inout" => Some(PortDirection::Inout),
            _ => None,
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::Inout)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::Inout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: CompactString,
    pub direction: PortDirection,
    pub wire: WireId,
}

/// One primitive instance.
///
/// For `dff` the output is Q and `inputs` is `[d, clk, rst]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: GateKind,
    pub name: CompactString,
    pub output: WireId,
    pub inputs: SmallVec<[WireId; 4]>,
    pub line: usize,
}

/// A combinational read of a wire that is driven by a later instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    pub reader: usize,
    pub driver: usize,
    pub wire: WireId,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Netlist {
    pub module: CompactString,
    pub ports: Vec<Port>,
    /// Every named wire, in order of first appearance.
    pub wires: IndexMap<CompactString, WireId>,
    /// Wires tied to a literal value (`1'b0` etc.).
    pub constants: Vec<(WireId, LogicValue)>,
    pub instructions: Vec<Instruction>,
}

impl Netlist {
    pub fn parse_str(src: &str) -> Result<Netlist, NetlistError> {
        parser::parse(src)
    }

    pub fn parse_file(path: impl AsRef<Path>) -> Result<Netlist, NetlistError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| NetlistError::Io(format!("{}: {}", path.display(), e)))?;
        parser::parse(&src)
    }

    pub fn num_wires(&self) -> usize {
        self.wires.len()
    }

    pub fn wire_id(&self, name: &str) -> Option<WireId> {
        self.wires.get(name).copied()
    }

    pub fn wire_name(&self, id: WireId) -> &str {
        self.wires
            .get_index(id.index())
            .map(|(n, _)| n.as_str())
            .unwrap_or("<invalid>")
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.direction.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.direction.is_output())
    }

    pub fn registers(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| i.kind.is_sequential())
    }

    pub fn num_gates(&self) -> usize {
        self.instructions.iter().filter(|i| !i.kind.is_sequential()).count()
    }

    /// Index of the instruction driving each wire.
    pub fn drivers(&self) -> Vec<Option<usize>> {
        let mut drivers = vec![None; self.num_wires()];
        for (i, inst) in self.instructions.iter().enumerate() {
            drivers[inst.output.index()] = Some(i);
        }
        drivers
    }

    /// Wires that are read somewhere but have no driver, are not inputs and
    /// are not constants. They stay X for the whole simulation.
    pub fn undriven_wires(&self) -> Vec<WireId> {
        let mut sourced = vec![false; self.num_wires()];
        for p in self.inputs() {
            sourced[p.wire.index()] = true;
        }
        for (w, _) in &self.constants {
            sourced[w.index()] = true;
        }
        for inst in &self.instructions {
            sourced[inst.output.index()] = true;
        }
        let mut read = vec![false; self.num_wires()];
        for inst in &self.instructions {
            for w in &inst.inputs {
                read[w.index()] = true;
            }
        }
        for p in self.outputs() {
            read[p.wire.index()] = true;
        }
        (0..self.num_wires())
            .filter(|&i| read[i] && !sourced[i])
            .map(|i| WireId(i as u32))
            .collect()
    }

    /// Combinational reads of wires whose driver is a later gate.
    ///
    /// Register outputs hold their previous value and `dff` inputs are
    /// sampled after all gates ran, so neither counts.
    pub fn order_violations(&self) -> Vec<OrderViolation> {
        let drivers = self.drivers();
        let mut violations = Vec::new();
        for (i, inst) in self.instructions.iter().enumerate() {
            if inst.kind.is_sequential() {
                continue;
            }
            for &w in &inst.inputs {
                if let Some(d) = drivers[w.index()] {
                    if d > i && !self.instructions[d].kind.is_sequential() {
                        violations.push(OrderViolation {
                            reader: i,
                            driver: d,
                            wire: w,
                            line: inst.line,
                        });
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_keywords() {
        for k in ["and", "or", "xor", "nand", "nor", "xnor", "not", "buf", "dff"] {
            assert_eq!(GateKind::from_keyword(k).unwrap().keyword(), k);
        }
        assert_eq!(GateKind::from_keyword("mux2"), None);
    }

    #[test]
    fn test_error_lines() {
        let e = NetlistError::MultipleDrivers {
            line: 7,
            wire: "n1".into(),
        };
        assert_eq!(e.line(), Some(7));
        assert_eq!(e.to_string(), "line 7: wire 'n1' has more than one driver");
        assert_eq!(NetlistError::UnexpectedEof.line(), None);
    }

    #[test]
    fn test_order_violations_ignore_registers() {
        let nl = Netlist::parse_str(
            "module m (input a, input clk, input rst, output y);
               wire n, q;
               and g1 (y, n, q);
               not g2 (n, a);
               dff r1 (q, y, clk, rst);
             endmodule",
        )
        .unwrap();
        let v = nl.order_violations();
        assert_eq!(v.len(), 1);
        assert_eq!(nl.wire_name(v[0].wire), "n");
        assert_eq!((v[0].reader, v[0].driver, v[0].line), (0, 1, 3));
    }

    #[test]
    fn test_undriven_wires() {
        let nl = Netlist::parse_str(
            "module m (a, y);
               input a;
               output y;
               wire floating;
               and g1 (y, a, floating);
             endmodule",
        )
        .unwrap();
        let undriven: Vec<_> = nl.undriven_wires().into_iter().map(|w| nl.wire_name(w)).collect();
        assert_eq!(undriven, vec!["floating"]);
    }
}
