// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Recursive-descent parser for one flat module of primitive instances.
//!
//! ```text
//! module top (a, b, y);          module top (input a, b, output y);
//!   input a, b;                    wire n1;
//!   output y;                      nand g1 (n1, a, b);
//!   and g1 (y, a, b);              not  g2 (y, n1);
//! endmodule                      endmodule
//! ```

use compact_str::{format_compact, CompactString};
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::logic::LogicValue;

use super::lexer::{tokenize, Token, TokenKind};
use super::{GateKind, Instruction, Netlist, NetlistError, Port, PortDirection, WireId};

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    wires: IndexMap<CompactString, WireId>,
    constants: Vec<(WireId, LogicValue)>,
    /// Header ports in order, with their direction once known.
    ports: IndexMap<CompactString, Option<PortDirection>>,
    ansi: bool,
    header_line: usize,
}

enum Operand {
    Wire(CompactString),
    Literal(LogicValue),
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, NetlistError> {
        let t = self.tokens.get(self.pos).cloned().ok_or(NetlistError::UnexpectedEof)?;
        self.pos += 1;
        Ok(t)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek().map_or(false, |t| t.is_punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), NetlistError> {
        let t = self.next()?;
        if t.is_punct(c) {
            Ok(())
        } else {
            Err(NetlistError::Syntax {
                line: t.line,
                msg: format!("expected '{}', got {}", c, t.kind),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(CompactString, usize), NetlistError> {
        let t = self.next()?;
        match t.kind {
            TokenKind::Ident(s) => Ok((s, t.line)),
            TokenKind::Punct('[') => Err(unsupported_bus(t.line)),
            other => Err(NetlistError::Syntax {
                line: t.line,
                msg: format!("expected identifier, got {}", other),
            }),
        }
    }

    fn intern(&mut self, name: &str) -> WireId {
        if let Some(&id) = self.wires.get(name) {
            return id;
        }
        let id = WireId(self.wires.len() as u32);
        self.wires.insert(CompactString::from(name), id);
        id
    }

    fn intern_literal(&mut self, v: LogicValue) -> WireId {
        let name = format_compact!("1'b{}", v);
        let fresh = !self.wires.contains_key(&name);
        let id = self.intern(&name);
        if fresh {
            self.constants.push((id, v));
        }
        id
    }

    fn header(&mut self) -> Result<CompactString, NetlistError> {
        let t = self.next().map_err(|_| NetlistError::BadHeader {
            line: 1,
            msg: "empty input".into(),
        })?;
        self.header_line = t.line;
        if t.ident() != Some("module") {
            return Err(NetlistError::BadHeader {
                line: t.line,
                msg: format!("expected 'module', got {}", t.kind),
            });
        }
        let name = match self.next()? {
            Token {
                kind: TokenKind::Ident(s),
                ..
            } => s,
            t => {
                return Err(NetlistError::BadHeader {
                    line: t.line,
                    msg: format!("expected module name, got {}", t.kind),
                })
            }
        };
        if self.eat_punct('(') {
            self.port_list()?;
        }
        let t = self.next()?;
        if !t.is_punct(';') {
            return Err(NetlistError::BadHeader {
                line: t.line,
                msg: format!("expected ';' after module header, got {}", t.kind),
            });
        }
        Ok(name)
    }

    fn port_list(&mut self) -> Result<(), NetlistError> {
        if self.eat_punct(')') {
            return Ok(());
        }
        let mut direction = None;
        loop {
            let t = self.next()?;
            let line = t.line;
            let name = match &t.kind {
                TokenKind::Ident(kw) if PortDirection::from_keyword(kw).is_some() => {
                    direction = PortDirection::from_keyword(kw);
                    self.ansi = true;
                    if self.peek().and_then(Token::ident) == Some("wire") {
                        self.pos += 1;
                    }
                    let t = self.next()?;
                    match t.kind {
                        TokenKind::Ident(s) => s,
                        TokenKind::Punct('[') => return Err(unsupported_bus(t.line)),
                        other => {
                            return Err(NetlistError::MalformedPortList {
                                line: t.line,
                                msg: format!("expected port name, got {}", other),
                            })
                        }
                    }
                }
                TokenKind::Ident(s) => s.clone(),
                TokenKind::Punct('[') => return Err(unsupported_bus(line)),
                other => {
                    return Err(NetlistError::MalformedPortList {
                        line,
                        msg: format!("expected port name, got {}", other),
                    })
                }
            };
            if self.ansi && direction.is_none() {
                return Err(NetlistError::MalformedPortList {
                    line,
                    msg: format!("port '{}' has no direction", name),
                });
            }
            if self.ports.insert(name.clone(), direction).is_some() {
                return Err(NetlistError::MalformedPortList {
                    line,
                    msg: format!("port '{}' listed twice", name),
                });
            }
            let t = self.next()?;
            if t.is_punct(')') {
                return Ok(());
            }
            if !t.is_punct(',') {
                return Err(NetlistError::MalformedPortList {
                    line: t.line,
                    msg: format!("expected ',' or ')', got {}", t.kind),
                });
            }
        }
    }

    /// Comma-separated names up to `;`.
    fn name_list(&mut self) -> Result<Vec<(CompactString, usize)>, NetlistError> {
        let mut names = vec![self.expect_ident()?];
        loop {
            let t = self.next()?;
            if t.is_punct(';') {
                return Ok(names);
            }
            if !t.is_punct(',') {
                return Err(NetlistError::Syntax {
                    line: t.line,
                    msg: format!("expected ',' or ';', got {}", t.kind),
                });
            }
            names.push(self.expect_ident()?);
        }
    }

    fn declaration(&mut self, direction: PortDirection) -> Result<(), NetlistError> {
        if self.peek().and_then(Token::ident) == Some("wire") {
            self.pos += 1;
        }
        for (name, line) in self.name_list()? {
            match self.ports.get_mut(&name) {
                Some(slot) if slot.is_none() && !self.ansi => *slot = Some(direction),
                Some(_) => {
                    return Err(NetlistError::MalformedPortList {
                        line,
                        msg: format!("port '{}' declared twice", name),
                    })
                }
                None => {
                    return Err(NetlistError::MalformedPortList {
                        line,
                        msg: format!("'{}' has a direction but is not in the port list", name),
                    })
                }
            }
        }
        Ok(())
    }

    fn operand(&mut self) -> Result<Operand, NetlistError> {
        let t = self.next()?;
        match t.kind {
            TokenKind::Ident(s) => {
                if self.peek().map_or(false, |t| t.is_punct('[')) {
                    return Err(unsupported_bus(t.line));
                }
                Ok(Operand::Wire(s))
            }
            TokenKind::Literal(v) => Ok(Operand::Literal(v)),
            TokenKind::Punct('.') => Err(NetlistError::Unsupported {
                line: t.line,
                what: "named port connections".into(),
            }),
            other => Err(NetlistError::Syntax {
                line: t.line,
                msg: format!("expected connection, got {}", other),
            }),
        }
    }

    fn instance(&mut self, kind: GateKind, line: usize, index: usize) -> Result<Instruction, NetlistError> {
        let name = if self.eat_punct('(') {
            format_compact!("{}_{}", kind, index)
        } else {
            let (name, _) = self.expect_ident()?;
            self.expect_punct('(')?;
            name
        };
        let mut operands = vec![self.operand()?];
        loop {
            let t = self.next()?;
            if t.is_punct(')') {
                break;
            }
            if !t.is_punct(',') {
                return Err(NetlistError::Syntax {
                    line: t.line,
                    msg: format!("expected ',' or ')', got {}", t.kind),
                });
            }
            operands.push(self.operand()?);
        }
        self.expect_punct(';')?;

        let got = operands.len();
        let expected = match kind {
            GateKind::Not | GateKind::Buf if got != 2 => Some("2 connections (out, in)"),
            GateKind::Dff if got != 4 => Some("4 connections (q, d, clk, rst)"),
            GateKind::And | GateKind::Or | GateKind::Xor | GateKind::Nand | GateKind::Nor | GateKind::Xnor
                if got < 3 =>
            {
                Some("at least 3 connections")
            }
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(NetlistError::Arity {
                line,
                gate: name.to_string(),
                expected,
                got,
            });
        }

        let mut operands = operands.into_iter();
        let output = match operands.next() {
            Some(Operand::Wire(w)) => self.intern(&w),
            _ => {
                return Err(NetlistError::Syntax {
                    line,
                    msg: format!("output of '{}' must be a wire", name),
                })
            }
        };
        let inputs: SmallVec<[WireId; 4]> = operands
            .map(|op| match op {
                Operand::Wire(w) => self.intern(&w),
                Operand::Literal(v) => self.intern_literal(v),
            })
            .collect();
        Ok(Instruction {
            kind,
            name,
            output,
            inputs,
            line,
        })
    }

    fn parse(mut self) -> Result<Netlist, NetlistError> {
        let module = self.header()?;
        let mut instructions: Vec<Instruction> = Vec::new();
        loop {
            let t = self.next()?;
            let line = t.line;
            let kw = match &t.kind {
                TokenKind::Ident(s) => s.clone(),
                other => {
                    return Err(NetlistError::Syntax {
                        line,
                        msg: format!("expected statement, got {}", other),
                    })
                }
            };
            match kw.as_str() {
                "endmodule" => break,
                "input" => self.declaration(PortDirection::Input)?,
                "output" => self.declaration(PortDirection::Output)?,
                "inout" => self.declaration(PortDirection::Inout)?,
                "wire" => {
                    for (name, _) in self.name_list()? {
                        self.intern(&name);
                    }
                }
                "assign" | "always" | "reg" | "initial" => {
                    return Err(NetlistError::Unsupported {
                        line,
                        what: format!("'{}' statements", kw),
                    })
                }
                "module" => {
                    return Err(NetlistError::Unsupported {
                        line,
                        what: "nested or multiple modules".into(),
                    })
                }
                other => match GateKind::from_keyword(other) {
                    Some(kind) => {
                        let inst = self.instance(kind, line, instructions.len())?;
                        instructions.push(inst);
                    }
                    None => {
                        return Err(NetlistError::UnsupportedPrimitive {
                            line,
                            name: other.to_string(),
                        })
                    }
                },
            }
        }
        if let Some(t) = self.peek() {
            return Err(NetlistError::Unsupported {
                line: t.line,
                what: "content after endmodule".into(),
            });
        }

        let mut ports = Vec::with_capacity(self.ports.len());
        let header_ports: Vec<_> = self.ports.iter().map(|(n, d)| (n.clone(), *d)).collect();
        for (name, direction) in header_ports {
            let direction = direction.ok_or_else(|| NetlistError::MalformedPortList {
                line: self.header_line,
                msg: format!("port '{}' has no direction declaration", name),
            })?;
            let wire = self.intern(&name);
            ports.push(Port { name, direction, wire });
        }

        let mut driven: Vec<Option<usize>> = vec![None; self.wires.len()];
        for p in &ports {
            if p.direction == PortDirection::Input {
                driven[p.wire.index()] = Some(0);
            }
        }
        for inst in &instructions {
            let w = inst.output.index();
            if let Some(p) = ports.iter().find(|p| p.wire == inst.output && p.direction == PortDirection::Input) {
                return Err(NetlistError::DrivesInput {
                    line: inst.line,
                    wire: p.name.to_string(),
                });
            }
            if driven[w].is_some() {
                return Err(NetlistError::MultipleDrivers {
                    line: inst.line,
                    wire: self.wires.get_index(w).map_or_else(String::new, |(n, _)| n.to_string()),
                });
            }
            driven[w] = Some(inst.line);
        }

        Ok(Netlist {
            module,
            ports,
            wires: self.wires,
            constants: self.constants,
            instructions,
        })
    }
}

fn unsupported_bus(line: usize) -> NetlistError {
    NetlistError::Unsupported {
        line,
        what: "vectors and bus ranges".into(),
    }
}

/// Parse a single-module netlist.
pub fn parse(src: &str) -> Result<Netlist, NetlistError> {
    let parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        wires: IndexMap::new(),
        constants: Vec::new(),
        ports: IndexMap::new(),
        ansi: false,
        header_line: 1,
    };
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMB: &str = include_str!("../../tests/netlists/comb.v");
    const SHIFT: &str = include_str!("../../tests/netlists/shift3.v");

    fn err(src: &str) -> NetlistError {
        parse(src).unwrap_err()
    }

    #[test]
    fn test_parse_separate_declarations() {
        let nl = parse(COMB).unwrap();
        assert_eq!(nl.module, "comb");
        let ins: Vec<_> = nl.inputs().map(|p| p.name.as_str()).collect();
        let outs: Vec<_> = nl.outputs().map(|p| p.name.as_str()).collect();
        assert_eq!(ins, vec!["a", "b"]);
        assert_eq!(outs, vec!["y"]);
        assert_eq!(nl.num_gates(), 3);
        let kinds: Vec<_> = nl.instructions.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![GateKind::And, GateKind::Not, GateKind::Or]);
        assert!(nl.order_violations().is_empty());
    }

    #[test]
    fn test_parse_ansi_header_and_dff() {
        let nl = parse(SHIFT).unwrap();
        assert_eq!(nl.ports.len(), 4);
        assert_eq!(nl.port("clk").unwrap().direction, PortDirection::Input);
        assert_eq!(nl.port("q").unwrap().direction, PortDirection::Output);
        let regs: Vec<_> = nl.registers().map(|r| r.name.as_str()).collect();
        assert_eq!(regs, vec!["r0", "r1", "r2"]);
        let r0 = &nl.instructions[0];
        assert_eq!(nl.wire_name(r0.output), "s0");
        assert_eq!(r0.inputs.len(), 3);
        assert_eq!(nl.wire_name(r0.inputs[0]), "d");
    }

    #[test]
    fn test_literals_and_unnamed_instances() {
        let nl = parse("module m (input a, output y, output z);\n and (y, a, 1'b1);\n or (z, a, 1'b1, 1'b1);\nendmodule").unwrap();
        assert_eq!(nl.constants.len(), 1);
        assert_eq!(nl.constants[0].1, LogicValue::One);
        assert_eq!(nl.instructions[0].name, "and_0");
        assert_eq!(nl.instructions[1].inputs[1], nl.instructions[1].inputs[2]);
    }

    #[test]
    fn test_inout_can_be_driven() {
        let nl = parse("module m (input a, inout p);\n not g (p, a);\nendmodule").unwrap();
        assert_eq!(nl.inputs().count(), 2);
        assert_eq!(nl.outputs().count(), 1);
    }

    #[test]
    fn test_unsupported_primitive() {
        let e = err("module m (input a, output y);\n\n  mux2 u1 (y, a, a, a);\nendmodule");
        assert_eq!(
            e,
            NetlistError::UnsupportedPrimitive {
                line: 3,
                name: "mux2".into()
            }
        );
    }

    #[test]
    fn test_malformed_port_lists() {
        assert!(matches!(
            err("module m (a, , y);\nendmodule"),
            NetlistError::MalformedPortList { line: 1, .. }
        ));
        // header port never given a direction
        assert!(matches!(
            err("module m (a, y);\n input a;\n not g (y, a);\nendmodule"),
            NetlistError::MalformedPortList { line: 1, .. }
        ));
        assert!(matches!(
            err("module m (a, input y);\nendmodule"),
            NetlistError::MalformedPortList { line: 1, .. }
        ));
        assert!(matches!(
            err("module m (a);\n input a;\n output b;\nendmodule"),
            NetlistError::MalformedPortList { line: 3, .. }
        ));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(err("wire a;"), NetlistError::BadHeader { line: 1, .. }));
        assert!(matches!(err("module (a);"), NetlistError::BadHeader { .. }));
        assert!(matches!(err("module m (input a)\nendmodule"), NetlistError::BadHeader { line: 2, .. }));
        assert!(matches!(err(""), NetlistError::BadHeader { .. }));
    }

    #[test]
    fn test_arity() {
        assert!(matches!(
            err("module m (input a, input b, output y);\n not g (y, a, b);\nendmodule"),
            NetlistError::Arity { line: 2, got: 3, .. }
        ));
        assert!(matches!(
            err("module m (input a, output y);\n and g (y, a);\nendmodule"),
            NetlistError::Arity { got: 2, .. }
        ));
        assert!(matches!(
            err("module m (input d, input c, output q);\n dff r (q, d, c);\nendmodule"),
            NetlistError::Arity { got: 3, .. }
        ));
    }

    #[test]
    fn test_buses_rejected() {
        assert!(matches!(
            err("module m (input [3:0] a, output y);\nendmodule"),
            NetlistError::Unsupported { line: 1, .. }
        ));
        assert!(matches!(
            err("module m (input a, output y);\n buf g (y, a[0]);\nendmodule"),
            NetlistError::Unsupported { line: 2, .. }
        ));
    }

    #[test]
    fn test_driver_errors() {
        assert_eq!(
            err("module m (input a, output y);\n not g1 (y, a);\n buf g2 (y, a);\nendmodule"),
            NetlistError::MultipleDrivers {
                line: 3,
                wire: "y".into()
            }
        );
        assert_eq!(
            err("module m (input a, output y);\n not g1 (a, y);\nendmodule"),
            NetlistError::DrivesInput {
                line: 2,
                wire: "a".into()
            }
        );
    }

    #[test]
    fn test_unexpected_eof() {
        assert_eq!(err("module m (input a, output y);\n not g1 (y, a);"), NetlistError::UnexpectedEof);
        assert_eq!(err("module m (input a, output y);\n not g1 (y,"), NetlistError::UnexpectedEof);
    }

    #[test]
    fn test_out_of_order_gates_are_reported() {
        let nl = parse(include_str!("../../tests/netlists/comb_reordered.v")).unwrap();
        let v = nl.order_violations();
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|v| nl.instructions[v.reader].kind == GateKind::Or));
    }
}
