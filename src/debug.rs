// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Named-register backdoor access.
//!
//! The debug port is a lookup table from register names and addresses to
//! registers in a [`RegisterBank`]. Reads and writes act on the register
//! state directly, bypassing any simulated bus logic.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::kernels;
use crate::register::{RegId, RegisterBank};
use crate::signal::SignalArray;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebugError {
    #[error("register not found: {0}")]
    RegisterNotFound(String),
    #[error("register name '{0}' is already mapped")]
    DuplicateName(String),
    #[error("address {0:#x} is already mapped to '{1}'")]
    DuplicateAddress(u32, String),
    #[error("register {0:?} does not exist in the bank")]
    DanglingRegister(RegId),
}

/// A register reference by name or by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegTarget<'a> {
    Name(&'a str),
    Address(u32),
}

impl<'a> From<&'a str> for RegTarget<'a> {
    fn from(s: &'a str) -> Self {
        RegTarget::Name(s)
    }
}

impl From<u32> for RegTarget<'_> {
    fn from(a: u32) -> Self {
        RegTarget::Address(a)
    }
}

impl std::fmt::Display for RegTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegTarget::Name(n) => write!(f, "{}", n),
            RegTarget::Address(a) => write!(f, "{:#x}", a),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    address: u32,
    reg: RegId,
}

#[derive(Debug, Clone, Default)]
pub struct DebugPort {
    by_name: IndexMap<String, Entry>,
    by_address: HashMap<u32, String>,
}

impl DebugPort {
    pub fn new() -> DebugPort {
        DebugPort::default()
    }

    pub fn add_register(&mut self, name: &str, address: u32, reg: RegId) -> Result<(), DebugError> {
        if self.by_name.contains_key(name) {
            return Err(DebugError::DuplicateName(name.to_string()));
        }
        if let Some(other) = self.by_address.get(&address) {
            return Err(DebugError::DuplicateAddress(address, other.clone()));
        }
        self.by_name.insert(name.to_string(), Entry { address, reg });
        self.by_address.insert(address, name.to_string());
        Ok(())
    }

    fn resolve(&self, target: RegTarget<'_>) -> Result<RegId, DebugError> {
        let entry = match target {
            RegTarget::Name(n) => self.by_name.get(n),
            RegTarget::Address(a) => self.by_address.get(&a).and_then(|n| self.by_name.get(n)),
        };
        entry
            .map(|e| e.reg)
            .ok_or_else(|| DebugError::RegisterNotFound(target.to_string()))
    }

    /// The register handle behind `target`.
    pub fn lookup<'a>(&self, target: impl Into<RegTarget<'a>>) -> Result<RegId, DebugError> {
        self.resolve(target.into())
    }

    pub fn read<'b, 'a>(
        &self,
        bank: &'b RegisterBank,
        target: impl Into<RegTarget<'a>>,
    ) -> Result<&'b SignalArray, DebugError> {
        let reg = self.resolve(target.into())?;
        if !bank.contains(reg) {
            return Err(DebugError::DanglingRegister(reg));
        }
        Ok(bank.q(reg))
    }

    /// Backdoor write. With a mask, only lanes where the mask is strong 1
    /// take `value`; the rest keep their current state.
    pub fn write<'a>(
        &self,
        bank: &mut RegisterBank,
        target: impl Into<RegTarget<'a>>,
        value: &SignalArray,
        mask: Option<&SignalArray>,
    ) -> Result<(), DebugError> {
        let reg = self.resolve(target.into())?;
        if !bank.contains(reg) {
            return Err(DebugError::DanglingRegister(reg));
        }
        let q = bank.get_mut(reg).q_mut();
        match mask {
            Some(m) => kernels::merge(q, value, m),
            None => q.copy_from(value),
        }
        Ok(())
    }

    /// `(name, address)` of every mapped register, in registration order.
    pub fn registers(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_name.iter().map(|(n, e)| (n.as_str(), e.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::LogicValue;
    use crate::signal::InitState;

    fn setup() -> (RegisterBank, DebugPort, RegId) {
        let mut bank = RegisterBank::new(4);
        let _ = bank.alloc(InitState::Zero);
        let secure = bank.alloc(InitState::Zero);
        let mut port = DebugPort::new();
        port.add_register("SECURE_CTRL", 0x40, secure).unwrap();
        (bank, port, secure)
    }

    #[test]
    fn test_read_write_by_name_and_address() {
        let (mut bank, port, secure) = setup();
        port.write(&mut bank, "SECURE_CTRL", &SignalArray::ones(4), None).unwrap();
        assert_eq!(bank.q(secure), &SignalArray::ones(4));
        assert_eq!(port.read(&bank, 0x40u32).unwrap(), &SignalArray::ones(4));
        assert_eq!(port.lookup(0x40u32), Ok(secure));
    }

    #[test]
    fn test_masked_write_touches_selected_lanes() {
        let (mut bank, port, secure) = setup();
        let value = SignalArray::from_values(&[LogicValue::One, LogicValue::X, LogicValue::One, LogicValue::One]);
        let mask = SignalArray::from_bits(&[0, 1, 1, 0]);
        port.write(&mut bank, "SECURE_CTRL", &value, Some(&mask)).unwrap();
        assert_eq!(
            bank.q(secure).to_values(),
            vec![LogicValue::Zero, LogicValue::X, LogicValue::One, LogicValue::Zero]
        );
    }

    #[test]
    fn test_register_not_found() {
        let (mut bank, port, _) = setup();
        assert_eq!(
            port.read(&bank, "MISSING").unwrap_err(),
            DebugError::RegisterNotFound("MISSING".into())
        );
        assert_eq!(
            port.write(&mut bank, 0x44u32, &SignalArray::ones(4), None),
            Err(DebugError::RegisterNotFound("0x44".into()))
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let (_, mut port, secure) = setup();
        assert_eq!(
            port.add_register("SECURE_CTRL", 0x50, secure),
            Err(DebugError::DuplicateName("SECURE_CTRL".into()))
        );
        assert_eq!(
            port.add_register("OTHER", 0x40, secure),
            Err(DebugError::DuplicateAddress(0x40, "SECURE_CTRL".into()))
        );
        assert_eq!(port.registers().collect::<Vec<_>>(), vec![("SECURE_CTRL", 0x40)]);
    }
}
