use serde::{Deserialize, Serialize};

use crate::{common::Word, executor::VmError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardfork {
    #[default]
    Petersburg,
    Istanbul,
}

/// Static and dynamic gas costs of one hardfork.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasSchedule {
    pub hardfork: Hardfork,

    pub stop: u64,
    pub jumpdest: u64,
    pub base: u64,
    pub very_low: u64,
    pub low: u64,
    pub mid: u64,
    pub high: u64,
    pub ext: u64,

    pub sha3: u64,
    pub sha3_word: u64,
    pub copy_word: u64,
    pub exp: u64,
    pub exp_byte: u64,
    pub memory_word: u64,
    pub quad_divisor: u64,

    pub log: u64,
    pub log_topic: u64,
    pub log_data: u64,

    pub balance: u64,
    pub ext_code_size: u64,
    pub ext_code_hash: u64,
    pub sload: u64,

    pub sstore_set: u64,
    pub sstore_reset: u64,
    pub sstore_clear_refund: u64,
    /// EIP-2200 net metering: costs depend on the value at transaction start.
    pub net_sstore: bool,
    pub sstore_sentry: u64,

    pub call: u64,
    pub call_value: u64,
    pub call_stipend: u64,
    pub new_account: u64,
    pub create: u64,
    pub code_deposit: u64,
    pub selfdestruct: u64,
    pub selfdestruct_refund: u64,

    pub tx: u64,
    pub tx_create: u64,
    pub tx_data_zero: u64,
    pub tx_data_non_zero: u64,
    pub refund_quotient: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self::petersburg()
    }
}

impl GasSchedule {
    pub fn petersburg() -> Self {
        Self {
            hardfork: Hardfork::Petersburg,
            stop: 1,
            jumpdest: 1,
            base: 2,
            very_low: 3,
            low: 5,
            mid: 8,
            high: 10,
            ext: 20,
            sha3: 30,
            sha3_word: 6,
            copy_word: 3,
            exp: 10,
            exp_byte: 50,
            memory_word: 3,
            quad_divisor: 512,
            log: 375,
            log_topic: 375,
            log_data: 8,
            balance: 400,
            ext_code_size: 700,
            ext_code_hash: 400,
            sload: 200,
            sstore_set: 20_000,
            sstore_reset: 5_000,
            sstore_clear_refund: 15_000,
            net_sstore: false,
            sstore_sentry: 2_300,
            call: 700,
            call_value: 9_000,
            call_stipend: 2_300,
            new_account: 25_000,
            create: 32_000,
            code_deposit: 200,
            selfdestruct: 5_000,
            selfdestruct_refund: 24_000,
            tx: 21_000,
            tx_create: 32_000,
            tx_data_zero: 4,
            tx_data_non_zero: 68,
            refund_quotient: 2,
        }
    }

    pub fn istanbul() -> Self {
        Self {
            hardfork: Hardfork::Istanbul,
            balance: 700,
            ext_code_hash: 700,
            sload: 800,
            net_sstore: true,
            tx_data_non_zero: 16,
            ..Self::petersburg()
        }
    }

    pub fn for_hardfork(hardfork: Hardfork) -> Self {
        match hardfork {
            Hardfork::Petersburg => Self::petersburg(),
            Hardfork::Istanbul => Self::istanbul(),
        }
    }

    /// Whether the opcode exists in this hardfork. Opcodes introduced after
    /// Istanbul (BASEFEE, TLOAD, TSTORE, MCOPY, PUSH0) are never enabled.
    pub fn is_enabled(&self, opcode: u8) -> bool {
        match opcode {
            // CHAINID, SELFBALANCE
            0x46 | 0x47 => self.hardfork == Hardfork::Istanbul,
            0x48 | 0x5c..=0x5f => false,
            _ => true,
        }
    }

    /// Fixed part of an opcode's cost, charged before anything else.
    /// Dynamic parts (memory, copies, storage, calls) are added by the executor.
    pub fn fixed(&self, opcode: u8) -> u64 {
        match opcode {
            0x00 => self.stop,
            0x01 | 0x03 | 0x10..=0x1d | 0x35 | 0x37 | 0x39 | 0x3e | 0x51..=0x53 => {
                self.very_low
            }
            0x60..=0x9f => self.very_low,
            0x02 | 0x04..=0x07 | 0x0b | 0x47 => self.low,
            0x08 | 0x09 | 0x56 => self.mid,
            0x57 => self.high,
            0x0a => self.exp,
            0x20 => self.sha3,
            0x30 | 0x32..=0x34 | 0x36 | 0x38 | 0x3a | 0x3d => self.base,
            0x41..=0x46 | 0x50 | 0x58..=0x5a => self.base,
            0x40 => self.ext,
            0x31 => self.balance,
            0x3b | 0x3c => self.ext_code_size,
            0x3f => self.ext_code_hash,
            0x54 => self.sload,
            0x5b => self.jumpdest,
            0xa0..=0xa4 => self.log + self.log_topic * (opcode - 0xa0) as u64,
            0xf0 | 0xf5 => self.create,
            0xf1 | 0xf2 | 0xf4 | 0xfa => self.call,
            0xff => self.selfdestruct,
            // SSTORE, RETURN, REVERT: entirely dynamic.
            _ => 0,
        }
    }

    /// Total cost of `words` 32-byte words of memory.
    pub fn memory(&self, words: u64) -> u64 {
        self.memory_word * words + words * words / self.quad_divisor
    }

    pub fn copy(&self, size: u64) -> u64 {
        self.copy_word * size.div_ceil(32)
    }

    pub fn intrinsic(&self, data: &[u8], is_create: bool) -> u64 {
        let non_zero = data.iter().filter(|byte| byte != &&0).count() as u64;
        let zero = data.len() as u64 - non_zero;
        let base = if is_create {
            self.tx + self.tx_create
        } else {
            self.tx
        };
        base + zero * self.tx_data_zero + non_zero * self.tx_data_non_zero
    }

    /// Gas forwarded to a sub-call: the request capped at all but one 64th of what is left.
    pub fn call_gas(&self, remaining: u64, requested: u64) -> u64 {
        let cap = remaining - remaining / 64;
        requested.min(cap)
    }

    /// Cost and refund delta of an SSTORE of `new` over `current`, where
    /// `original` is the slot's value at the start of the transaction.
    pub fn sstore(&self, original: &Word, current: &Word, new: &Word) -> (u64, i64) {
        let clear = self.sstore_clear_refund as i64;
        if !self.net_sstore {
            return if current.is_zero() && !new.is_zero() {
                (self.sstore_set, 0)
            } else if !current.is_zero() && new.is_zero() {
                (self.sstore_reset, clear)
            } else {
                (self.sstore_reset, 0)
            };
        }

        if current == new {
            return (self.sload, 0);
        }
        if original == current {
            if original.is_zero() {
                return (self.sstore_set, 0);
            }
            let refund = if new.is_zero() { clear } else { 0 };
            return (self.sstore_reset, refund);
        }

        let mut refund = 0i64;
        if !original.is_zero() {
            if current.is_zero() {
                refund -= clear;
            } else if new.is_zero() {
                refund += clear;
            }
        }
        if original == new {
            if original.is_zero() {
                refund += (self.sstore_set - self.sload) as i64;
            } else {
                refund += (self.sstore_reset - self.sload) as i64;
            }
        }
        (self.sload, refund)
    }
}

/// Gas meter of a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Gas {
    pub limit: u64,
    pub used: u64,
}

impl Gas {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn sub(&mut self, gas: u64) -> Result<(), VmError> {
        if gas > self.remaining() {
            return Err(VmError::OutOfGas);
        }
        self.used += gas;
        Ok(())
    }

    /// Returns gas left unspent by a sub-call.
    pub fn add(&mut self, gas: u64) {
        self.used = self.used.saturating_sub(gas);
    }

    pub fn exhaust(&mut self) {
        self.used = self.limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cost() {
        let gas = GasSchedule::default();
        assert_eq!(gas.memory(0), 0);
        assert_eq!(gas.memory(1), 3);
        assert_eq!(gas.memory(32), 3 * 32 + 2);
        assert_eq!(gas.memory(1024), 3 * 1024 + 2048);
    }

    #[test]
    fn test_intrinsic_gas() {
        let petersburg = GasSchedule::petersburg();
        let istanbul = GasSchedule::istanbul();
        let data = [0u8, 1, 0, 2];
        assert_eq!(petersburg.intrinsic(&[], false), 21_000);
        assert_eq!(petersburg.intrinsic(&data, false), 21_000 + 2 * 4 + 2 * 68);
        assert_eq!(istanbul.intrinsic(&data, false), 21_000 + 2 * 4 + 2 * 16);
        assert_eq!(petersburg.intrinsic(&[], true), 53_000);
    }

    #[test]
    fn test_call_gas_keeps_one_64th() {
        let gas = GasSchedule::default();
        assert_eq!(gas.call_gas(6400, u64::MAX), 6300);
        assert_eq!(gas.call_gas(6400, 100), 100);
    }

    #[test]
    fn test_opcode_availability() {
        let petersburg = GasSchedule::petersburg();
        let istanbul = GasSchedule::istanbul();
        assert!(petersburg.is_enabled(0x01));
        assert!(petersburg.is_enabled(0x3f));
        assert!(!petersburg.is_enabled(0x46));
        assert!(!petersburg.is_enabled(0x47));
        assert!(istanbul.is_enabled(0x46));
        assert!(istanbul.is_enabled(0x47));
        for opcode in [0x48, 0x5c, 0x5d, 0x5e, 0x5f] {
            assert!(!petersburg.is_enabled(opcode));
            assert!(!istanbul.is_enabled(opcode));
        }
    }

    #[test]
    fn test_fixed_costs() {
        let gas = GasSchedule::default();
        assert_eq!(gas.fixed(0x00), 1);
        assert_eq!(gas.fixed(0x60), 3);
        assert_eq!(gas.fixed(0x02), 5);
        assert_eq!(gas.fixed(0x56), 8);
        assert_eq!(gas.fixed(0x57), 10);
        assert_eq!(gas.fixed(0x54), 200);
        assert_eq!(gas.fixed(0xa2), 375 * 3);
        assert_eq!(GasSchedule::istanbul().fixed(0x54), 800);
    }

    #[test]
    fn test_legacy_sstore() {
        let gas = GasSchedule::petersburg();
        let (zero, one, two) = (Word::zero(), Word::one(), Word::from(2u8));
        assert_eq!(gas.sstore(&zero, &zero, &one), (20_000, 0));
        assert_eq!(gas.sstore(&one, &one, &two), (5_000, 0));
        assert_eq!(gas.sstore(&one, &one, &zero), (5_000, 15_000));
        assert_eq!(gas.sstore(&zero, &zero, &zero), (5_000, 0));
    }

    #[test]
    fn test_net_sstore() {
        let gas = GasSchedule::istanbul();
        let (zero, one, two) = (Word::zero(), Word::one(), Word::from(2u8));
        // no-op
        assert_eq!(gas.sstore(&one, &one, &one), (800, 0));
        // fresh slot
        assert_eq!(gas.sstore(&zero, &zero, &one), (20_000, 0));
        // clean slot cleared
        assert_eq!(gas.sstore(&one, &one, &zero), (5_000, 15_000));
        // dirty slot restored to a zero original
        assert_eq!(gas.sstore(&zero, &one, &zero), (800, 19_200));
        // dirty slot restored to a non-zero original
        assert_eq!(gas.sstore(&one, &two, &one), (800, 4_200));
        // cleared earlier, now set again
        assert_eq!(gas.sstore(&one, &zero, &two), (800, -15_000));
    }

    #[test]
    fn test_meter() {
        let mut gas = Gas::new(100);
        gas.sub(60).unwrap();
        assert_eq!(gas.remaining(), 40);
        assert_eq!(gas.sub(41), Err(VmError::OutOfGas));
        gas.add(10);
        assert_eq!(gas.remaining(), 50);
        gas.exhaust();
        assert_eq!(gas.remaining(), 0);
    }
}
