use std::{collections::BTreeMap, sync::Arc};

use crate::common::{Word, hash::keccak256};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: Word,
    pub nonce: u64,
    /// Immutable once deployed; shared between state copies.
    pub code: Arc<Vec<u8>>,
    /// Absent keys read as zero; zero values are never stored.
    pub storage: BTreeMap<Word, Word>,
}

impl Account {
    pub fn with_balance(balance: Word) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    pub fn code_hash(&self) -> Word {
        Word::from_bytes(&keccak256(&self.code))
    }

    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    /// Empty per EIP-161: no code, zero nonce, zero balance.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.nonce == 0 && self.balance.is_zero()
    }

    pub fn get(&self, key: &Word) -> Word {
        self.storage.get(key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: Word, val: Word) {
        if val.is_zero() {
            self.storage.remove(&key);
        } else {
            self.storage.insert(key, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_slot_reads_zero() {
        let mut account = Account::default();
        assert_eq!(account.get(&Word::one()), Word::zero());
        account.set(Word::one(), Word::from(26u8));
        assert_eq!(account.get(&Word::one()), Word::from(26u8));
        account.set(Word::one(), Word::zero());
        assert!(account.storage.is_empty());
    }
}
