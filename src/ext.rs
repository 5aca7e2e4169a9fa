use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use crate::common::{Word, account::Account, address::Address, block::Log};

/// Accounts keyed by address. Cloning yields a fully independent copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldState {
    accounts: BTreeMap<Address, Account>,
}

impl WorldState {
    pub fn new(accounts: impl IntoIterator<Item = (Address, Account)>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn account_mut(&mut self, address: &Address) -> &mut Account {
        self.accounts.entry(*address).or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    pub fn remove(&mut self, address: &Address) -> Option<Account> {
        self.accounts.remove(address)
    }

    pub fn put(&mut self, address: Address, account: Option<Account>) {
        match account {
            Some(account) => {
                self.accounts.insert(address, account);
            }
            None => {
                self.accounts.remove(&address);
            }
        }
    }

    pub fn balance(&self, address: &Address) -> Word {
        self.account(address)
            .map(|acc| acc.balance)
            .unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map(|acc| acc.nonce).unwrap_or_default()
    }

    pub fn code(&self, address: &Address) -> Arc<Vec<u8>> {
        self.account(address)
            .map(|acc| acc.code.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, address: &Address, key: &Word) -> Word {
        self.account(address)
            .map(|acc| acc.get(key))
            .unwrap_or_default()
    }

    pub fn storage(&self, address: &Address) -> Option<&BTreeMap<Word, Word>> {
        self.account(address).map(|acc| &acc.storage)
    }
}

/// Undo record: the previous value of whatever was changed.
#[derive(Debug)]
enum Journal {
    Storage(Address, Word, Word),
    Balance(Address, Word),
    Nonce(Address, u64),
    Code(Address, Arc<Vec<u8>>),
    Account(Address, Option<Account>),
}

#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    journal: usize,
    logs: usize,
    destructed: usize,
    refund: i64,
}

/// Everything a finished execution leaves behind besides state changes.
#[derive(Clone, Debug, Default)]
pub struct Effects {
    pub logs: Vec<Log>,
    pub refund: u64,
    pub destructed: Vec<Address>,
}

/// Journaled view of the world state for one transaction.
///
/// Every mutation records the previous value, so a failing frame can roll the
/// state back to its checkpoint exactly.
pub struct Ext<'a> {
    state: &'a mut WorldState,
    journal: Vec<Journal>,
    original: HashMap<(Address, Word), Word>,
    logs: Vec<Log>,
    destructed: Vec<Address>,
    refund: i64,
}

impl<'a> Ext<'a> {
    pub fn new(state: &'a mut WorldState) -> Self {
        Self {
            state,
            journal: Vec::new(),
            original: HashMap::new(),
            logs: Vec::new(),
            destructed: Vec::new(),
            refund: 0,
        }
    }

    pub fn state(&self) -> &WorldState {
        self.state
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal: self.journal.len(),
            logs: self.logs.len(),
            destructed: self.destructed.len(),
            refund: self.refund,
        }
    }

    pub fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.journal {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                Journal::Storage(address, key, prev) => {
                    self.state.account_mut(&address).set(key, prev);
                }
                Journal::Balance(address, prev) => {
                    self.state.account_mut(&address).balance = prev;
                }
                Journal::Nonce(address, prev) => {
                    self.state.account_mut(&address).nonce = prev;
                }
                Journal::Code(address, prev) => {
                    self.state.account_mut(&address).code = prev;
                }
                Journal::Account(address, prev) => {
                    self.state.put(address, prev);
                }
            }
        }
        self.logs.truncate(checkpoint.logs);
        self.destructed.truncate(checkpoint.destructed);
        self.refund = checkpoint.refund;
    }

    pub fn is_empty(&self, address: &Address) -> bool {
        self.state
            .account(address)
            .map(|acc| acc.is_empty())
            .unwrap_or(true)
    }

    pub fn get(&self, address: &Address, key: &Word) -> Word {
        self.state.get(address, key)
    }

    pub fn put(&mut self, address: &Address, key: Word, val: Word) {
        let prev = self.state.get(address, &key);
        self.original.entry((*address, key)).or_insert(prev);
        self.touch_account(address);
        self.journal.push(Journal::Storage(*address, key, prev));
        self.state.account_mut(address).set(key, val);
    }

    /// Value of the slot when the transaction started.
    pub fn original(&self, address: &Address, key: &Word) -> Word {
        self.original
            .get(&(*address, *key))
            .copied()
            .unwrap_or_else(|| self.state.get(address, key))
    }

    pub fn balance(&self, address: &Address) -> Word {
        self.state.balance(address)
    }

    pub fn set_balance(&mut self, address: &Address, balance: Word) {
        let prev = self.state.balance(address);
        self.touch_account(address);
        self.journal.push(Journal::Balance(*address, prev));
        self.state.account_mut(address).balance = balance;
    }

    /// Moves `value` between accounts; `false` (and no change) if `from` cannot afford it.
    pub fn transfer(&mut self, from: &Address, to: &Address, value: Word) -> bool {
        let have = self.balance(from);
        if have < value {
            return false;
        }
        if value.is_zero() || from == to {
            self.touch_account(to);
            return true;
        }
        self.set_balance(from, have - value);
        let (credited, _) = self.balance(to).overflowing_add(value);
        self.set_balance(to, credited);
        true
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    pub fn inc_nonce(&mut self, address: &Address) {
        let prev = self.state.nonce(address);
        self.touch_account(address);
        self.journal.push(Journal::Nonce(*address, prev));
        self.state.account_mut(address).nonce = prev + 1;
    }

    pub fn code(&self, address: &Address) -> Arc<Vec<u8>> {
        self.state.code(address)
    }

    pub fn code_hash(&self, address: &Address) -> Word {
        self.state
            .account(address)
            .filter(|acc| !acc.is_empty())
            .map(|acc| acc.code_hash())
            .unwrap_or_default()
    }

    pub fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        let prev = self.state.code(address);
        self.touch_account(address);
        self.journal.push(Journal::Code(*address, prev));
        self.state.account_mut(address).code = Arc::new(code);
    }

    /// Fresh contract account (nonce 1 per EIP-161), keeping any balance sent there earlier.
    pub fn create_account(&mut self, address: &Address) {
        let prev = self.state.account(address).cloned();
        self.journal.push(Journal::Account(*address, prev.clone()));
        self.state.put(
            *address,
            Some(Account {
                balance: prev.map(|acc| acc.balance).unwrap_or_default(),
                nonce: 1,
                ..Default::default()
            }),
        );
    }

    /// Collision per EIP-684: the target already has code or a non-zero nonce.
    pub fn collides(&self, address: &Address) -> bool {
        self.state
            .account(address)
            .map(|acc| acc.nonce > 0 || acc.has_code())
            .unwrap_or_default()
    }

    pub fn log(&mut self, log: Log) {
        self.logs.push(log);
    }

    pub fn selfdestruct(&mut self, address: &Address) -> bool {
        if self.destructed.contains(address) {
            return false;
        }
        self.destructed.push(*address);
        true
    }

    pub fn add_refund(&mut self, delta: i64) {
        self.refund += delta;
    }

    pub fn storage(&self, address: &Address) -> BTreeMap<Word, Word> {
        self.state.storage(address).cloned().unwrap_or_default()
    }

    /// Deletes self-destructed accounts and hands back what execution produced.
    pub fn finish(self) -> Effects {
        let destructed: BTreeSet<Address> = self.destructed.iter().copied().collect();
        for address in &destructed {
            self.state.remove(address);
        }
        Effects {
            logs: self.logs,
            refund: self.refund.max(0) as u64,
            destructed: destructed.into_iter().collect(),
        }
    }

    fn touch_account(&mut self, address: &Address) {
        if !self.state.exists(address) {
            self.journal.push(Journal::Account(*address, None));
            self.state.account_mut(address);
        }
    }
}
