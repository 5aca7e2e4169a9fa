//! In-memory development chain: validates, executes and mines transactions.
//!
//! Every `snapshot_interval`-th block keeps the world state as of its parent.
//! A historical transaction is replayed on an isolated copy of the nearest
//! snapshot at or before its block, then through the blocks in between.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;

use crate::{
    common::{
        Hex, Word,
        account::Account,
        address::Address,
        block::{Block, Receipt},
        tx::{Transaction, TxRequest},
    },
    config::Config,
    executor::{Call, Env, Executor},
    ext::{Ext, WorldState},
    gas::GasSchedule,
    outcome::ExecutionResult,
    tracer::{EventTracer, NoopTracer, StructLogTracer, TraceResult},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown transaction {0}")]
    UnknownTransaction(Word),
    #[error("sender account not recognized")]
    MissingSender,
    #[error("no transactions to mine")]
    EmptyBatch,
    #[error("insufficient funds for gas * price + value: have {have} want {need}")]
    InsufficientFunds { have: Word, need: Word },
    #[error("the tx doesn't have the correct nonce. account has nonce of: {expected} tx has nonce of: {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("intrinsic gas too low: have {have}, want {need}")]
    IntrinsicGas { have: u64, need: u64 },
    #[error("exceeds block gas limit: gas {gas}, limit {limit}")]
    BlockGasLimit { gas: u64, limit: u64 },
    #[error(transparent)]
    Malformed(#[from] crate::common::error::Error),
}

/// A transaction as stored in the chain's index.
#[derive(Clone, Debug)]
pub struct TxRecord {
    pub transaction: Transaction,
    pub receipt: Receipt,
    pub result: ExecutionResult,
}

#[derive(Clone, Debug)]
struct MinedBlock {
    header: Block,
    /// Block-level environment; origin and gas price are set per transaction.
    env: Env,
    /// World state before this block; only every `snapshot_interval`-th block.
    pre_state: Option<Arc<WorldState>>,
    transactions: Vec<Transaction>,
}

pub struct Chain {
    config: Config,
    schedule: GasSchedule,
    state: WorldState,
    blocks: Vec<MinedBlock>,
    index: HashMap<Word, TxRecord>,
}

/// Executes one validated transaction against `state`.
///
/// The fee is charged and the nonce bumped up front, whatever the outcome;
/// execution effects survive only if the outermost frame succeeds.
pub fn apply_transaction<T: EventTracer>(
    schedule: &GasSchedule,
    block: &Env,
    state: &mut WorldState,
    tx: &Transaction,
    tracer: T,
) -> (ExecutionResult, T) {
    let env = Env {
        origin: tx.from,
        gas_price: tx.gas_price,
        ..block.clone()
    };
    let fee = Word::from(tx.gas).overflowing_mul(tx.gas_price).0;

    let sender = state.account_mut(&tx.from);
    sender.balance = sender.balance.saturating_sub(fee);
    let nonce = sender.nonce;
    sender.nonce += 1;

    let intrinsic = schedule.intrinsic(tx.input.as_bytes(), tx.is_create());
    let gas = tx.gas.saturating_sub(intrinsic);

    let mut ext = Ext::new(state);
    let mut executor = Executor::new(schedule, &env).with_tracer(tracer);
    let frame = match tx.to {
        Some(to) => {
            let call = Call {
                from: tx.from,
                to,
                code: to,
                value: tx.value,
                data: tx.input.as_bytes().to_vec(),
                gas,
            };
            executor.call(&mut ext, call)
        }
        None => {
            let address = tx.from.create(nonce);
            let call = Call {
                from: tx.from,
                to: address,
                code: address,
                value: tx.value,
                data: vec![],
                gas,
            };
            executor.create(&mut ext, call, tx.input.as_bytes().to_vec())
        }
    };
    let tracer = executor.into_tracer();
    let effects = ext.finish();

    let success = frame.outcome.is_success();
    let spent = tx.gas - frame.gas_left;
    let refund = if success {
        effects.refund.min(spent / schedule.refund_quotient)
    } else {
        0
    };
    let gas_used = spent - refund;

    let unused = Word::from(tx.gas - gas_used).overflowing_mul(tx.gas_price).0;
    let reward = Word::from(gas_used).overflowing_mul(tx.gas_price).0;
    let sender = state.account_mut(&tx.from);
    sender.balance = sender.balance.overflowing_add(unused).0;
    if !reward.is_zero() {
        let coinbase = state.account_mut(&env.coinbase);
        coinbase.balance = coinbase.balance.overflowing_add(reward).0;
    }

    let result = ExecutionResult {
        outcome: frame.outcome,
        gas_used,
        gas_refund: refund,
        logs: if success { effects.logs } else { vec![] },
        created: if success { frame.created } else { None },
    };
    (result, tracer)
}

/// Everything needed to re-run a mined transaction under trace, detached
/// from the chain so it can run without holding any lock.
pub struct TraceJob {
    hash: Word,
    schedule: GasSchedule,
    env: Env,
    pre_state: Arc<WorldState>,
    /// Whole blocks between the snapshot and the target's block.
    blocks: Vec<(Env, Vec<Transaction>)>,
    predecessors: Vec<Transaction>,
    target: Transaction,
}

impl TraceJob {
    pub fn run(self) -> TraceResult {
        let mut state = WorldState::clone(&self.pre_state);
        let mut replayed = 0;
        for (env, transactions) in &self.blocks {
            for tx in transactions {
                apply_transaction(&self.schedule, env, &mut state, tx, NoopTracer);
            }
            replayed += transactions.len();
        }
        for tx in &self.predecessors {
            apply_transaction(&self.schedule, &self.env, &mut state, tx, NoopTracer);
        }
        replayed += self.predecessors.len();
        let (result, tracer) = apply_transaction(
            &self.schedule,
            &self.env,
            &mut state,
            &self.target,
            StructLogTracer::new(),
        );
        let logs = tracer.take();
        tracing::debug!(
            hash = %self.hash,
            blocks = self.blocks.len(),
            replayed,
            steps = logs.len(),
            "transaction traced"
        );
        TraceResult::new(result.outcome, result.gas_used, logs)
    }
}

impl Chain {
    pub fn new(config: Config) -> Self {
        let schedule = GasSchedule::for_hardfork(config.hardfork);
        let state = WorldState::new(config.accounts.iter().map(|genesis| {
            let mut account = Account::with_balance(genesis.balance);
            if let Some(code) = &genesis.code {
                account.code = Arc::new(code.as_bytes().to_vec());
            }
            (genesis.address, account)
        }));

        let mut chain = Self {
            config,
            schedule,
            state,
            blocks: vec![],
            index: HashMap::new(),
        };
        let env = chain.block_env(0);
        let pre_state = Some(Arc::new(chain.state.clone()));
        let header = Block {
            number: 0,
            hash: Word::zero(),
            parent_hash: Word::zero(),
            timestamp: env.timestamp,
            gas_limit: env.gas_limit,
            gas_used: 0,
            coinbase: env.coinbase,
            transactions: vec![],
        }
        .seal();
        chain.blocks.push(MinedBlock {
            header,
            env,
            pre_state,
            transactions: vec![],
        });
        tracing::info!(
            accounts = chain.config.accounts.len(),
            hardfork = ?chain.config.hardfork,
            "genesis"
        );
        chain
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn send_transaction(&mut self, request: TxRequest) -> Result<Word, ChainError> {
        let hashes = self.send_transactions(vec![request])?;
        hashes.first().copied().ok_or(ChainError::EmptyBatch)
    }

    /// Mines all requests into one block, in order. If any request fails
    /// validation, none of them is included.
    pub fn send_transactions(&mut self, requests: Vec<TxRequest>) -> Result<Vec<Word>, ChainError> {
        if requests.is_empty() {
            return Err(ChainError::EmptyBatch);
        }

        let number = self.blocks.len() as u64;
        let env = self.block_env(number);
        let checkpoint = self.state.clone();

        let mut mined = Vec::with_capacity(requests.len());
        for request in requests {
            let tx = match self.resolve(request).and_then(|tx| self.validate(&tx).map(|_| tx)) {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::warn!(error = %e, "transaction rejected");
                    self.state = checkpoint;
                    return Err(e);
                }
            };
            let (result, _) =
                apply_transaction(&self.schedule, &env, &mut self.state, &tx, NoopTracer);
            mined.push((tx, result));
        }

        let parent_hash = self
            .blocks
            .last()
            .map(|block| block.header.hash)
            .unwrap_or_default();
        let hashes: Vec<Word> = mined.iter().map(|(tx, _)| tx.hash()).collect();
        let header = Block {
            number,
            hash: Word::zero(),
            parent_hash,
            timestamp: env.timestamp,
            gas_limit: env.gas_limit,
            gas_used: mined.iter().map(|(_, result)| result.gas_used).sum(),
            coinbase: env.coinbase,
            transactions: hashes.clone(),
        }
        .seal();

        let mut cumulative = 0;
        let mut transactions = Vec::with_capacity(mined.len());
        for (position, ((tx, result), hash)) in mined.into_iter().zip(&hashes).enumerate() {
            cumulative += result.gas_used;
            let receipt = Receipt {
                transaction_hash: *hash,
                transaction_index: position as u64,
                block_number: number,
                block_hash: header.hash,
                from: tx.from,
                to: tx.to,
                contract_address: result.created,
                gas_used: result.gas_used,
                cumulative_gas_used: cumulative,
                status: result.outcome.is_success() as u64,
                logs: result.logs.clone(),
                error: result.outcome.detail(),
            };
            tracing::info!(
                hash = %hash,
                block = number,
                gas_used = result.gas_used,
                outcome = result.outcome.classification().unwrap_or("success"),
                "transaction mined"
            );
            transactions.push(tx.clone());
            self.index.insert(
                *hash,
                TxRecord {
                    transaction: tx,
                    receipt,
                    result,
                },
            );
        }

        let pre_state = (number % self.config.snapshot_interval.max(1) == 0)
            .then(|| Arc::new(checkpoint));
        self.blocks.push(MinedBlock {
            header,
            env,
            pre_state,
            transactions,
        });
        Ok(hashes)
    }

    /// Executes against a scratch copy of the live state. Nothing is committed.
    pub fn call(&self, request: TxRequest) -> Result<ExecutionResult, ChainError> {
        let from = request
            .from
            .or_else(|| self.config.accounts.first().map(|account| account.address))
            .unwrap_or_default();
        let tx = Transaction {
            from,
            to: request.to,
            input: request.data.unwrap_or_default(),
            gas: request.gas.unwrap_or(self.config.block_gas_limit),
            gas_price: request.gas_price.unwrap_or_default(),
            value: request.value.unwrap_or_default(),
            nonce: self.state.nonce(&from),
        };

        let need = self.schedule.intrinsic(tx.input.as_bytes(), tx.is_create());
        if need > tx.gas {
            return Err(ChainError::IntrinsicGas { have: tx.gas, need });
        }

        let mut scratch = self.state.clone();
        let cost = Word::from(tx.gas)
            .checked_mul(tx.gas_price)
            .and_then(|fee| fee.checked_add(tx.value))
            .unwrap_or_else(Word::max);
        let sender = scratch.account_mut(&from);
        if sender.balance < cost {
            sender.balance = cost;
        }

        let env = self.block_env(self.blocks.len() as u64);
        let (result, _) = apply_transaction(&self.schedule, &env, &mut scratch, &tx, NoopTracer);
        tracing::debug!(
            from = %from,
            gas_used = result.gas_used,
            outcome = result.outcome.classification().unwrap_or("success"),
            "call executed"
        );
        Ok(result)
    }

    /// Detaches a replay of `hash` from the chain.
    pub fn trace_job(&self, hash: &Word) -> Result<TraceJob, ChainError> {
        let record = self
            .index
            .get(hash)
            .ok_or(ChainError::UnknownTransaction(*hash))?;
        let number = record.receipt.block_number as usize;
        let block = self
            .blocks
            .get(number)
            .ok_or(ChainError::UnknownTransaction(*hash))?;
        let position = record.receipt.transaction_index as usize;

        // Block 0 always holds a snapshot.
        let (base, pre_state) = self.blocks[..=number]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, block)| Some((index, block.pre_state.clone()?)))
            .ok_or(ChainError::UnknownTransaction(*hash))?;
        let blocks = self.blocks[base..number]
            .iter()
            .map(|block| (block.env.clone(), block.transactions.clone()))
            .collect();

        Ok(TraceJob {
            hash: *hash,
            schedule: self.schedule.clone(),
            env: block.env.clone(),
            pre_state,
            blocks,
            predecessors: block.transactions[..position].to_vec(),
            target: record.transaction.clone(),
        })
    }

    pub fn trace_transaction(&self, hash: &Word) -> Result<TraceResult, ChainError> {
        Ok(self.trace_job(hash)?.run())
    }

    pub fn transaction(&self, hash: &Word) -> Option<&TxRecord> {
        self.index.get(hash)
    }

    pub fn receipt(&self, hash: &Word) -> Option<&Receipt> {
        self.index.get(hash).map(|record| &record.receipt)
    }

    pub fn block(&self, number: u64) -> Option<&Block> {
        self.blocks.get(number as usize).map(|block| &block.header)
    }

    pub fn block_number(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.config
            .accounts
            .iter()
            .map(|account| account.address)
            .collect()
    }

    pub fn balance(&self, address: &Address) -> Word {
        self.state.balance(address)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    pub fn code(&self, address: &Address) -> Hex {
        Hex::from(self.state.code(address).as_slice())
    }

    pub fn storage_at(&self, address: &Address, key: &Word) -> Word {
        self.state.get(address, key)
    }

    fn resolve(&self, request: TxRequest) -> Result<Transaction, ChainError> {
        let from = request.from.ok_or(ChainError::MissingSender)?;
        Ok(Transaction {
            from,
            to: request.to,
            input: request.data.unwrap_or_default(),
            gas: request.gas.unwrap_or(self.config.default_gas_limit),
            gas_price: request.gas_price.unwrap_or(self.config.default_gas_price),
            value: request.value.unwrap_or_default(),
            nonce: request.nonce.unwrap_or_else(|| self.state.nonce(&from)),
        })
    }

    fn validate(&self, tx: &Transaction) -> Result<(), ChainError> {
        let expected = self.state.nonce(&tx.from);
        if tx.nonce != expected {
            return Err(ChainError::NonceMismatch {
                expected,
                got: tx.nonce,
            });
        }
        if tx.gas > self.config.block_gas_limit {
            return Err(ChainError::BlockGasLimit {
                gas: tx.gas,
                limit: self.config.block_gas_limit,
            });
        }
        let need = self.schedule.intrinsic(tx.input.as_bytes(), tx.is_create());
        if need > tx.gas {
            return Err(ChainError::IntrinsicGas { have: tx.gas, need });
        }

        let have = self.state.balance(&tx.from);
        let need = Word::from(tx.gas)
            .checked_mul(tx.gas_price)
            .and_then(|fee| fee.checked_add(tx.value))
            .unwrap_or_else(Word::max);
        if have < need {
            return Err(ChainError::InsufficientFunds { have, need });
        }
        Ok(())
    }

    fn block_env(&self, number: u64) -> Env {
        let timestamp = self.config.time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default()
        });
        Env {
            coinbase: self.config.coinbase,
            number,
            timestamp,
            gas_limit: self.config.block_gas_limit,
            chain_id: self.config.chain_id,
            block_hashes: self.blocks.iter().map(|block| block.header.hash).collect(),
            ..Env::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::address::addr,
        config::{GenesisAccount, dev_account},
        outcome::ExecutionOutcome,
    };
    use pretty_assertions::assert_eq;

    /// PUSH1 0 CALLDATALOAD PUSH1 0 SSTORE STOP
    const STORE_ARG: &str = "60003560005500";
    /// PUSH1 0 SLOAD PUSH1 1 ADD PUSH1 0 SSTORE STOP
    const COUNTER: &str = "60005460010160005500";
    /// PUSH1 0 PUSH1 0 REVERT
    const REVERT: &str = "60006000fd";

    const STORE: Address = addr("0x5107e");
    const COUNT: Address = addr("0xc0c0");
    const FAIL: Address = addr("0xfa11");

    fn chain() -> Chain {
        let config = Config::default()
            .time(1_700_000_000)
            .account(contract(STORE, STORE_ARG))
            .account(contract(COUNT, COUNTER))
            .account(contract(FAIL, REVERT));
        Chain::new(config)
    }

    fn contract(address: Address, code: &str) -> GenesisAccount {
        GenesisAccount {
            address,
            balance: Word::zero(),
            code: Some(Hex::parse(code).unwrap()),
        }
    }

    fn sender() -> Address {
        dev_account(0)
    }

    #[test]
    fn test_genesis() {
        let chain = chain();
        assert_eq!(chain.block_number(), 0);
        assert_eq!(chain.accounts().len(), 13);
        assert_eq!(chain.code(&COUNT).to_string(), format!("0x{COUNTER}"));
        assert_eq!(chain.balance(&sender()), Word::from(100_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_success_commits_and_charges_fee() {
        let mut chain = chain();
        let before = chain.balance(&sender());
        let hash = chain
            .send_transaction(TxRequest::new(sender()).to(COUNT).gas_price(Word::one()))
            .unwrap();

        let receipt = chain.receipt(&hash).unwrap().clone();
        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number, 1);
        // 21000 + PUSH1 SLOAD PUSH1 ADD PUSH1 SSTORE(set) STOP
        assert_eq!(receipt.gas_used, 21000 + 3 + 200 + 3 + 3 + 3 + 20000 + 1);
        assert_eq!(chain.storage_at(&COUNT, &Word::zero()), Word::one());
        assert_eq!(chain.nonce(&sender()), 1);
        assert_eq!(
            chain.balance(&sender()),
            before - Word::from(receipt.gas_used)
        );
        assert_eq!(chain.balance(&Address::zero()), Word::from(receipt.gas_used));
        assert_eq!(receipt.error, None);
    }

    #[test]
    fn test_revert_keeps_nonce_and_fee_only() {
        let mut chain = chain();
        let before = chain.state().clone();
        let hash = chain
            .send_transaction(
                TxRequest::new(sender())
                    .to(FAIL)
                    .value(Word::from(1000u32))
                    .gas_price(Word::one()),
            )
            .unwrap();

        let receipt = chain.receipt(&hash).unwrap();
        assert!(!receipt.succeeded());
        let detail = receipt.error.clone().unwrap();
        assert_eq!(detail.error, "revert");
        assert_eq!(detail.program_counter, 4);

        assert_eq!(chain.nonce(&sender()), 1);
        assert_eq!(chain.balance(&FAIL), Word::zero());
        assert_eq!(
            chain.balance(&sender()),
            before.balance(&sender()) - Word::from(receipt.gas_used)
        );
    }

    #[test]
    fn test_validation() {
        let mut chain = chain();
        assert_eq!(
            chain.send_transaction(TxRequest::new(sender()).to(COUNT).nonce(5)),
            Err(ChainError::NonceMismatch {
                expected: 0,
                got: 5
            })
        );
        assert_eq!(
            chain.send_transaction(TxRequest::new(sender()).to(COUNT).gas(20_000)),
            Err(ChainError::IntrinsicGas {
                have: 20_000,
                need: 21_000
            })
        );
        let poor = addr("0x9002");
        assert!(matches!(
            chain.send_transaction(TxRequest::new(poor).to(COUNT)),
            Err(ChainError::InsufficientFunds { .. })
        ));
        assert_eq!(
            chain.send_transaction(TxRequest::default().to(COUNT)),
            Err(ChainError::MissingSender)
        );
        assert_eq!(chain.block_number(), 0);
        assert_eq!(chain.nonce(&sender()), 0);
    }

    #[test]
    fn test_refund_is_capped() {
        let mut chain = chain();
        let one = Word::one().into_bytes();
        chain
            .send_transaction(TxRequest::new(sender()).to(STORE).data(one))
            .unwrap();
        assert_eq!(chain.storage_at(&STORE, &Word::zero()), Word::one());

        let hash = chain
            .send_transaction(TxRequest::new(sender()).to(STORE).data([0u8; 32]))
            .unwrap();
        let record = chain.transaction(&hash).unwrap();
        // intrinsic 21000 + 32 * 4, then 3 + 3 + 3 + 5000 + 1; refund capped at half.
        let spent = 21_128 + 5_010;
        assert_eq!(record.result.gas_refund, spent / 2);
        assert_eq!(record.receipt.gas_used, spent - spent / 2);
        assert_eq!(chain.storage_at(&STORE, &Word::zero()), Word::zero());
    }

    #[test]
    fn test_create_installs_runtime_code() {
        let mut chain = chain();
        let init = Hex::parse("6006600c60003960066000f3602a60005500").unwrap();
        let hash = chain
            .send_transaction(TxRequest::new(sender()).data(init).gas(200_000))
            .unwrap();

        let receipt = chain.receipt(&hash).unwrap();
        assert!(receipt.succeeded());
        let created = sender().create(0);
        assert_eq!(receipt.contract_address, Some(created));
        assert_eq!(chain.code(&created).to_string(), "0x602a60005500");
        assert_eq!(chain.nonce(&created), 1);
    }

    #[test]
    fn test_batch_mines_one_block() {
        let mut chain = chain();
        let hashes = chain
            .send_transactions(vec![
                TxRequest::new(sender()).to(COUNT),
                TxRequest::new(sender()).to(COUNT),
                TxRequest::new(dev_account(1)).to(COUNT),
            ])
            .unwrap();
        assert_eq!(hashes.len(), 3);
        assert_eq!(chain.block_number(), 1);
        assert_eq!(chain.storage_at(&COUNT, &Word::zero()), Word::from(3u8));

        let receipts: Vec<_> = hashes.iter().map(|h| chain.receipt(h).unwrap()).collect();
        assert_eq!(receipts[2].transaction_index, 2);
        assert_eq!(
            receipts[2].cumulative_gas_used,
            receipts.iter().map(|r| r.gas_used).sum::<u64>()
        );
        let block = chain.block(1).unwrap();
        assert_eq!(block.transactions, hashes);
        assert_eq!(block.parent_hash, chain.block(0).unwrap().hash);
    }

    #[test]
    fn test_batch_rejection_rolls_back() {
        let mut chain = chain();
        let result = chain.send_transactions(vec![
            TxRequest::new(sender()).to(COUNT),
            TxRequest::new(sender()).to(COUNT).nonce(7),
        ]);
        assert!(result.is_err());
        assert_eq!(chain.storage_at(&COUNT, &Word::zero()), Word::zero());
        assert_eq!(chain.nonce(&sender()), 0);
        assert_eq!(chain.block_number(), 0);
    }

    #[test]
    fn test_call_does_not_mutate() {
        let chain = chain();
        let before = chain.state().clone();
        let result = chain
            .call(TxRequest::new(addr("0x9002")).to(COUNT))
            .unwrap();
        assert!(result.outcome.is_success());
        assert_eq!(chain.state(), &before);

        let result = chain.call(TxRequest::default().to(FAIL)).unwrap();
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Revert {
                data: vec![],
                pc: 4
            }
        );
    }

    #[test]
    fn test_trace_replays_predecessors() {
        let mut chain = chain();
        let hashes = chain
            .send_transactions(vec![
                TxRequest::new(sender()).to(COUNT),
                TxRequest::new(dev_account(1)).to(COUNT),
            ])
            .unwrap();
        let live = chain.state().clone();

        let trace = chain.trace_transaction(&hashes[1]).unwrap();
        assert!(!trace.failed);
        // SLOAD of the second transaction sees the first one's write.
        let sload = trace.struct_logs.iter().find(|log| log.op == "SLOAD").unwrap();
        assert_eq!(
            sload.storage.get(&Word::zero().to_hex()),
            Some(&Word::one().to_hex())
        );
        assert_eq!(trace.gas, chain.receipt(&hashes[1]).unwrap().gas_used);
        assert_eq!(chain.trace_transaction(&hashes[1]).unwrap(), trace);
        assert_eq!(chain.state(), &live);

        assert_eq!(
            chain.trace_transaction(&Word::from(7u8)).unwrap_err(),
            ChainError::UnknownTransaction(Word::from(7u8))
        );
    }

    #[test]
    fn test_trace_replays_from_sparse_snapshots() {
        let mine = |interval| {
            let mut chain = Chain::new(chain().config.clone().snapshot_interval(interval));
            let hashes: Vec<Word> = (0..8)
                .map(|index| {
                    chain
                        .send_transaction(TxRequest::new(dev_account(index % 3)).to(COUNT))
                        .unwrap()
                })
                .collect();
            (chain, hashes)
        };
        let (sparse, hashes) = mine(3);
        let (dense, _) = mine(1);
        assert_eq!(sparse.blocks.iter().filter(|b| b.pre_state.is_some()).count(), 3);
        assert_eq!(dense.blocks.iter().filter(|b| b.pre_state.is_some()).count(), 9);

        // Block 8 replays blocks 6 and 7 on top of the block 6 snapshot.
        let live = sparse.state().clone();
        let trace = sparse.trace_transaction(&hashes[7]).unwrap();
        let sload = trace.struct_logs.iter().find(|log| log.op == "SLOAD").unwrap();
        assert_eq!(
            sload.storage.get(&Word::zero().to_hex()),
            Some(&Word::from(7u8).to_hex())
        );
        assert_eq!(trace, dense.trace_transaction(&hashes[7]).unwrap());
        assert_eq!(
            sparse.trace_transaction(&hashes[2]).unwrap(),
            dense.trace_transaction(&hashes[2]).unwrap()
        );
        assert_eq!(sparse.state(), &live);
    }
}
