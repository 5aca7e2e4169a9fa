use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::{
    common::{Hex, address::Address, hash, quantity, word::Word},
    outcome::ErrorDetail,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: u64,
    #[serde(with = "hash::padded")]
    pub hash: Word,
    #[serde(with = "hash::padded")]
    pub parent_hash: Word,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(rename = "miner")]
    pub coinbase: Address,
    pub transactions: Vec<Word>,
}

impl Block {
    /// Seals the header: the hash covers the parent, number, timestamp and
    /// the ordered transaction hashes.
    pub fn seal(mut self) -> Self {
        let mut stream = RlpStream::new_list(4);
        stream.append(&self.parent_hash.into_bytes().to_vec());
        stream.append(&self.number);
        stream.append(&self.timestamp);
        stream.begin_list(self.transactions.len());
        for tx in &self.transactions {
            stream.append(&tx.into_bytes().to_vec());
        }
        self.hash = Word::from_bytes(&hash::keccak256(&stream.out()));
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Word>,
    pub data: Hex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(with = "hash::padded")]
    pub transaction_hash: Word,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "hash::padded")]
    pub block_hash: Word,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(with = "quantity")]
    pub cumulative_gas_used: u64,
    /// 1 on success, 0 on revert or fault.
    #[serde(with = "quantity")]
    pub status: u64,
    pub logs: Vec<Log>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}
