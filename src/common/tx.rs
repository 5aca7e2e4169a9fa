use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::common::{Hex, Word, address::Address, hash::keccak256, quantity};

/// A transaction accepted for execution: every field is resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Option<Address>,
    pub input: Hex,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(rename = "gasPrice")]
    pub gas_price: Word,
    pub value: Word,
    #[serde(with = "quantity")]
    pub nonce: u64,
}

impl Transaction {
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// `keccak256(rlp([nonce, gasPrice, gas, to, value, input, from]))`.
    ///
    /// Depends only on the transaction's inputs, never on how it executes.
    pub fn hash(&self) -> Word {
        let mut stream = RlpStream::new_list(7);
        stream.append(&self.nonce);
        stream.append(&trimmed(&self.gas_price));
        stream.append(&self.gas);
        match &self.to {
            Some(to) => stream.append(&to.0.to_vec()),
            None => stream.append_empty_data(),
        };
        stream.append(&trimmed(&self.value));
        stream.append(&self.input.as_bytes().to_vec());
        stream.append(&self.from.0.to_vec());
        Word::from_bytes(&keccak256(&stream.out()))
    }
}

fn trimmed(word: &Word) -> Vec<u8> {
    word.into_bytes()
        .into_iter()
        .skip_while(|byte| byte == &0)
        .collect()
}

/// Transaction (or read-only call) as requested over the wire, with optional fields
/// that the chain fills in from its defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TxRequest {
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default, alias = "input")]
    pub data: Option<Hex>,
    #[serde(default, with = "quantity::opt")]
    pub gas: Option<u64>,
    #[serde(default, rename = "gasPrice")]
    pub gas_price: Option<Word>,
    #[serde(default)]
    pub value: Option<Word>,
    #[serde(default, with = "quantity::opt")]
    pub nonce: Option<u64>,
}

impl TxRequest {
    pub fn new(from: Address) -> Self {
        Self {
            from: Some(from),
            ..Default::default()
        }
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn data(mut self, data: impl Into<Hex>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn gas_price(mut self, gas_price: Word) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn value(mut self, value: Word) -> Self {
        self.value = Some(value);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}
