use serde::{Deserialize, Serialize};

use crate::{
    common::{Hex, Word, address::Address, hash::keccak256, quantity},
    gas::Hardfork,
};

pub const DEFAULT_GAS_LIMIT: u64 = 90_000;
pub const DEFAULT_GAS_PRICE: u64 = 20_000_000_000;
pub const BLOCK_GAS_LIMIT: u64 = 6_721_975;
pub const CHAIN_ID: u64 = 1337;
pub const SNAPSHOT_INTERVAL: u64 = 16;

const ETHER: u128 = 1_000_000_000_000_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Word,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Hex>,
}

impl GenesisAccount {
    pub fn funded(address: Address, balance: Word) -> Self {
        Self {
            address,
            balance,
            code: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[serde(alias = "vmErrorsOnRPCResponse")]
    pub strict_errors_on_response: bool,
    #[serde(with = "quantity")]
    pub default_gas_limit: u64,
    pub default_gas_price: Word,
    #[serde(with = "quantity")]
    pub block_gas_limit: u64,
    #[serde(with = "quantity")]
    pub chain_id: u64,
    pub hardfork: Hardfork,
    pub coinbase: Address,
    /// Fixed timestamp for every block; wall clock when absent.
    #[serde(with = "quantity::opt")]
    pub time: Option<u64>,
    /// Every this many blocks the pre-block world state is kept for replay.
    #[serde(with = "quantity")]
    pub snapshot_interval: u64,
    pub accounts: Vec<GenesisAccount>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_errors_on_response: false,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            default_gas_price: Word::from(DEFAULT_GAS_PRICE),
            block_gas_limit: BLOCK_GAS_LIMIT,
            chain_id: CHAIN_ID,
            hardfork: Hardfork::default(),
            coinbase: Address::zero(),
            time: None,
            snapshot_interval: SNAPSHOT_INTERVAL,
            accounts: (0..10)
                .map(|index| GenesisAccount::funded(dev_account(index), Word::from(100 * ETHER)))
                .collect(),
        }
    }
}

impl Config {
    /// Reads `.env`, then the JSON file named by `ARMATURE_CONFIG` (if any),
    /// then applies the `ARMATURE_STRICT_ERRORS` override.
    pub fn load() -> eyre::Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("ARMATURE_CONFIG") {
            Ok(path) => {
                let json = std::fs::read_to_string(&path)?;
                let config: Config = serde_json::from_str(&json)?;
                tracing::debug!(path = %path, "config loaded");
                config
            }
            Err(_) => Config::default(),
        };

        if let Ok(flag) = std::env::var("ARMATURE_STRICT_ERRORS") {
            config.strict_errors_on_response = parse_flag(&flag)?;
        }
        Ok(config)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_errors_on_response = strict;
        self
    }

    pub fn hardfork(mut self, hardfork: Hardfork) -> Self {
        self.hardfork = hardfork;
        self
    }

    pub fn time(mut self, time: u64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn snapshot_interval(mut self, blocks: u64) -> Self {
        self.snapshot_interval = blocks;
        self
    }

    pub fn account(mut self, account: GenesisAccount) -> Self {
        self.accounts.push(account);
        self
    }
}

/// Deterministic dev address: the low 20 bytes of `keccak256("armature:<index>")`.
pub fn dev_account(index: usize) -> Address {
    let hash = keccak256(format!("armature:{index}").as_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

fn parse_flag(value: &str) -> eyre::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(eyre::eyre!("invalid boolean flag: '{other}'")),
    }
}
