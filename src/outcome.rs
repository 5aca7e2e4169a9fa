use serde::{Deserialize, Serialize};

use crate::{
    abi,
    common::{Hex, address::Address, block::Log},
    executor::VmError,
};

/// How the outermost frame (or any single frame) of an execution ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(Vec<u8>),
    /// `pc` is the byte offset of the REVERT instruction.
    Revert { data: Vec<u8>, pc: usize },
    /// `pc` is the byte offset of the faulting instruction.
    Error { kind: VmError, pc: usize },
}

impl Default for ExecutionOutcome {
    fn default() -> Self {
        Self::Success(vec![])
    }
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Data handed back to the caller: empty for faults.
    pub fn return_data(&self) -> &[u8] {
        match self {
            Self::Success(data) | Self::Revert { data, .. } => data,
            Self::Error { .. } => &[],
        }
    }

    pub fn program_counter(&self) -> Option<usize> {
        match self {
            Self::Success(_) => None,
            Self::Revert { pc, .. } | Self::Error { pc, .. } => Some(*pc),
        }
    }

    /// Stable name of the failure kind, independent of how it is surfaced.
    pub fn classification(&self) -> Option<&'static str> {
        match self {
            Self::Success(_) => None,
            Self::Revert { .. } => Some("revert"),
            Self::Error { kind, .. } => Some(kind.classification()),
        }
    }

    /// Decoded `Error(string)` message of a revert, if there is one.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Revert { data, .. } => abi::decode_revert_reason(data),
            _ => None,
        }
    }

    /// Failure record addressed by transaction hash; `None` on success.
    pub fn detail(&self) -> Option<ErrorDetail> {
        Some(ErrorDetail {
            error: self.classification()?.to_string(),
            program_counter: self.program_counter()?,
            return_data: Hex::from(self.return_data()),
            reason: self.reason(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub error: String,
    #[serde(rename = "program_counter")]
    pub program_counter: usize,
    #[serde(rename = "return")]
    pub return_data: Hex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of running one transaction through the interpreter.
#[derive(Clone, Debug, Default)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Gas charged to the sender, after refunds.
    pub gas_used: u64,
    pub gas_refund: u64,
    pub logs: Vec<Log>,
    pub created: Option<Address>,
}
