use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    common::{Word, address::Address},
    ext::WorldState,
    opcodes::Opcode,
    outcome::ExecutionOutcome,
};

/// Interpreter state at a step boundary, before the opcode runs.
pub struct Step<'a> {
    /// 1-based call depth.
    pub depth: usize,
    /// Byte offset of the opcode.
    pub pc: usize,
    pub opcode: Opcode,
    pub gas: u64,
    /// Bottom of the stack first.
    pub stack: &'a [Word],
    pub memory: &'a [u8],
    /// Account whose storage the frame reads and writes.
    pub address: &'a Address,
}

/// Hooks into the interpreter loop. Tracers observe; they never alter execution.
///
/// Every `step` is followed by exactly one `step_end`. For opcodes that enter a
/// sub-frame the `step_end` arrives after the sub-frame returns, so the steps of
/// the sub-frame are nested in between.
#[allow(unused_variables)] // default impl ignores all arguments
pub trait EventTracer {
    fn step(&mut self, step: &Step<'_>, state: &WorldState) {}
    fn step_end(&mut self, gas_remaining: u64) {}
}

#[derive(Default)]
pub struct NoopTracer;

impl EventTracer for NoopTracer {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructLog {
    pub depth: usize,
    pub pc: usize,
    pub op: String,
    /// Gas available before the step.
    pub gas: u64,
    /// Charged by the step, including whatever a sub-frame it entered consumed.
    pub gas_cost: u64,
    pub stack: Vec<String>,
    pub memory: Vec<String>,
    /// Storage of the active account as it was before the step.
    pub storage: BTreeMap<String, String>,
}

impl StructLog {
    pub fn remaining(&self) -> u64 {
        self.gas.saturating_sub(self.gas_cost)
    }
}

/// Records one [`StructLog`] per executed opcode.
#[derive(Default)]
pub struct StructLogTracer {
    logs: Vec<StructLog>,
    pending: Vec<usize>,
}

impl StructLogTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(self) -> Vec<StructLog> {
        self.logs
    }
}

impl EventTracer for StructLogTracer {
    fn step(&mut self, step: &Step<'_>, state: &WorldState) {
        let storage = state
            .storage(step.address)
            .map(|storage| {
                storage
                    .iter()
                    .map(|(key, val)| (key.to_hex(), val.to_hex()))
                    .collect()
            })
            .unwrap_or_default();

        self.pending.push(self.logs.len());
        self.logs.push(StructLog {
            depth: step.depth,
            pc: step.pc,
            op: step.opcode.name(),
            gas: step.gas,
            gas_cost: 0,
            stack: step.stack.iter().map(Word::to_hex).collect(),
            memory: step.memory.chunks(32).map(hex::encode).collect(),
            storage,
        });
    }

    fn step_end(&mut self, gas_remaining: u64) {
        if let Some(log) = self.pending.pop().and_then(|index| self.logs.get_mut(index)) {
            log.gas_cost = log.gas.saturating_sub(gas_remaining);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub gas: u64,
    pub failed: bool,
    /// Hex without prefix.
    pub return_value: String,
    pub struct_logs: Vec<StructLog>,
    #[serde(skip)]
    pub outcome: ExecutionOutcome,
}

impl TraceResult {
    pub fn new(outcome: ExecutionOutcome, gas: u64, struct_logs: Vec<StructLog>) -> Self {
        Self {
            gas,
            failed: !outcome.is_success(),
            return_value: hex::encode(outcome.return_data()),
            struct_logs,
            outcome,
        }
    }
}
