use std::sync::Arc;

use thiserror::Error;

use crate::{
    common::{
        Word,
        address::Address,
        block::Log,
        hash::keccak256,
    },
    decoder::{Bytecode, Decoder, Instruction},
    ext::{Checkpoint, Ext},
    gas::{Gas, GasSchedule},
    outcome::ExecutionOutcome,
    precompiles,
    tracer::{EventTracer, NoopTracer, Step},
};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),
    #[error("invalid JUMP")]
    InvalidJump,
    #[error("call depth exceeded")]
    CallDepthExceeded,
    #[error("static state change by opcode 0x{0:02x}")]
    StaticCallViolation(u8),
    #[error("insufficient balance for transfer")]
    InsufficientBalance,
    #[error("contract address collision")]
    ContractCollision,
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
}

impl VmError {
    pub fn classification(&self) -> &'static str {
        match self {
            Self::OutOfGas => "out of gas",
            Self::StackUnderflow => "stack underflow",
            Self::StackOverflow => "stack overflow",
            Self::InvalidOpcode(_) => "invalid opcode",
            Self::InvalidJump => "invalid JUMP",
            Self::CallDepthExceeded => "call depth exceeded",
            Self::StaticCallViolation(_) => "static state change",
            Self::InsufficientBalance => "insufficient balance",
            Self::ContractCollision => "contract address collision",
            Self::ReturnDataOutOfBounds => "return data out of bounds",
        }
    }
}

const STACK_LIMIT: usize = 1024;

const CALL_DEPTH_LIMIT: usize = 1024;

const MEMORY_LIMIT: u64 = u32::MAX as u64;

/// Block and transaction environment visible to the bytecode.
#[derive(Clone, Debug, Default)]
pub struct Env {
    pub origin: Address,
    pub gas_price: Word,
    pub coinbase: Address,
    pub number: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
    /// Hashes of all earlier blocks, indexed by number.
    pub block_hashes: Vec<Word>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallType {
    #[default]
    Call,
    Callcode,
    Delegate,
    Static,
    Create,
    Create2,
}

/// Message entering a frame.
#[derive(Clone, Debug, Default)]
pub struct Call {
    pub from: Address,
    /// Account whose storage and balance the frame operates on.
    pub to: Address,
    /// Account the code is loaded from; differs from `to` for CALLCODE and DELEGATECALL.
    pub code: Address,
    pub value: Word,
    pub data: Vec<u8>,
    pub gas: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Context {
    /// 0 for the outermost frame.
    pub depth: usize,
    pub call_type: CallType,
    pub is_static: bool,
}

#[derive(Debug, Default)]
pub struct Evm {
    pub memory: Vec<u8>,
    pub stack: Vec<Word>,
    pub gas: Gas,
    /// Index into the decoded instructions, not a byte offset.
    pub pc: usize,
    /// Return data of the most recent sub-call.
    pub ret: Vec<u8>,
}

impl Evm {
    pub fn push(&mut self, value: Word) -> Result<(), VmError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Word, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Charges for and grows memory to cover `size` bytes at `offset`.
    /// Returns the region as `(offset, size)`; an empty region is `(0, 0)`
    /// whatever the offset.
    pub fn expand(
        &mut self,
        schedule: &GasSchedule,
        offset: Word,
        size: Word,
    ) -> Result<(usize, usize), VmError> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let offset = offset.to_u64().ok_or(VmError::OutOfGas)?;
        let size = size.to_u64().ok_or(VmError::OutOfGas)?;
        let end = offset.checked_add(size).ok_or(VmError::OutOfGas)?;
        if end > MEMORY_LIMIT {
            return Err(VmError::OutOfGas);
        }

        let words = end.div_ceil(32);
        let current = (self.memory.len() / 32) as u64;
        if words > current {
            let cost = schedule.memory(words) - schedule.memory(current);
            self.gas.sub(cost)?;
            self.memory.resize(words as usize * 32, 0);
        }
        Ok((offset as usize, size as usize))
    }
}

/// Where a finished frame's result goes in its caller.
#[derive(Clone, Copy, Debug)]
enum FrameKind {
    Call { ret_offset: usize, ret_size: usize },
    Create { address: Address },
}

pub struct Frame {
    pub evm: Evm,
    pub call: Call,
    pub ctx: Context,
    bytecode: Arc<Bytecode>,
    code: Arc<Vec<u8>>,
    checkpoint: Checkpoint,
    kind: FrameKind,
}

impl Frame {
    fn offset(&self) -> usize {
        self.bytecode
            .instructions
            .get(self.evm.pc)
            .map(|instruction| instruction.offset)
            .unwrap_or(self.code.len())
    }
}

/// What a frame hands back to its caller.
#[derive(Clone, Debug, Default)]
pub struct FrameResult {
    pub outcome: ExecutionOutcome,
    pub gas_left: u64,
    pub created: Option<Address>,
}

impl FrameResult {
    fn failed(kind: VmError, gas_left: u64) -> Self {
        Self {
            outcome: ExecutionOutcome::Error { kind, pc: 0 },
            gas_left,
            created: None,
        }
    }
}

enum Halt {
    Stop,
    Return(Vec<u8>),
    Revert(Vec<u8>),
    Fault(VmError),
}

enum Action {
    Continue,
    Enter(Box<Frame>),
    Exit(Halt),
}

enum Entry {
    Frame(Box<Frame>),
    Done(FrameResult),
}

/// Runs frames to completion on an explicit frame stack.
pub struct Executor<'a, T: EventTracer = NoopTracer> {
    schedule: &'a GasSchedule,
    env: &'a Env,
    tracer: T,
}

impl<'a> Executor<'a, NoopTracer> {
    pub fn new(schedule: &'a GasSchedule, env: &'a Env) -> Self {
        Self {
            schedule,
            env,
            tracer: NoopTracer,
        }
    }
}

impl<'a, T: EventTracer> Executor<'a, T> {
    pub fn with_tracer<G: EventTracer>(self, tracer: G) -> Executor<'a, G> {
        Executor {
            schedule: self.schedule,
            env: self.env,
            tracer,
        }
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }

    /// Outermost message call: transfers `call.value` and runs the code at `call.code`.
    pub fn call(&mut self, ext: &mut Ext, call: Call) -> FrameResult {
        let ctx = Context::default();
        let entry = self.enter_call(ext, call, ctx, (0, 0));
        self.run(ext, entry)
    }

    /// Outermost contract creation at `call.to` running `init` as init code.
    pub fn create(&mut self, ext: &mut Ext, call: Call, init: Vec<u8>) -> FrameResult {
        let ctx = Context {
            call_type: CallType::Create,
            ..Context::default()
        };
        let entry = self.enter_create(ext, call, init, ctx);
        self.run(ext, entry)
    }

    fn run(&mut self, ext: &mut Ext, entry: Entry) -> FrameResult {
        let root = match entry {
            Entry::Done(result) => return result,
            Entry::Frame(frame) => frame,
        };

        let mut frames = vec![root];
        let mut result = FrameResult::default();
        while let Some(frame) = frames.last_mut() {
            match self.step(frame, ext) {
                Action::Continue => {}
                Action::Enter(child) => {
                    tracing::trace!(depth = child.ctx.depth, to = %child.call.to, "enter frame");
                    frames.push(child);
                }
                Action::Exit(halt) => {
                    let Some(done) = frames.pop() else {
                        break;
                    };
                    let kind = done.kind;
                    result = self.finish(*done, halt, ext);
                    tracing::trace!(depth = frames.len(), success = result.outcome.is_success(), "exit frame");

                    if let Some(parent) = frames.last_mut() {
                        self.resume(parent, kind, &result);
                        self.tracer.step_end(parent.evm.gas.remaining());
                    }
                }
            }
        }
        result
    }

    fn step(&mut self, frame: &mut Frame, ext: &mut Ext) -> Action {
        let bytecode = frame.bytecode.clone();
        let Some(instruction) = bytecode.instructions.get(frame.evm.pc) else {
            // Running off the end of the code is an implicit STOP.
            return Action::Exit(Halt::Stop);
        };

        self.tracer.step(
            &Step {
                depth: frame.ctx.depth + 1,
                pc: instruction.offset,
                opcode: instruction.opcode,
                gas: frame.evm.gas.remaining(),
                stack: &frame.evm.stack,
                memory: &frame.evm.memory,
                address: &frame.call.to,
            },
            ext.state(),
        );

        match self.execute_instruction(frame, ext, &bytecode, instruction) {
            Ok(Action::Enter(child)) => Action::Enter(child),
            Ok(action) => {
                self.tracer.step_end(frame.evm.gas.remaining());
                action
            }
            Err(e) => {
                frame.evm.gas.exhaust();
                self.tracer.step_end(0);
                Action::Exit(Halt::Fault(e))
            }
        }
    }

    fn finish(&mut self, mut frame: Frame, halt: Halt, ext: &mut Ext) -> FrameResult {
        let pc = frame.offset();
        let outcome = match halt {
            Halt::Stop => ExecutionOutcome::Success(vec![]),
            Halt::Return(data) => ExecutionOutcome::Success(data),
            Halt::Revert(data) => ExecutionOutcome::Revert { data, pc },
            Halt::Fault(kind) => ExecutionOutcome::Error { kind, pc },
        };

        let mut created = None;
        let outcome = match (frame.kind, outcome) {
            (FrameKind::Create { address }, ExecutionOutcome::Success(code)) => {
                let deposit = self.schedule.code_deposit * code.len() as u64;
                match frame.evm.gas.sub(deposit) {
                    Ok(()) => {
                        ext.set_code(&address, code);
                        created = Some(address);
                        ExecutionOutcome::Success(vec![])
                    }
                    Err(kind) => {
                        frame.evm.gas.exhaust();
                        ExecutionOutcome::Error { kind, pc }
                    }
                }
            }
            (_, outcome) => outcome,
        };

        if !outcome.is_success() {
            ext.revert_to(frame.checkpoint);
        }
        let gas_left = match outcome {
            ExecutionOutcome::Error { .. } => 0,
            _ => frame.evm.gas.remaining(),
        };
        FrameResult {
            outcome,
            gas_left,
            created,
        }
    }

    /// Hands a finished sub-frame's result to the frame that entered it.
    fn resume(&mut self, parent: &mut Frame, kind: FrameKind, result: &FrameResult) {
        let evm = &mut parent.evm;
        evm.gas.add(result.gas_left);
        evm.ret = result.outcome.return_data().to_vec();

        let flag = match kind {
            FrameKind::Call {
                ret_offset,
                ret_size,
            } => {
                let len = ret_size.min(evm.ret.len());
                evm.memory[ret_offset..ret_offset + len].copy_from_slice(&evm.ret[..len]);
                Word::from(result.outcome.is_success())
            }
            FrameKind::Create { .. } => {
                if result.outcome.is_success() {
                    evm.ret.clear();
                }
                result
                    .created
                    .map(|address| address.as_word())
                    .unwrap_or_default()
            }
        };

        // The push cannot overflow: CALL and CREATE popped more than they push.
        let _ = evm.push(flag);
        evm.pc += 1;
    }

    fn enter_call(
        &mut self,
        ext: &mut Ext,
        call: Call,
        ctx: Context,
        (ret_offset, ret_size): (usize, usize),
    ) -> Entry {
        if ctx.depth > CALL_DEPTH_LIMIT {
            return Entry::Done(FrameResult::failed(VmError::CallDepthExceeded, call.gas));
        }

        let checkpoint = ext.checkpoint();
        let funded = match ctx.call_type {
            CallType::Call | CallType::Static => ext.transfer(&call.from, &call.to, call.value),
            CallType::Callcode => ext.balance(&call.from) >= call.value,
            // DELEGATECALL passes the caller's value along without moving it.
            _ => true,
        };
        if !funded {
            return Entry::Done(FrameResult::failed(VmError::InsufficientBalance, call.gas));
        }

        if precompiles::is_precompile(&call.code) {
            let cost = precompiles::gas_cost(&call.code, &call.data);
            if cost > call.gas {
                ext.revert_to(checkpoint);
                return Entry::Done(FrameResult::failed(VmError::OutOfGas, 0));
            }
            return Entry::Done(FrameResult {
                outcome: ExecutionOutcome::Success(precompiles::execute(&call.code, &call.data)),
                gas_left: call.gas - cost,
                created: None,
            });
        }

        let code = ext.code(&call.code);
        if code.is_empty() {
            return Entry::Done(FrameResult {
                outcome: ExecutionOutcome::Success(vec![]),
                gas_left: call.gas,
                created: None,
            });
        }

        Entry::Frame(Box::new(Frame {
            evm: Evm {
                gas: Gas::new(call.gas),
                ..Default::default()
            },
            bytecode: Arc::new(Decoder::decode(&code)),
            code,
            call,
            ctx,
            checkpoint,
            kind: FrameKind::Call {
                ret_offset,
                ret_size,
            },
        }))
    }

    fn enter_create(&mut self, ext: &mut Ext, call: Call, init: Vec<u8>, ctx: Context) -> Entry {
        if ctx.depth > CALL_DEPTH_LIMIT {
            return Entry::Done(FrameResult::failed(VmError::CallDepthExceeded, call.gas));
        }
        if ext.balance(&call.from) < call.value {
            return Entry::Done(FrameResult::failed(VmError::InsufficientBalance, call.gas));
        }
        if ext.collides(&call.to) {
            return Entry::Done(FrameResult::failed(VmError::ContractCollision, 0));
        }

        let checkpoint = ext.checkpoint();
        let address = call.to;
        ext.create_account(&address);
        ext.transfer(&call.from, &address, call.value);

        let code = Arc::new(init);
        Entry::Frame(Box::new(Frame {
            evm: Evm {
                gas: Gas::new(call.gas),
                ..Default::default()
            },
            bytecode: Arc::new(Decoder::decode(&code)),
            code,
            call,
            ctx,
            checkpoint,
            kind: FrameKind::Create { address },
        }))
    }

    fn execute_instruction(
        &mut self,
        frame: &mut Frame,
        ext: &mut Ext,
        code: &Bytecode,
        instruction: &Instruction,
    ) -> Result<Action, VmError> {
        let schedule = self.schedule;
        let env = self.env;
        let opcode = instruction.opcode.code;
        let this = frame.call.to;
        let is_static = frame.ctx.is_static;
        let evm = &mut frame.evm;

        if !instruction.opcode.is_defined() || !schedule.is_enabled(opcode) {
            return Err(VmError::InvalidOpcode(opcode));
        }
        evm.gas.sub(schedule.fixed(opcode))?;

        let mut pc_increment = true;
        match opcode {
            0x00 => {
                // STOP
                return Ok(Action::Exit(Halt::Stop));
            }
            0x01 => {
                // ADD
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a.overflowing_add(b).0)?;
            }
            0x02 => {
                // MUL
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a.overflowing_mul(b).0)?;
            }
            0x03 => {
                // SUB
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a.overflowing_sub(b).0)?;
            }
            0x04 => {
                // DIV
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a / b)?;
            }
            0x05 => {
                // SDIV
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a.signed_div(b))?;
            }
            0x06 => {
                // MOD
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a % b)?;
            }
            0x07 => {
                // SMOD
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a.signed_rem(b))?;
            }
            0x08 => {
                // ADDMOD
                let a = evm.pop()?;
                let b = evm.pop()?;
                let n = evm.pop()?;
                evm.push(a.add_modulo(&b, &n))?;
            }
            0x09 => {
                // MULMOD
                let a = evm.pop()?;
                let b = evm.pop()?;
                let n = evm.pop()?;
                evm.push(a.mul_modulo(&b, &n))?;
            }
            0x0a => {
                // EXP
                let base = evm.pop()?;
                let exponent = evm.pop()?;
                evm.gas.sub(schedule.exp_byte * exponent.byte_len() as u64)?;
                evm.push(base.pow(exponent))?;
            }
            0x0b => {
                // SIGNEXTEND
                let index = evm.pop()?;
                let value = evm.pop()?;
                evm.push(value.sign_extend(index))?;
            }

            0x10 => {
                // LT
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(Word::from(a < b))?;
            }
            0x11 => {
                // GT
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(Word::from(a > b))?;
            }
            0x12 => {
                // SLT
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(Word::from(a.signed_lt(&b)))?;
            }
            0x13 => {
                // SGT
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(Word::from(a.signed_gt(&b)))?;
            }
            0x14 => {
                // EQ
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(Word::from(a == b))?;
            }
            0x15 => {
                // ISZERO
                let a = evm.pop()?;
                evm.push(Word::from(a.is_zero()))?;
            }
            0x16 => {
                // AND
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a & b)?;
            }
            0x17 => {
                // OR
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a | b)?;
            }
            0x18 => {
                // XOR
                let a = evm.pop()?;
                let b = evm.pop()?;
                evm.push(a ^ b)?;
            }
            0x19 => {
                // NOT
                let a = evm.pop()?;
                evm.push(!a)?;
            }
            0x1a => {
                // BYTE
                let index = evm.pop()?;
                let value = evm.pop()?;
                let byte = index
                    .to_usize()
                    .filter(|index| *index < 32)
                    .map(|index| value.byte_be(index))
                    .unwrap_or_default();
                evm.push(Word::from(byte))?;
            }
            0x1b => {
                // SHL
                let shift = evm.pop()?;
                let value = evm.pop()?;
                evm.push(value << shift.as_usize_saturated())?;
            }
            0x1c => {
                // SHR
                let shift = evm.pop()?;
                let value = evm.pop()?;
                evm.push(value >> shift.as_usize_saturated())?;
            }
            0x1d => {
                // SAR
                let shift = evm.pop()?;
                let value = evm.pop()?;
                evm.push(value.sar(shift))?;
            }

            0x20 => {
                // SHA3
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let (offset, size) = evm.expand(schedule, offset, size)?;
                evm.gas.sub(schedule.sha3_word * (size as u64).div_ceil(32))?;
                let hash = keccak256(&evm.memory[offset..offset + size]);
                evm.push(Word::from_bytes(&hash))?;
            }

            0x30 => {
                // ADDRESS
                evm.push(this.as_word())?;
            }
            0x31 => {
                // BALANCE
                let address = Address::from(&evm.pop()?);
                evm.push(ext.balance(&address))?;
            }
            0x32 => {
                // ORIGIN
                evm.push(env.origin.as_word())?;
            }
            0x33 => {
                // CALLER
                evm.push(frame.call.from.as_word())?;
            }
            0x34 => {
                // CALLVALUE
                evm.push(frame.call.value)?;
            }
            0x35 => {
                // CALLDATALOAD
                let offset = evm.pop()?;
                let data = read_padded(&frame.call.data, offset, 32);
                evm.push(Word::from_bytes(&data))?;
            }
            0x36 => {
                // CALLDATASIZE
                evm.push(Word::from(frame.call.data.len()))?;
            }
            0x37 => {
                // CALLDATACOPY
                let dest = evm.pop()?;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let (dest, size) = evm.expand(schedule, dest, size)?;
                evm.gas.sub(schedule.copy(size as u64))?;
                let data = read_padded(&frame.call.data, offset, size);
                evm.memory[dest..dest + size].copy_from_slice(&data);
            }
            0x38 => {
                // CODESIZE
                evm.push(Word::from(frame.code.len()))?;
            }
            0x39 => {
                // CODECOPY
                let dest = evm.pop()?;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let (dest, size) = evm.expand(schedule, dest, size)?;
                evm.gas.sub(schedule.copy(size as u64))?;
                let data = read_padded(&frame.code, offset, size);
                evm.memory[dest..dest + size].copy_from_slice(&data);
            }
            0x3a => {
                // GASPRICE
                evm.push(env.gas_price)?;
            }
            0x3b => {
                // EXTCODESIZE
                let address = Address::from(&evm.pop()?);
                evm.push(Word::from(ext.code(&address).len()))?;
            }
            0x3c => {
                // EXTCODECOPY
                let address = Address::from(&evm.pop()?);
                let dest = evm.pop()?;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let (dest, size) = evm.expand(schedule, dest, size)?;
                evm.gas.sub(schedule.copy(size as u64))?;
                let data = read_padded(&ext.code(&address), offset, size);
                evm.memory[dest..dest + size].copy_from_slice(&data);
            }
            0x3d => {
                // RETURNDATASIZE
                evm.push(Word::from(evm.ret.len()))?;
            }
            0x3e => {
                // RETURNDATACOPY
                let dest = evm.pop()?;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let end = offset
                    .checked_add(size)
                    .and_then(|end| end.to_usize())
                    .ok_or(VmError::ReturnDataOutOfBounds)?;
                if end > evm.ret.len() {
                    return Err(VmError::ReturnDataOutOfBounds);
                }
                let (dest, size) = evm.expand(schedule, dest, size)?;
                evm.gas.sub(schedule.copy(size as u64))?;
                let start = end - size;
                let data = evm.ret[start..end].to_vec();
                evm.memory[dest..dest + size].copy_from_slice(&data);
            }
            0x3f => {
                // EXTCODEHASH
                let address = Address::from(&evm.pop()?);
                evm.push(ext.code_hash(&address))?;
            }

            0x40 => {
                // BLOCKHASH
                let number = evm.pop()?;
                let hash = number
                    .to_u64()
                    .filter(|n| *n < env.number && env.number - *n <= 256)
                    .and_then(|n| env.block_hashes.get(n as usize).copied())
                    .unwrap_or_default();
                evm.push(hash)?;
            }
            0x41 => {
                // COINBASE
                evm.push(env.coinbase.as_word())?;
            }
            0x42 => {
                // TIMESTAMP
                evm.push(Word::from(env.timestamp))?;
            }
            0x43 => {
                // NUMBER
                evm.push(Word::from(env.number))?;
            }
            0x44 => {
                // DIFFICULTY
                evm.push(Word::zero())?;
            }
            0x45 => {
                // GASLIMIT
                evm.push(Word::from(env.gas_limit))?;
            }
            0x46 => {
                // CHAINID
                evm.push(Word::from(env.chain_id))?;
            }
            0x47 => {
                // SELFBALANCE
                evm.push(ext.balance(&this))?;
            }

            0x50 => {
                // POP
                evm.pop()?;
            }
            0x51 => {
                // MLOAD
                let offset = evm.pop()?;
                let (offset, _) = evm.expand(schedule, offset, Word::from(32u8))?;
                let value = Word::from_bytes(&evm.memory[offset..offset + 32]);
                evm.push(value)?;
            }
            0x52 => {
                // MSTORE
                let offset = evm.pop()?;
                let value = evm.pop()?;
                let (offset, _) = evm.expand(schedule, offset, Word::from(32u8))?;
                evm.memory[offset..offset + 32].copy_from_slice(&value.into_bytes());
            }
            0x53 => {
                // MSTORE8
                let offset = evm.pop()?;
                let value = evm.pop()?;
                let (offset, _) = evm.expand(schedule, offset, Word::one())?;
                evm.memory[offset] = value.byte_be(31);
            }
            0x54 => {
                // SLOAD
                let key = evm.pop()?;
                evm.push(ext.get(&this, &key))?;
            }
            0x55 => {
                // SSTORE
                if is_static {
                    return Err(VmError::StaticCallViolation(opcode));
                }
                let key = evm.pop()?;
                let new = evm.pop()?;
                if schedule.net_sstore && evm.gas.remaining() <= schedule.sstore_sentry {
                    return Err(VmError::OutOfGas);
                }
                let current = ext.state().get(&this, &key);
                let original = ext.original(&this, &key);
                let (cost, refund) = schedule.sstore(&original, &current, &new);
                evm.gas.sub(cost)?;
                ext.add_refund(refund);
                ext.put(&this, key, new);
            }
            0x56 => {
                // JUMP
                let dest = evm.pop()?;
                evm.pc = jump(code, dest)?;
                pc_increment = false;
            }
            0x57 => {
                // JUMPI
                let dest = evm.pop()?;
                let cond = evm.pop()?;
                if !cond.is_zero() {
                    evm.pc = jump(code, dest)?;
                    pc_increment = false;
                }
            }
            0x58 => {
                // PC
                evm.push(Word::from(instruction.offset))?;
            }
            0x59 => {
                // MSIZE
                evm.push(Word::from(evm.memory.len()))?;
            }
            0x5a => {
                // GAS
                evm.push(Word::from(evm.gas.remaining()))?;
            }
            0x5b => {
                // JUMPDEST
            }
            0x60..=0x7f => {
                // PUSH1..PUSH32
                let arg = instruction.argument.as_deref().unwrap_or_default();
                evm.push(Word::from_bytes(arg))?;
            }

            0x80..=0x8f => {
                // DUP1..DUP16
                let n = instruction.opcode.n as usize;
                if evm.stack.len() < n {
                    return Err(VmError::StackUnderflow);
                }
                let val = evm.stack[evm.stack.len() - n];
                evm.push(val)?;
            }

            0x90..=0x9f => {
                // SWAP1..SWAP16
                let n = instruction.opcode.n as usize;
                if evm.stack.len() <= n {
                    return Err(VmError::StackUnderflow);
                }
                let top = evm.stack.len() - 1;
                evm.stack.swap(top, top - n);
            }

            0xa0..=0xa4 => {
                // LOG0..LOG4
                if is_static {
                    return Err(VmError::StaticCallViolation(opcode));
                }
                let n = instruction.opcode.n as usize;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let mut topics = Vec::with_capacity(n);
                for _ in 0..n {
                    topics.push(evm.pop()?);
                }
                let (offset, size) = evm.expand(schedule, offset, size)?;
                evm.gas.sub(schedule.log_data * size as u64)?;
                ext.log(Log {
                    address: this,
                    topics,
                    data: evm.memory[offset..offset + size].to_vec().into(),
                });
            }

            0xf0 | 0xf5 => {
                // CREATE | CREATE2
                if is_static {
                    return Err(VmError::StaticCallViolation(opcode));
                }
                let value = evm.pop()?;
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let salt = if opcode == 0xf5 {
                    Some(evm.pop()?)
                } else {
                    None
                };
                let (offset, size) = evm.expand(schedule, offset, size)?;
                if salt.is_some() {
                    evm.gas.sub(schedule.sha3_word * (size as u64).div_ceil(32))?;
                }
                let init = evm.memory[offset..offset + size].to_vec();

                let gas = schedule.call_gas(evm.gas.remaining(), u64::MAX);
                evm.gas.sub(gas)?;
                evm.ret.clear();

                let nonce = ext.nonce(&this);
                let address = match salt {
                    Some(salt) => this.create2(&salt, &init),
                    None => this.create(nonce),
                };
                let ctx = Context {
                    depth: frame.ctx.depth + 1,
                    call_type: if salt.is_some() {
                        CallType::Create2
                    } else {
                        CallType::Create
                    },
                    is_static: false,
                };
                let call = Call {
                    from: this,
                    to: address,
                    code: address,
                    value,
                    data: vec![],
                    gas,
                };

                let entered = ctx.depth <= CALL_DEPTH_LIMIT && ext.balance(&this) >= value;
                if entered {
                    ext.inc_nonce(&this);
                }
                return Ok(match self.enter_create(ext, call, init, ctx) {
                    Entry::Frame(child) => Action::Enter(child),
                    Entry::Done(result) => {
                        let kind = FrameKind::Create { address };
                        self.resume(frame, kind, &result);
                        Action::Continue
                    }
                });
            }

            0xf1 | 0xf2 | 0xf4 | 0xfa => {
                // CALL | CALLCODE | DELEGATECALL | STATICCALL
                let requested = evm.pop()?;
                let address = Address::from(&evm.pop()?);
                let value = if matches!(opcode, 0xf1 | 0xf2) {
                    evm.pop()?
                } else {
                    Word::zero()
                };
                let in_offset = evm.pop()?;
                let in_size = evm.pop()?;
                let out_offset = evm.pop()?;
                let out_size = evm.pop()?;

                if is_static && opcode == 0xf1 && !value.is_zero() {
                    return Err(VmError::StaticCallViolation(opcode));
                }

                let (in_offset, in_size) = evm.expand(schedule, in_offset, in_size)?;
                let (out_offset, out_size) = evm.expand(schedule, out_offset, out_size)?;

                let mut extra = 0;
                if !value.is_zero() {
                    extra += schedule.call_value;
                    if opcode == 0xf1 && ext.is_empty(&address) {
                        extra += schedule.new_account;
                    }
                }
                evm.gas.sub(extra)?;

                let requested = requested.to_u64().unwrap_or(u64::MAX);
                let forwarded = schedule.call_gas(evm.gas.remaining(), requested);
                evm.gas.sub(forwarded)?;
                let stipend = if value.is_zero() {
                    0
                } else {
                    schedule.call_stipend
                };
                evm.ret.clear();

                let data = evm.memory[in_offset..in_offset + in_size].to_vec();
                let (call, call_type) = match opcode {
                    0xf1 => (
                        Call {
                            from: this,
                            to: address,
                            code: address,
                            value,
                            data,
                            gas: forwarded + stipend,
                        },
                        CallType::Call,
                    ),
                    0xf2 => (
                        Call {
                            from: this,
                            to: this,
                            code: address,
                            value,
                            data,
                            gas: forwarded + stipend,
                        },
                        CallType::Callcode,
                    ),
                    0xf4 => (
                        Call {
                            from: frame.call.from,
                            to: this,
                            code: address,
                            value: frame.call.value,
                            data,
                            gas: forwarded,
                        },
                        CallType::Delegate,
                    ),
                    _ => (
                        Call {
                            from: this,
                            to: address,
                            code: address,
                            value: Word::zero(),
                            data,
                            gas: forwarded,
                        },
                        CallType::Static,
                    ),
                };
                let ctx = Context {
                    depth: frame.ctx.depth + 1,
                    call_type,
                    is_static: is_static || call_type == CallType::Static,
                };
                return Ok(match self.enter_call(ext, call, ctx, (out_offset, out_size)) {
                    Entry::Frame(child) => Action::Enter(child),
                    Entry::Done(result) => {
                        let kind = FrameKind::Call {
                            ret_offset: out_offset,
                            ret_size: out_size,
                        };
                        self.resume(frame, kind, &result);
                        Action::Continue
                    }
                });
            }

            0xf3 | 0xfd => {
                // RETURN | REVERT
                let offset = evm.pop()?;
                let size = evm.pop()?;
                let (offset, size) = evm.expand(schedule, offset, size)?;
                let data = evm.memory[offset..offset + size].to_vec();
                return Ok(Action::Exit(if opcode == 0xf3 {
                    Halt::Return(data)
                } else {
                    Halt::Revert(data)
                }));
            }

            0xff => {
                // SELFDESTRUCT
                if is_static {
                    return Err(VmError::StaticCallViolation(opcode));
                }
                let beneficiary = Address::from(&evm.pop()?);
                let balance = ext.balance(&this);
                if !balance.is_zero() && ext.is_empty(&beneficiary) {
                    evm.gas.sub(schedule.new_account)?;
                }
                if ext.selfdestruct(&this) {
                    ext.add_refund(schedule.selfdestruct_refund as i64);
                }
                ext.set_balance(&this, Word::zero());
                if beneficiary != this {
                    let (credited, _) = ext.balance(&beneficiary).overflowing_add(balance);
                    ext.set_balance(&beneficiary, credited);
                }
                return Ok(Action::Exit(Halt::Stop));
            }

            _ => {
                return Err(VmError::InvalidOpcode(opcode));
            }
        }

        if pc_increment {
            evm.pc += 1;
        }
        Ok(Action::Continue)
    }
}

fn jump(code: &Bytecode, dest: Word) -> Result<usize, VmError> {
    dest.to_usize()
        .and_then(|dest| code.resolve_jump(dest))
        .ok_or(VmError::InvalidJump)
}

/// `size` bytes of `data` from `offset`, zero-filled past the end.
fn read_padded(data: &[u8], offset: Word, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    if let Some(offset) = offset.to_usize().filter(|offset| *offset < data.len()) {
        let len = size.min(data.len() - offset);
        out[..len].copy_from_slice(&data[offset..offset + len]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{account::Account, address::addr},
        ext::WorldState,
        tracer::StructLogTracer,
    };

    const CALLER: Address = addr("0xca11e5");
    const TARGET: Address = addr("0x7a5637");
    const OTHER: Address = addr("0x07be5");

    fn contract(code: &str) -> Account {
        Account {
            code: Arc::new(hex::decode(code).unwrap()),
            ..Default::default()
        }
    }

    fn state(code: &str) -> WorldState {
        WorldState::new([
            (CALLER, Account::with_balance(Word::from(1_000_000u64))),
            (TARGET, contract(code)),
        ])
    }

    fn run<T: EventTracer>(state: &mut WorldState, tracer: T, gas: u64) -> (FrameResult, T) {
        let schedule = GasSchedule::default();
        let env = Env::default();
        let mut ext = Ext::new(state);
        let mut executor = Executor::new(&schedule, &env).with_tracer(tracer);
        let result = executor.call(
            &mut ext,
            Call {
                from: CALLER,
                to: TARGET,
                code: TARGET,
                gas,
                ..Default::default()
            },
        );
        ext.finish();
        (result, executor.into_tracer())
    }

    #[test]
    fn test_return_sum() {
        // PUSH1 2 PUSH1 3 ADD PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let mut state = state("600260030160005260206000f3");
        let (result, _) = run(&mut state, NoopTracer, 100_000);
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Success(Word::from(5u8).into_bytes().to_vec())
        );
    }

    #[test]
    fn test_sstore_then_stop() {
        // PUSH1 0x2a PUSH1 0 SSTORE STOP
        let mut state = state("602a60005500");
        let (result, _) = run(&mut state, NoopTracer, 100_000);
        assert!(result.outcome.is_success());
        assert_eq!(result.gas_left, 100_000 - (3 + 3 + 20_000 + 1));
        assert_eq!(state.get(&TARGET, &Word::zero()), Word::from(0x2au8));
    }

    #[test]
    fn test_revert_discards_writes_and_keeps_gas() {
        // PUSH1 1 PUSH1 0 SSTORE PUSH1 0 PUSH1 0 REVERT
        let mut state = state("600160005560006000fd");
        let before = state.clone();
        let (result, _) = run(&mut state, NoopTracer, 100_000);
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Revert {
                data: vec![],
                pc: 9
            }
        );
        assert_eq!(result.gas_left, 100_000 - (3 + 3 + 20_000 + 3 + 3));
        assert_eq!(state, before);
    }

    #[test]
    fn test_faults_consume_all_gas() {
        let cases = [
            ("6001fe", VmError::InvalidOpcode(0xfe), 2),
            ("60010c", VmError::InvalidOpcode(0x0c), 2),
            ("01", VmError::StackUnderflow, 0),
            ("60035600", VmError::InvalidJump, 2),
            ("602a600055", VmError::OutOfGas, 4),
        ];
        for (code, kind, pc) in cases {
            let mut state = state(code);
            let (result, _) = run(&mut state, NoopTracer, 10_000);
            assert_eq!(result.outcome, ExecutionOutcome::Error { kind, pc }, "{code}");
            assert_eq!(result.gas_left, 0);
        }
    }

    #[test]
    fn test_later_fork_opcodes_are_invalid() {
        // PUSH0 STOP, SELFBALANCE STOP, TLOAD, MCOPY
        for (code, opcode) in [("5f00", 0x5f), ("4700", 0x47), ("5c", 0x5c), ("5e", 0x5e)] {
            let mut state = state(code);
            let (result, _) = run(&mut state, NoopTracer, 10_000);
            assert_eq!(
                result.outcome,
                ExecutionOutcome::Error {
                    kind: VmError::InvalidOpcode(opcode),
                    pc: 0
                },
                "{code}"
            );
            assert_eq!(result.gas_left, 0);
        }

        // SELFBALANCE PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let mut state = state("4760005260206000f3");
        let schedule = GasSchedule::istanbul();
        let env = Env::default();
        let mut ext = Ext::new(&mut state);
        let mut executor = Executor::new(&schedule, &env);
        let result = executor.call(
            &mut ext,
            Call {
                from: CALLER,
                to: TARGET,
                code: TARGET,
                gas: 10_000,
                ..Default::default()
            },
        );
        assert_eq!(result.outcome, ExecutionOutcome::Success(vec![0; 32]));
    }

    #[test]
    fn test_stack_overflow() {
        // JUMPDEST PUSH1 0 PUSH1 0 JUMP
        let mut state = state("5b6000600056");
        let (result, _) = run(&mut state, NoopTracer, 1_000_000);
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Error {
                kind: VmError::StackOverflow,
                pc: 1
            }
        );
    }

    #[test]
    fn test_jump_to_jumpdest() {
        // PUSH1 4 JUMP INVALID JUMPDEST STOP
        let mut state = state("600456fe5b00");
        let (result, _) = run(&mut state, NoopTracer, 100_000);
        assert!(result.outcome.is_success());
    }

    #[test]
    fn test_running_off_the_end_is_stop() {
        let mut state = state("6001");
        let (result, tracer) = run(&mut state, StructLogTracer::new(), 100_000);
        assert!(result.outcome.is_success());
        assert_eq!(result.gas_left, 100_000 - 3);
        assert_eq!(tracer.take().len(), 1);
    }

    /// Calls OTHER with no data and stores the success flag in slot 1.
    const CALL_OTHER: &str = "60006000600060006000730000000000000000000000000000000000007be561fffff1600155";

    #[test]
    fn test_failed_sub_call_does_not_fail_caller() {
        let mut state = state(CALL_OTHER);
        // PUSH1 1 PUSH1 0 SSTORE PUSH1 0 PUSH1 0 REVERT
        state.put(OTHER, Some(contract("600160005560006000fd")));
        let (result, _) = run(&mut state, NoopTracer, 200_000);
        assert!(result.outcome.is_success());
        assert_eq!(state.get(&OTHER, &Word::zero()), Word::zero());
        assert_eq!(state.get(&TARGET, &Word::one()), Word::zero());
    }

    #[test]
    fn test_successful_sub_call() {
        let mut state = state(CALL_OTHER);
        // PUSH1 1 PUSH1 0 SSTORE STOP
        state.put(OTHER, Some(contract("600160005500")));
        let (result, _) = run(&mut state, NoopTracer, 200_000);
        assert!(result.outcome.is_success());
        assert_eq!(state.get(&OTHER, &Word::zero()), Word::one());
        assert_eq!(state.get(&TARGET, &Word::one()), Word::one());
    }

    #[test]
    fn test_static_call_cannot_write() {
        // STATICCALL variant of CALL_OTHER: no value argument.
        let code = "6000600060006000730000000000000000000000000000000000007be561fffffa600155";
        let mut state = state(code);
        state.put(OTHER, Some(contract("600160005500")));
        let (result, _) = run(&mut state, NoopTracer, 200_000);
        assert!(result.outcome.is_success());
        assert_eq!(state.get(&OTHER, &Word::zero()), Word::zero());
        assert_eq!(state.get(&TARGET, &Word::one()), Word::zero());
    }

    #[test]
    fn test_tracer_sees_storage_one_step_late() {
        let mut state = state("602a60005500");
        let (_, tracer) = run(&mut state, StructLogTracer::new(), 100_000);
        let logs = tracer.take();

        let ops: Vec<_> = logs.iter().map(|log| log.op.as_str()).collect();
        assert_eq!(ops, vec!["PUSH1", "PUSH1", "SSTORE", "STOP"]);
        assert!(logs[2].storage.is_empty());
        assert_eq!(
            logs[3].storage.get(&"0".repeat(64)),
            Some(&Word::from(0x2au8).to_hex())
        );
        assert_eq!(logs[2].stack, vec![Word::from(0x2au8).to_hex(), Word::zero().to_hex()]);
        assert_eq!(logs[3].pc, 5);
        assert_eq!(logs[3].gas_cost, 1);
    }

    #[test]
    fn test_tracing_does_not_change_execution() {
        let mut plain = state(CALL_OTHER);
        plain.put(OTHER, Some(contract("600160005500")));
        let mut traced = plain.clone();

        let (a, _) = run(&mut plain, NoopTracer, 200_000);
        let (b, tracer) = run(&mut traced, StructLogTracer::new(), 200_000);
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.gas_left, b.gas_left);
        assert_eq!(plain, traced);
        assert!(!tracer.take().is_empty());
    }

    #[test]
    fn test_sub_call_steps_are_nested() {
        let mut state = state(CALL_OTHER);
        state.put(OTHER, Some(contract("600160005500")));
        let (_, tracer) = run(&mut state, StructLogTracer::new(), 200_000);
        let logs = tracer.take();

        let call = logs.iter().position(|log| log.op == "CALL").unwrap();
        assert_eq!(logs[call].depth, 1);
        let inner: Vec<_> = logs[call + 1..call + 5].iter().map(|log| log.depth).collect();
        assert_eq!(inner, vec![2, 2, 2, 2]);
        assert_eq!(logs[call + 5].depth, 1);

        // Gas never increases within the outer frame.
        let outer: Vec<_> = logs.iter().filter(|log| log.depth == 1).collect();
        for pair in outer.windows(2) {
            assert_eq!(pair[0].remaining(), pair[1].gas);
        }
        assert!(logs[call].gas_cost > 700 + 20_000);
    }

    #[test]
    fn test_create_deposits_code() {
        // PUSH1 0 PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 RETURN
        let init = hex::decode("600060005360016000f3").unwrap();
        let mut state = state("00");
        let address = CALLER.create(0);
        let schedule = GasSchedule::default();
        let env = Env::default();
        let mut ext = Ext::new(&mut state);
        let result = Executor::new(&schedule, &env).create(
            &mut ext,
            Call {
                from: CALLER,
                to: address,
                code: address,
                gas: 100_000,
                ..Default::default()
            },
            init,
        );
        ext.finish();
        assert_eq!(result.created, Some(address));
        assert_eq!(state.code(&address).as_slice(), &[0x00]);
        assert_eq!(state.nonce(&address), 1);
    }

    #[test]
    fn test_calldata_and_hash() {
        // PUSH1 0 CALLDATALOAD PUSH1 0 MSTORE PUSH1 32 PUSH1 0 SHA3 PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let mut state = state("600035600052602060002060005260206000f3");
        let schedule = GasSchedule::default();
        let env = Env::default();
        let mut ext = Ext::new(&mut state);
        let data = Word::from(7u8).into_bytes().to_vec();
        let result = Executor::new(&schedule, &env).call(
            &mut ext,
            Call {
                from: CALLER,
                to: TARGET,
                code: TARGET,
                data: data.clone(),
                gas: 100_000,
                ..Default::default()
            },
        );
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Success(keccak256(&data).to_vec())
        );
    }
}
