pub mod abi;
pub mod chain;
pub mod common;
pub mod config;
pub mod decoder;
pub mod executor;
pub mod ext;
pub mod gas;
pub mod node;
pub mod opcodes;
pub mod outcome;
pub mod policy;
pub mod precompiles;
pub mod rpc;
pub mod tracer;

pub use chain::{Chain, ChainError};
pub use config::Config;
pub use node::Node;
pub use outcome::{ExecutionOutcome, ExecutionResult};
