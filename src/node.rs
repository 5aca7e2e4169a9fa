use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    chain::Chain,
    common::{Hex, Word, address::Address, block::Receipt, tx::TxRequest},
    config::Config,
    policy::{CallResponse, ErrorPolicy, SendResponse},
    tracer::TraceResult,
};

/// Shared handle to a chain. Sends take the write lock; everything else
/// reads. The interpreter always runs on a blocking task: sends and calls
/// carry their lock guard into it, trace replays run with no lock held.
#[derive(Clone)]
pub struct Node {
    chain: Arc<RwLock<Chain>>,
    policy: ErrorPolicy,
}

impl Node {
    pub fn new(config: Config) -> Self {
        let policy = ErrorPolicy::new(config.strict_errors_on_response);
        Self {
            chain: Arc::new(RwLock::new(Chain::new(config))),
            policy,
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub async fn send_transaction(&self, request: TxRequest) -> eyre::Result<SendResponse> {
        let mut chain = self.chain.clone().write_owned().await;
        let policy = self.policy;
        tokio::task::spawn_blocking(move || -> eyre::Result<SendResponse> {
            let hash = chain.send_transaction(request)?;
            Ok(render_send(&chain, policy, hash))
        })
        .await?
    }

    pub async fn send_transactions(
        &self,
        requests: Vec<TxRequest>,
    ) -> eyre::Result<Vec<SendResponse>> {
        let mut chain = self.chain.clone().write_owned().await;
        let policy = self.policy;
        tokio::task::spawn_blocking(move || -> eyre::Result<Vec<SendResponse>> {
            let hashes = chain.send_transactions(requests)?;
            Ok(hashes
                .into_iter()
                .map(|hash| render_send(&chain, policy, hash))
                .collect())
        })
        .await?
    }

    pub async fn call(&self, request: TxRequest) -> eyre::Result<CallResponse> {
        let chain = self.chain.clone().read_owned().await;
        let result = tokio::task::spawn_blocking(move || chain.call(request)).await??;
        Ok(self.policy.render_call(&result.outcome))
    }

    pub async fn trace_transaction(&self, hash: Word) -> eyre::Result<TraceResult> {
        let job = self.chain.read().await.trace_job(&hash)?;
        let trace = tokio::task::spawn_blocking(move || job.run()).await?;
        Ok(trace)
    }

    pub async fn receipt(&self, hash: Word) -> Option<Receipt> {
        self.chain.read().await.receipt(&hash).cloned()
    }

    pub async fn balance(&self, address: Address) -> Word {
        self.chain.read().await.balance(&address)
    }

    pub async fn code(&self, address: Address) -> Hex {
        self.chain.read().await.code(&address)
    }

    pub async fn storage_at(&self, address: Address, key: Word) -> Word {
        self.chain.read().await.storage_at(&address, &key)
    }

    pub async fn nonce(&self, address: Address) -> u64 {
        self.chain.read().await.nonce(&address)
    }

    pub async fn block_number(&self) -> u64 {
        self.chain.read().await.block_number()
    }

    pub async fn accounts(&self) -> Vec<Address> {
        self.chain.read().await.accounts()
    }
}

fn render_send(chain: &Chain, policy: ErrorPolicy, hash: Word) -> SendResponse {
    let outcome = chain
        .transaction(&hash)
        .map(|record| record.result.outcome.clone())
        .unwrap_or_default();
    policy.render_send(hash, &outcome)
}
