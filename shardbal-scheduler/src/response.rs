//! Response handles
//!
//! `submit` hands the caller a `ResponseHandle` immediately; the worker
//! keeps the matching `ResponseResolver`. The resolver is consumed when it
//! resolves, so an outcome is set exactly once. Handles are cloneable and
//! every clone observes the same outcome.

use shardbal_core::chunk::Document;
use shardbal_core::command::CommandKind;
use shardbal_core::error::{BalancerError, Result};
use shardbal_core::reply::CommandPayload;
use shardbal_core::types::RequestId;
use tokio::sync::watch;

/// Final result of a scheduled command
pub type CommandOutcome = Result<CommandPayload>;

/// Create a connected resolver/handle pair
pub fn response_channel(
    request_id: RequestId,
    kind: CommandKind,
) -> (ResponseResolver, ResponseHandle) {
    let (tx, rx) = watch::channel(None);
    (
        ResponseResolver { tx },
        ResponseHandle {
            request_id,
            kind,
            rx,
        },
    )
}

/// Worker-side half; resolves the outcome once
#[derive(Debug)]
pub struct ResponseResolver {
    tx: watch::Sender<Option<CommandOutcome>>,
}

impl ResponseResolver {
    /// Publish the outcome to every waiter
    pub fn resolve(self, outcome: CommandOutcome) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Caller-side handle to the eventual outcome of a command
#[derive(Debug, Clone)]
pub struct ResponseHandle {
    request_id: RequestId,
    kind: CommandKind,
    rx: watch::Receiver<Option<CommandOutcome>>,
}

impl ResponseHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Non-blocking peek at the outcome
    pub fn try_outcome(&self) -> Option<CommandOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the full outcome, payload included
    pub async fn payload(&self) -> CommandOutcome {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| {
                Err(BalancerError::Internal("response resolved without outcome".to_string()))
            }),
            Err(_) => Err(BalancerError::Internal(format!(
                "request {} was dropped before it was resolved",
                self.request_id
            ))),
        };
        outcome
    }

    /// Wait for the overall status
    pub async fn outcome(&self) -> Result<()> {
        self.payload().await.map(|_| ())
    }

    /// Split points computed by a splitVector command
    pub async fn split_keys(&self) -> Result<Vec<Document>> {
        match self.payload().await {
            Ok(CommandPayload::SplitKeys(keys)) => Ok(keys),
            Ok(other) => Err(BalancerError::PayloadAbsent(format!(
                "{} response carries no split keys: {:?}",
                self.kind, other
            ))),
            Err(e) => Err(BalancerError::PayloadAbsent(e.to_string())),
        }
    }

    /// Size in bytes and document count reported by a dataSize command
    pub async fn data_size(&self) -> Result<(u64, u64)> {
        match self.payload().await {
            Ok(CommandPayload::DataSize { size, num_objects }) => Ok((size, num_objects)),
            Ok(other) => Err(BalancerError::PayloadAbsent(format!(
                "{} response carries no data size: {:?}",
                self.kind, other
            ))),
            Err(e) => Err(BalancerError::PayloadAbsent(e.to_string())),
        }
    }

    pub async fn size(&self) -> Result<u64> {
        self.data_size().await.map(|(size, _)| size)
    }

    pub async fn num_objects(&self) -> Result<u64> {
        self.data_size().await.map(|(_, num_objects)| num_objects)
    }
}
