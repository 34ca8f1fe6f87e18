//! Actor-based concurrency for the ledger
//!
//! [`Ledger`] is single-writer: `add_transaction` and `commit` read and then
//! write the (head, pool, size) triple. The actor owns the ledger inside one
//! Tokio task and applies requests strictly in mailbox order, so any number
//! of cloned [`LedgerHandle`]s can share it.
//!
//! ```text
//! LedgerHandle (Clone) ──mpsc (bounded)──▶ LedgerActor ──▶ Ledger
//!        ▲                                     │
//!        └──────────── oneshot reply ──────────┘
//! ```

use crate::block::BlockSummary;
use crate::metrics::Metrics;
use crate::transaction::Transaction;
use crate::{Error, Ledger, Result};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Admit a transaction into the pool
    AddTransaction {
        transaction: Transaction,
        response: oneshot::Sender<Result<()>>,
    },

    /// Commit the pool
    Commit {
        nonce: u64,
        response: oneshot::Sender<Result<bool>>,
    },

    /// Chain size
    Size {
        response: oneshot::Sender<Result<usize>>,
    },

    /// Head block hash
    HeadHash {
        response: oneshot::Sender<Result<Option<String>>>,
    },

    /// Anchor hash for new transactions
    ReferenceHash {
        response: oneshot::Sender<Result<String>>,
    },

    /// Pending transaction count
    PoolLen {
        response: oneshot::Sender<Result<usize>>,
    },

    /// Chain integrity audit
    VerifyChain {
        response: oneshot::Sender<Result<()>>,
    },

    /// Audit views of every block
    Summaries {
        response: oneshot::Sender<Result<Vec<BlockSummary>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the ledger
#[derive(Debug)]
pub struct LedgerActor {
    /// The ledger itself
    ledger: Ledger,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Metrics
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Ledger, mailbox: mpsc::Receiver<LedgerMessage>, metrics: Metrics) -> Self {
        Self {
            ledger,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) -> Ledger {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!(size = self.ledger.size(), "Ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }

        self.ledger
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::AddTransaction {
                transaction,
                response,
            } => {
                let result = self.ledger.add_transaction(transaction);
                self.metrics.record_admission(result.is_ok());
                self.metrics.update_pool_size(self.ledger.pool().len());
                let _ = response.send(result);
            }

            LedgerMessage::Commit { nonce, response } => {
                let started = Instant::now();
                let result = self.ledger.commit(nonce);
                if let Ok(true) = result {
                    self.metrics
                        .record_commit(started.elapsed().as_secs_f64());
                }
                self.metrics.update_pool_size(self.ledger.pool().len());
                let _ = response.send(result);
            }

            LedgerMessage::Size { response } => {
                let _ = response.send(Ok(self.ledger.size()));
            }

            LedgerMessage::HeadHash { response } => {
                let _ = response.send(self.ledger.head_hash());
            }

            LedgerMessage::ReferenceHash { response } => {
                let _ = response.send(self.ledger.reference_hash());
            }

            LedgerMessage::PoolLen { response } => {
                let _ = response.send(Ok(self.ledger.pool().len()));
            }

            LedgerMessage::VerifyChain { response } => {
                let _ = response.send(self.ledger.verify_chain());
            }

            LedgerMessage::Summaries { response } => {
                let _ = response.send(self.ledger.summaries());
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Admit a transaction
    pub async fn add_transaction(&self, transaction: Transaction) -> Result<()> {
        self.request(|response| LedgerMessage::AddTransaction {
            transaction,
            response,
        })
        .await
    }

    /// Commit the pool
    pub async fn commit(&self, nonce: u64) -> Result<bool> {
        self.request(|response| LedgerMessage::Commit { nonce, response })
            .await
    }

    /// Chain size
    pub async fn size(&self) -> Result<usize> {
        self.request(|response| LedgerMessage::Size { response }).await
    }

    /// Head block hash
    pub async fn head_hash(&self) -> Result<Option<String>> {
        self.request(|response| LedgerMessage::HeadHash { response })
            .await
    }

    /// Anchor hash for new transactions
    pub async fn reference_hash(&self) -> Result<String> {
        self.request(|response| LedgerMessage::ReferenceHash { response })
            .await
    }

    /// Pending transaction count
    pub async fn pool_len(&self) -> Result<usize> {
        self.request(|response| LedgerMessage::PoolLen { response })
            .await
    }

    /// Chain integrity audit
    pub async fn verify_chain(&self) -> Result<()> {
        self.request(|response| LedgerMessage::VerifyChain { response })
            .await
    }

    /// Audit views of every block, root first
    pub async fn summaries(&self) -> Result<Vec<BlockSummary>> {
        self.request(|response| LedgerMessage::Summaries { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
///
/// The returned join handle yields the ledger back once the actor stops.
pub fn spawn_ledger_actor(
    ledger: Ledger,
    mailbox_capacity: usize,
    metrics: Metrics,
) -> (LedgerHandle, tokio::task::JoinHandle<Ledger>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = LedgerActor::new(ledger, rx, metrics);

    let join = tokio::spawn(actor.run());

    (LedgerHandle::new(tx), join)
}
