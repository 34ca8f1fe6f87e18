//! Blocks: hash-sealed batches of committed transactions

use crate::crypto;
use crate::transaction::Transaction;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Previous hash of the genesis block: 128 `'0'` characters
pub const GENESIS_HASH: &str = "00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

/// Immutable batch of transactions linked to its predecessor
///
/// `previous` is the predecessor's position in the ledger's block arena and
/// is used only for traversal; the hash depends on `previous_hash` alone.
#[derive(Debug)]
pub struct Block {
    previous: Option<usize>,
    previous_hash: Option<String>,
    transactions: Vec<Transaction>,
    nonce: u64,
    current_hash: OnceLock<String>,
}

impl Block {
    /// Block with no previous hash yet
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            previous: None,
            previous_hash: None,
            transactions,
            nonce: 0,
            current_hash: OnceLock::new(),
        }
    }

    /// Root block, linked to [`GENESIS_HASH`]
    pub fn genesis(transactions: Vec<Transaction>) -> Self {
        Self::new(transactions).with_previous_hash(GENESIS_HASH)
    }

    /// Set the predecessor's hash
    pub fn with_previous_hash(mut self, previous_hash: impl Into<String>) -> Self {
        self.previous_hash = Some(previous_hash.into());
        self
    }

    /// Set the predecessor's arena position
    pub fn with_previous(mut self, previous: Option<usize>) -> Self {
        self.previous = previous;
        self
    }

    /// Record the commit nonce (not part of the hash)
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Predecessor's arena position
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    /// Predecessor's hash, if set
    pub fn previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }

    /// Transactions in admission order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Commit nonce
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Whether the hash has been computed and sealed
    pub fn is_sealed(&self) -> bool {
        self.current_hash.get().is_some()
    }

    /// Block hash, computed on first call and cached afterwards
    pub fn hash(&self) -> Result<&str> {
        if let Some(hash) = self.current_hash.get() {
            return Ok(hash);
        }
        let hash = self.compute_hash()?;
        Ok(self.current_hash.get_or_init(|| hash))
    }

    /// Recompute the hash from the current contents, bypassing the cache
    pub fn compute_hash(&self) -> Result<String> {
        let previous_hash = self.previous_hash.as_deref().ok_or_else(|| {
            Error::UnsetPrecondition("previous hash has not been set yet".to_string())
        })?;

        Ok(crypto::block_hash(previous_hash, &self.render_transactions()))
    }

    /// Rendered transactions joined with `|`
    fn render_transactions(&self) -> String {
        self.transactions
            .iter()
            .map(Transaction::render)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Audit view of this block at `height`
    pub fn summary(&self, height: usize) -> Result<BlockSummary> {
        Ok(BlockSummary {
            height,
            previous_hash: self.previous_hash.clone().unwrap_or_default(),
            hash: self.hash()?.to_string(),
            nonce: self.nonce,
            transaction_count: self.transactions.len(),
            transactions: self.transactions.iter().map(Transaction::render).collect(),
        })
    }
}

/// Serializable audit view of a committed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Arena position (0 = root)
    pub height: usize,
    /// Predecessor's hash
    pub previous_hash: String,
    /// Block hash
    pub hash: String,
    /// Commit nonce
    pub nonce: u64,
    /// Number of transactions
    pub transaction_count: usize,
    /// Canonical transaction strings
    pub transactions: Vec<String>,
}

impl BlockSummary {
    /// Pretty-printed JSON array of summaries
    pub fn to_json(summaries: &[BlockSummary]) -> Result<String> {
        Ok(serde_json::to_string_pretty(summaries)?)
    }

    /// Parse a JSON array produced by [`BlockSummary::to_json`]
    pub fn from_json(json: &str) -> Result<Vec<BlockSummary>> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::crypto::to_base64;
    use crate::transaction::TransactionParams;
    use crate::types::ParticipantHandle;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn cookier(name: &str) -> ParticipantHandle {
        ParticipantHandle::create(to_base64(name.as_bytes()), name).unwrap()
    }

    fn transfer(giver: &ParticipantHandle, receiver: &ParticipantHandle, reason: &str) -> Transaction {
        Transaction::new_with_clock(
            TransactionParams {
                protocol: "gc".to_string(),
                reference_hash: GENESIS_HASH.to_string(),
                content: reason.to_string(),
                participants: vec![giver.clone(), receiver.clone()],
                cookie_count: 1,
                timestamp: now(),
            },
            &FixedClock::new(now()),
        )
        .unwrap()
    }

    #[test]
    fn test_genesis_hash_placeholder() {
        assert_eq!(GENESIS_HASH.len(), 128);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));

        let block = Block::genesis(vec![]);
        assert_eq!(block.previous_hash(), Some(GENESIS_HASH));
        assert!(block.previous().is_none());
        assert!(block.hash().is_ok());
    }

    #[test]
    fn test_hash_requires_previous_hash() {
        let block = Block::new(vec![]);
        assert!(matches!(block.hash(), Err(Error::UnsetPrecondition(_))));
        assert!(!block.is_sealed());
    }

    #[test]
    fn test_hash_matches_formula() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let t1 = transfer(&a, &b, "lunch");
        let t2 = transfer(&b, &a, "dinner");
        let expected = crypto::block_hash(
            GENESIS_HASH,
            &format!("{}|{}", t1.render(), t2.render()),
        );

        let block = Block::genesis(vec![t1, t2]);
        assert_eq!(block.hash().unwrap(), expected);
    }

    #[test]
    fn test_hash_deterministic() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let block1 = Block::genesis(vec![transfer(&a, &b, "lunch")]);
        let block2 = Block::genesis(vec![transfer(&a, &b, "lunch")]);
        assert_eq!(block1.hash().unwrap(), block2.hash().unwrap());
    }

    #[test]
    fn test_hash_sensitive_to_inputs() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let base = Block::genesis(vec![transfer(&a, &b, "lunch")]);
        let other_content = Block::genesis(vec![transfer(&a, &b, "dinner")]);
        let other_previous =
            Block::new(vec![transfer(&a, &b, "lunch")]).with_previous_hash("abc");

        assert_ne!(base.hash().unwrap(), other_content.hash().unwrap());
        assert_ne!(base.hash().unwrap(), other_previous.hash().unwrap());
    }

    #[test]
    fn test_nonce_not_hashed() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let block1 = Block::genesis(vec![transfer(&a, &b, "lunch")]).with_nonce(1);
        let block2 = Block::genesis(vec![transfer(&a, &b, "lunch")]).with_nonce(42);
        assert_eq!(block1.hash().unwrap(), block2.hash().unwrap());
        assert_eq!(block2.nonce(), 42);
    }

    #[test]
    fn test_hash_memoized() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let block = Block::genesis(vec![transfer(&a, &b, "lunch")]);

        let sealed = block.hash().unwrap().to_string();
        assert!(block.is_sealed());

        // Changing a key changes the rendered transaction, but not the seal
        a.set_public_key(to_base64(b"rotated"));
        assert_eq!(block.hash().unwrap(), sealed);
        assert_ne!(block.compute_hash().unwrap(), sealed);
    }

    #[test]
    fn test_summary() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let block = Block::genesis(vec![transfer(&a, &b, "lunch")]).with_nonce(7);

        let summary = block.summary(0).unwrap();
        assert_eq!(summary.height, 0);
        assert_eq!(summary.previous_hash, GENESIS_HASH);
        assert_eq!(summary.hash, block.hash().unwrap());
        assert_eq!(summary.nonce, 7);
        assert_eq!(summary.transaction_count, 1);
        assert!(summary.transactions[0].starts_with("gc|"));
    }

    #[test]
    fn test_hash_distinguishes_sub_millisecond_timestamps() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let at = |timestamp: DateTime<Utc>| {
            let tx = Transaction::new_with_clock(
                TransactionParams {
                    protocol: "gc".to_string(),
                    reference_hash: GENESIS_HASH.to_string(),
                    content: "lunch".to_string(),
                    participants: vec![a.clone(), b.clone()],
                    cookie_count: 1,
                    timestamp,
                },
                &FixedClock::new(now()),
            )
            .unwrap();
            Block::genesis(vec![tx])
        };

        let t0 = now() - chrono::Duration::seconds(1);
        let first = at(t0);
        let second = at(t0 + chrono::Duration::microseconds(500));
        assert_ne!(first.hash().unwrap(), second.hash().unwrap());
    }

    #[test]
    fn test_summary_json() {
        let (a, b) = (cookier("alice"), cookier("bob"));
        let block = Block::genesis(vec![transfer(&a, &b, "lunch")]);
        let summaries = vec![block.summary(0).unwrap()];

        let json = BlockSummary::to_json(&summaries).unwrap();
        assert!(json.contains("\"transaction_count\": 1"));
        assert_eq!(BlockSummary::from_json(&json).unwrap(), summaries);

        assert!(matches!(
            BlockSummary::from_json("{\"height\": 0}"),
            Err(Error::Serialization(_))
        ));
    }
}
