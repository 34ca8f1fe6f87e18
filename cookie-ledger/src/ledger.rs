//! Main ledger: committed chain plus the pool of pending transactions
//!
//! Blocks are stored in an append-only arena; each block records the arena
//! position of its predecessor and the ledger keeps the head position.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use cookie_ledger::{Ledger, ParticipantHandle, Transaction};
//!
//! fn main() -> cookie_ledger::Result<()> {
//!     let alice = ParticipantHandle::create("QUxJQ0U=", "alice")?;
//!     let bob = ParticipantHandle::create("Qk9C", "bob")?;
//!
//!     let mut ledger = Ledger::new();
//!     let anchor = ledger.reference_hash()?;
//!     ledger.add_transaction(Transaction::transfer(anchor, alice, bob, "lunch", 1, Utc::now())?)?;
//!     assert!(ledger.commit(0)?);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    block::{Block, BlockSummary, GENESIS_HASH},
    clock::{Clock, SystemClock},
    transaction::Transaction,
    types::ParticipantHandle,
    Error, Result,
};
use std::fmt;
use std::sync::Arc;

/// Chain of committed blocks and the pending pool
pub struct Ledger {
    /// Append-only block arena
    blocks: Vec<Block>,

    /// Arena position of the newest block
    head: Option<usize>,

    /// Blocks reachable from head, tracked incrementally
    size: usize,

    /// Admitted, not yet committed transactions
    pool: Vec<Transaction>,

    /// Time source for admission checks
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// Empty ledger validating against the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty ledger validating against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            blocks: Vec::new(),
            head: None,
            size: 0,
            pool: Vec::new(),
            clock,
        }
    }

    /// Admit a transaction into the pool
    ///
    /// The transaction is validated again at admission time; on failure the
    /// pool is left untouched and the validation error is returned.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<()> {
        if let Err(err) = transaction.validate_at(self.clock.now()) {
            tracing::warn!(
                protocol = transaction.protocol(),
                error = %err,
                "Transaction rejected"
            );
            return Err(err);
        }

        tracing::debug!(
            protocol = transaction.protocol(),
            pool_size = self.pool.len() + 1,
            "Transaction admitted"
        );
        self.pool.push(transaction);

        Ok(())
    }

    /// Seal the whole pool into a new block
    ///
    /// Returns `false` (and changes nothing) when the pool is empty. The
    /// nonce is recorded on the block but does not affect its hash.
    pub fn commit(&mut self, nonce: u64) -> Result<bool> {
        if self.pool.is_empty() {
            return Ok(false);
        }

        // Everything fallible happens before the ledger is touched
        self.check_wallet_effects()?;
        let previous_hash = self.reference_hash()?;
        let block = Block::new(self.pool.clone())
            .with_previous_hash(previous_hash)
            .with_previous(self.head)
            .with_nonce(nonce);
        let hash = block.hash()?.to_string();

        let height = self.blocks.len();
        self.pool.clear();
        self.blocks.push(block);
        self.head = Some(height);
        self.size += 1;

        let block = &self.blocks[height];
        for transaction in block.transactions() {
            transaction.action();
        }

        tracing::info!(
            height,
            transaction_count = block.transactions().len(),
            hash = %hash,
            "Block committed"
        );

        Ok(true)
    }

    /// Newest block
    pub fn head(&self) -> Option<&Block> {
        self.head.and_then(|index| self.blocks.get(index))
    }

    /// Hash of the newest block
    pub fn head_hash(&self) -> Result<Option<String>> {
        self.head()
            .map(|block| block.hash().map(str::to_string))
            .transpose()
    }

    /// Anchor for new transactions: head hash, or the genesis placeholder
    pub fn reference_hash(&self) -> Result<String> {
        Ok(self
            .head_hash()?
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Number of blocks from head to the root
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pending transactions in admission order
    pub fn pool(&self) -> &[Transaction] {
        &self.pool
    }

    /// Block at arena position `height`
    pub fn block(&self, height: usize) -> Option<&Block> {
        self.blocks.get(height)
    }

    /// All blocks, root first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Walk from the head back to the root
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            blocks: &self.blocks,
            next: self.head,
        }
    }

    /// Audit views of the chain, root first
    pub fn summaries(&self) -> Result<Vec<BlockSummary>> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(height, block)| block.summary(height))
            .collect()
    }

    /// Check every link and every sealed hash of the chain
    pub fn verify_chain(&self) -> Result<()> {
        let mut count = 0;

        for (height, block) in self.ancestors() {
            count += 1;

            let expected_previous = match block.previous() {
                Some(previous) if previous < height => self.blocks[previous].hash()?,
                Some(previous) => {
                    return Err(self.integrity_error(format!(
                        "block {} links forward to {}",
                        height, previous
                    )));
                }
                None => GENESIS_HASH,
            };
            if block.previous_hash() != Some(expected_previous) {
                return Err(self.integrity_error(format!(
                    "block {} does not link to its predecessor's hash",
                    height
                )));
            }

            if block.hash()? != block.compute_hash()? {
                return Err(self.integrity_error(format!(
                    "block {} contents no longer match its hash",
                    height
                )));
            }
        }

        if count != self.size {
            return Err(self.integrity_error(format!(
                "size {} but {} blocks reachable from head",
                self.size, count
            )));
        }

        Ok(())
    }

    /// Replay the pool's wallet deltas on scratch balances
    ///
    /// Fails with `RangeViolation` if any wallet would leave the `i64` range
    /// at any point of the commit.
    fn check_wallet_effects(&self) -> Result<()> {
        let mut balances: Vec<(&ParticipantHandle, i64)> = Vec::new();

        for transaction in &self.pool {
            for (participant, delta) in transaction.wallet_effects() {
                let index = match balances.iter().position(|(p, _)| p.ptr_eq(participant)) {
                    Some(index) => index,
                    None => {
                        balances.push((participant, participant.wallet()));
                        balances.len() - 1
                    }
                };

                let balance = &mut balances[index].1;
                *balance = balance.checked_add(delta).ok_or_else(|| {
                    Error::RangeViolation(format!(
                        "wallet of {} would overflow on commit",
                        participant.name()
                    ))
                })?;
            }
        }

        Ok(())
    }

    fn integrity_error(&self, reason: String) -> Error {
        tracing::error!(size = self.size, reason = %reason, "Chain integrity violation");
        Error::IntegrityViolation(reason)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("head", &self.head)
            .field("size", &self.size)
            .field("pool", &self.pool.len())
            .finish_non_exhaustive()
    }
}

/// Iterator from the head block back to the root, yielding `(height, block)`
#[derive(Debug)]
pub struct Ancestors<'a> {
    blocks: &'a [Block],
    next: Option<usize>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (usize, &'a Block);

    fn next(&mut self) -> Option<Self::Item> {
        let height = self.next?;
        let block = self.blocks.get(height)?;
        // Links always point backwards; anything else ends the walk
        self.next = block.previous().filter(|previous| *previous < height);
        Some((height, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::crypto::to_base64;
    use crate::transaction::TransactionParams;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
    }

    fn cookier(name: &str, wallet: i64) -> ParticipantHandle {
        let handle = ParticipantHandle::create(to_base64(name.as_bytes()), name).unwrap();
        handle.set_wallet(wallet);
        handle
    }

    fn create_test_ledger() -> (Ledger, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now()));
        (Ledger::with_clock(clock.clone()), clock)
    }

    fn transfer(
        ledger: &Ledger,
        giver: &ParticipantHandle,
        receiver: &ParticipantHandle,
    ) -> Transaction {
        Transaction::new_with_clock(
            TransactionParams {
                protocol: "gc".to_string(),
                reference_hash: ledger.reference_hash().unwrap(),
                content: "for the cookies".to_string(),
                participants: vec![giver.clone(), receiver.clone()],
                cookie_count: 1,
                timestamp: now(),
            },
            &FixedClock::new(now()),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let (mut ledger, _clock) = create_test_ledger();

        assert!(!ledger.commit(0).unwrap());
        assert_eq!(ledger.size(), 0);
        assert!(ledger.head().is_none());
        assert!(ledger.pool().is_empty());
    }

    #[test]
    fn test_commit_drains_pool_into_one_block() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 5), cookier("bob", 0));

        for _ in 0..3 {
            let tx = transfer(&ledger, &a, &b);
            ledger.add_transaction(tx).unwrap();
        }
        assert_eq!(ledger.pool().len(), 3);

        assert!(ledger.commit(0).unwrap());
        assert!(ledger.pool().is_empty());
        assert_eq!(ledger.size(), 1);
        assert_eq!(ledger.head().unwrap().transactions().len(), 3);

        // Actions ran once per transaction
        assert_eq!(a.wallet(), 2);
        assert_eq!(b.wallet(), 3);
    }

    #[test]
    fn test_wallet_overflow_aborts_commit() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 5), cookier("bob", i64::MAX - 1));

        for _ in 0..2 {
            ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
        }

        // The second transfer would push bob past i64::MAX
        let result = ledger.commit(0);
        assert!(matches!(result, Err(Error::RangeViolation(_))));
        assert_eq!(ledger.pool().len(), 2);
        assert_eq!(ledger.size(), 0);
        assert!(ledger.head().is_none());
        assert_eq!(a.wallet(), 5);
        assert_eq!(b.wallet(), i64::MAX - 1);

        // Once the balance allows it, the same pool commits
        b.set_wallet(0);
        assert!(ledger.commit(0).unwrap());
        assert_eq!(b.wallet(), 2);
    }

    #[test]
    fn test_genesis_links_to_placeholder() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 1), cookier("bob", 0));

        assert_eq!(ledger.reference_hash().unwrap(), GENESIS_HASH);
        ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
        ledger.commit(0).unwrap();

        let head = ledger.head().unwrap();
        assert_eq!(head.previous_hash(), Some(GENESIS_HASH));
        assert!(head.previous().is_none());
    }

    #[test]
    fn test_blocks_link_to_previous_hash() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 2), cookier("bob", 0));

        ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
        ledger.commit(0).unwrap();
        let first_hash = ledger.head_hash().unwrap().unwrap();

        ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
        ledger.commit(1).unwrap();

        let head = ledger.head().unwrap();
        assert_eq!(head.previous_hash(), Some(first_hash.as_str()));
        assert_eq!(head.previous(), Some(0));
        assert_eq!(head.nonce(), 1);
        assert_eq!(ledger.reference_hash().unwrap(), head.hash().unwrap());
    }

    #[test]
    fn test_size_matches_ancestors() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 10), cookier("bob", 0));

        for n in 1..=5 {
            ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
            ledger.commit(n).unwrap();
            assert!(!ledger.commit(n).unwrap());

            assert_eq!(ledger.size(), n as usize);
            assert_eq!(ledger.ancestors().count(), ledger.size());
        }

        let heights: Vec<usize> = ledger.ancestors().map(|(height, _)| height).collect();
        assert_eq!(heights, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_rejected_transaction_not_admitted() {
        let (mut ledger, clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 1), cookier("bob", 0));
        ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();

        // Built while valid, but the ledger's clock now sits before its timestamp
        let tx = transfer(&ledger, &a, &b);
        clock.set(now() - Duration::seconds(1));

        let result = ledger.add_transaction(tx);
        assert!(matches!(result, Err(Error::RangeViolation(_))));
        assert_eq!(ledger.pool().len(), 1);
    }

    #[test]
    fn test_verify_chain() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 3), cookier("bob", 0));

        assert!(ledger.verify_chain().is_ok());
        for n in 0..3 {
            ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
            ledger.commit(n).unwrap();
        }
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn test_verify_chain_detects_tampering() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 3), cookier("bob", 0));

        ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
        ledger.commit(0).unwrap();

        // The sealed hash no longer matches what the block renders to
        a.set_public_key(to_base64(b"someone else"));
        assert!(matches!(
            ledger.verify_chain(),
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_summaries_root_first() {
        let (mut ledger, _clock) = create_test_ledger();
        let (a, b) = (cookier("alice", 3), cookier("bob", 0));

        for n in 0..2 {
            ledger.add_transaction(transfer(&ledger, &a, &b)).unwrap();
            ledger.commit(n).unwrap();
        }

        let summaries = ledger.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].previous_hash, GENESIS_HASH);
        assert_eq!(summaries[1].previous_hash, summaries[0].hash);
    }
}
