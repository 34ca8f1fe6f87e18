//! MoCookie Ledger
//!
//! Append-only ledger of signed cookie transactions between participants.
//!
//! # Architecture
//!
//! - **Hash-linked chain**: each block seals `SHA-512(previous_hash || transactions)`
//! - **Pool + commit**: validated transactions wait in a pool; a commit seals
//!   the whole pool into one block and applies the wallet effects
//! - **Closed transaction set**: transfer, receive and collapse, keyed by protocol tag
//! - **Single writer**: an actor serializes all mutations of a shared ledger
//!
//! # Invariants
//!
//! - Nothing enters the pool without passing validation
//! - A block hash, once computed, never changes
//! - Commit is all-or-nothing with respect to the pool
//! - `size` equals the number of blocks reachable from head

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod clock;
pub mod transaction;
pub mod block;
pub mod ledger;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{Participant, ParticipantHandle};
pub use transaction::{Role, Transaction, TransactionKind, TransactionParams};
pub use block::{Block, BlockSummary, GENESIS_HASH};
pub use ledger::Ledger;
pub use crypto::KeyHolder;
pub use directory::{Directory, ParticipantDirectory, ParticipantFilter};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
