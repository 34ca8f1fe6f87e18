//! Transactions: validated records of cookie movements
//!
//! Every transaction variant is a [`TransactionKind`], keyed by its two
//! character protocol tag. The kind fixes the arity, the role each position
//! plays, and the wallet deltas applied when the transaction is committed.
//!
//! # Canonical form
//!
//! ```text
//! protocol|reference_hash|pubk1,pubk2[,pubk3]|content|cookie_count|timestamp
//! ```
//!
//! The timestamp is RFC 3339 in UTC with nanosecond precision, so every
//! distinct timestamp renders distinctly. This string is the exact block
//! hashing input, so its layout must never change.

use crate::clock::{Clock, SystemClock};
use crate::types::ParticipantHandle;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol tag length (characters)
pub const PROTOCOL_LEN: usize = 2;

/// Maximum content length (characters)
pub const CONTENT_MAX_LEN: usize = 100;

/// Minimum number of participants
pub const MIN_PARTICIPANTS: usize = 2;

/// Maximum number of participants
pub const MAX_PARTICIPANTS: usize = 3;

/// Maximum cookie count
pub const COOKIE_COUNT_MAX: u8 = 99;

/// Transaction variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// "gc": giver gives receiver a crypto cookie. Participants: `[giver, receiver]`
    Transfer,
    /// "rc": receiver got a real cookie from giver and pays for it.
    /// Participants: `[receiver, giver]`
    Receive,
    /// "cc": giver owes middler owes receiver; the chain is settled directly.
    /// Participants: `[giver, middler, receiver]`
    Collapse,
}

/// Named position inside a transaction's participant list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Cookie giver
    Giver,
    /// Cookie receiver
    Receiver,
    /// Intermediate party of a collapse
    Middler,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Giver => "giver",
            Role::Receiver => "receiver",
            Role::Middler => "middler",
        };
        f.write_str(name)
    }
}

impl TransactionKind {
    /// Protocol tag
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "gc",
            TransactionKind::Receive => "rc",
            TransactionKind::Collapse => "cc",
        }
    }

    /// Parse a protocol tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        let len = tag.chars().count();
        if len != PROTOCOL_LEN {
            return Err(Error::RangeViolation(format!(
                "protocol must be exactly {} characters, got {}",
                PROTOCOL_LEN, len
            )));
        }

        match tag {
            "gc" => Ok(TransactionKind::Transfer),
            "rc" => Ok(TransactionKind::Receive),
            "cc" => Ok(TransactionKind::Collapse),
            other => Err(Error::TypeMismatch(format!("unknown protocol: {}", other))),
        }
    }

    /// Exact number of participants
    pub fn arity(&self) -> usize {
        match self {
            TransactionKind::Transfer | TransactionKind::Receive => 2,
            TransactionKind::Collapse => 3,
        }
    }

    /// Index of `role` in the participant list, if the variant has it
    pub fn position(&self, role: Role) -> Option<usize> {
        match (self, role) {
            (TransactionKind::Transfer, Role::Giver) => Some(0),
            (TransactionKind::Transfer, Role::Receiver) => Some(1),
            (TransactionKind::Receive, Role::Receiver) => Some(0),
            (TransactionKind::Receive, Role::Giver) => Some(1),
            (TransactionKind::Collapse, Role::Giver) => Some(0),
            (TransactionKind::Collapse, Role::Middler) => Some(1),
            (TransactionKind::Collapse, Role::Receiver) => Some(2),
            (_, Role::Middler) => None,
        }
    }

    /// Wallet delta per participant position
    fn wallet_deltas(&self) -> &'static [i64] {
        match self {
            TransactionKind::Transfer | TransactionKind::Receive => &[-1, 1],
            TransactionKind::Collapse => &[1, 0, -1],
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Raw constructor input
#[derive(Debug, Clone)]
pub struct TransactionParams {
    /// Two character protocol tag
    pub protocol: String,
    /// Hash of a recent block (anti-replay anchor)
    pub reference_hash: String,
    /// Free text, at most 100 characters
    pub content: String,
    /// Ordered participants, 2 or 3 depending on the protocol
    pub participants: Vec<ParticipantHandle>,
    /// Cookie count, 0-99
    pub cookie_count: u8,
    /// When the transaction happened; must not be in the future
    pub timestamp: DateTime<Utc>,
}

/// Validated transaction
///
/// There is no way to obtain a `Transaction` that failed validation:
/// construction either returns a fully checked value or an error.
#[derive(Debug, Clone)]
pub struct Transaction {
    kind: TransactionKind,
    reference_hash: String,
    content: String,
    participants: Vec<ParticipantHandle>,
    cookie_count: u8,
    timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Build and validate against the wall clock
    pub fn new(params: TransactionParams) -> Result<Self> {
        Self::new_with_clock(params, &SystemClock)
    }

    /// Build and validate against `clock`
    pub fn new_with_clock(params: TransactionParams, clock: &dyn Clock) -> Result<Self> {
        let kind = TransactionKind::from_tag(&params.protocol)?;

        let transaction = Self {
            kind,
            reference_hash: params.reference_hash,
            content: params.content,
            participants: params.participants,
            cookie_count: params.cookie_count,
            timestamp: params.timestamp,
        };
        transaction.validate_at(clock.now())?;

        Ok(transaction)
    }

    /// Giver gives receiver a crypto cookie
    pub fn transfer(
        reference_hash: impl Into<String>,
        giver: ParticipantHandle,
        receiver: ParticipantHandle,
        reason: impl Into<String>,
        cookie_count: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(TransactionParams {
            protocol: TransactionKind::Transfer.tag().to_string(),
            reference_hash: reference_hash.into(),
            content: reason.into(),
            participants: vec![giver, receiver],
            cookie_count,
            timestamp,
        })
    }

    /// Receiver acknowledges a real cookie from giver
    pub fn receive(
        reference_hash: impl Into<String>,
        receiver: ParticipantHandle,
        giver: ParticipantHandle,
        cookie_type: impl Into<String>,
        cookie_count: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(TransactionParams {
            protocol: TransactionKind::Receive.tag().to_string(),
            reference_hash: reference_hash.into(),
            content: cookie_type.into(),
            participants: vec![receiver, giver],
            cookie_count,
            timestamp,
        })
    }

    /// Settle a giver -> middler -> receiver debt chain
    pub fn collapse(
        reference_hash: impl Into<String>,
        giver: ParticipantHandle,
        middler: ParticipantHandle,
        receiver: ParticipantHandle,
        cookie_type: impl Into<String>,
        cookie_count: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(TransactionParams {
            protocol: TransactionKind::Collapse.tag().to_string(),
            reference_hash: reference_hash.into(),
            content: cookie_type.into(),
            participants: vec![giver, middler, receiver],
            cookie_count,
            timestamp,
        })
    }

    /// Validate against the wall clock
    pub fn validate(&self) -> Result<()> {
        self.validate_at(Utc::now())
    }

    /// Validate, treating `now` as the current time
    ///
    /// Pure: never mutates the transaction.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<()> {
        let content_len = self.content.chars().count();
        if content_len > CONTENT_MAX_LEN {
            return Err(Error::RangeViolation(format!(
                "content cannot be longer than {} characters, got {}",
                CONTENT_MAX_LEN, content_len
            )));
        }

        let count = self.participants.len();
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&count) {
            return Err(Error::RangeViolation(format!(
                "transaction needs {}-{} participants, got {}",
                MIN_PARTICIPANTS, MAX_PARTICIPANTS, count
            )));
        }
        if count != self.kind.arity() {
            return Err(Error::RangeViolation(format!(
                "protocol {} needs exactly {} participants, got {}",
                self.kind,
                self.kind.arity(),
                count
            )));
        }

        if self.cookie_count > COOKIE_COUNT_MAX {
            return Err(Error::RangeViolation(format!(
                "cookie count must be at most {}, got {}",
                COOKIE_COUNT_MAX, self.cookie_count
            )));
        }

        if self.timestamp > now {
            return Err(Error::RangeViolation(format!(
                "timestamp {} is in the future",
                self.timestamp
            )));
        }

        for participant in &self.participants {
            participant.check_capability()?;
        }

        self.validate_further()
    }

    /// Per-variant checks run after the generic ones
    ///
    /// Any error here rejects the transaction like a generic check would.
    fn validate_further(&self) -> Result<()> {
        match self.kind {
            TransactionKind::Transfer | TransactionKind::Receive => Ok(()),
            TransactionKind::Collapse => {
                // A chain that loops back on itself has nothing to settle
                for (i, first) in self.participants.iter().enumerate() {
                    if self.participants[i + 1..].iter().any(|other| other == first) {
                        return Err(Error::DuplicateEntry(format!(
                            "collapse participant {} appears more than once",
                            first.name()
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Variant
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Protocol tag
    pub fn protocol(&self) -> &'static str {
        self.kind.tag()
    }

    /// Anchor block hash
    pub fn reference_hash(&self) -> &str {
        &self.reference_hash
    }

    /// Free text (reason or cookie type)
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the content, keeping the length bound
    pub fn set_content(&mut self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        let len = content.chars().count();
        if len > CONTENT_MAX_LEN {
            return Err(Error::RangeViolation(format!(
                "content cannot be longer than {} characters, got {}",
                CONTENT_MAX_LEN, len
            )));
        }
        self.content = content;
        Ok(())
    }

    /// Participants in protocol order
    pub fn participants(&self) -> &[ParticipantHandle] {
        &self.participants
    }

    /// Cookie count
    pub fn cookie_count(&self) -> u8 {
        self.cookie_count
    }

    /// Timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Participant playing `role`, if the variant has that role
    pub fn role(&self, role: Role) -> Option<&ParticipantHandle> {
        self.kind
            .position(role)
            .and_then(|index| self.participants.get(index))
    }

    /// Replace the participant playing `role`
    ///
    /// Only the new participant is checked; the rest of the transaction is
    /// not re-validated.
    pub fn set_role(&mut self, role: Role, participant: ParticipantHandle) -> Result<()> {
        let index = self.kind.position(role).ok_or_else(|| {
            Error::TypeMismatch(format!("protocol {} has no {}", self.kind, role))
        })?;
        participant.check_capability()?;

        let slot = self.participants.get_mut(index).ok_or_else(|| {
            Error::RangeViolation(format!("no participant at position {}", index))
        })?;
        *slot = participant;
        Ok(())
    }

    /// Giver (every variant has one)
    pub fn giver(&self) -> Option<&ParticipantHandle> {
        self.role(Role::Giver)
    }

    /// Receiver (every variant has one)
    pub fn receiver(&self) -> Option<&ParticipantHandle> {
        self.role(Role::Receiver)
    }

    /// Middler (collapse only)
    pub fn middler(&self) -> Option<&ParticipantHandle> {
        self.role(Role::Middler)
    }

    /// Replace the giver
    pub fn set_giver(&mut self, giver: ParticipantHandle) -> Result<()> {
        self.set_role(Role::Giver, giver)
    }

    /// Replace the receiver
    pub fn set_receiver(&mut self, receiver: ParticipantHandle) -> Result<()> {
        self.set_role(Role::Receiver, receiver)
    }

    /// Replace the middler
    pub fn set_middler(&mut self, middler: ParticipantHandle) -> Result<()> {
        self.set_role(Role::Middler, middler)
    }

    /// Apply the variant's wallet deltas to the participants
    ///
    /// Not idempotent: the ledger calls this exactly once, when the
    /// transaction's block is committed.
    pub fn action(&self) {
        for (participant, delta) in self.wallet_effects() {
            participant.adjust_wallet(delta);
        }
    }

    /// Non-zero wallet deltas `action` would apply, in participant order
    pub fn wallet_effects(&self) -> impl Iterator<Item = (&ParticipantHandle, i64)> + '_ {
        self.participants
            .iter()
            .zip(self.kind.wallet_deltas())
            .filter(|(_, delta)| **delta != 0)
            .map(|(participant, delta)| (participant, *delta))
    }

    /// Canonical pipe-delimited form (block hashing input)
    pub fn render(&self) -> String {
        let public_keys: Vec<String> = self
            .participants
            .iter()
            .map(ParticipantHandle::public_key)
            .collect();

        format!(
            "{}|{}|{}|{}|{}|{}",
            self.kind.tag(),
            self.reference_hash,
            public_keys.join(","),
            self.content,
            self.cookie_count,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
