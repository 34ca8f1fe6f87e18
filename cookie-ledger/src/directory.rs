//! Participant directory
//!
//! The ledger never owns participants. It consumes them through
//! [`ParticipantDirectory::lookup`]; [`Directory`] is the in-memory
//! implementation used by the binary and the tests.

use crate::types::{Participant, ParticipantHandle};
use crate::{Error, Result};

/// Search criteria over participant fields
///
/// A participant matches when every supplied field is equal; absent fields
/// are ignored. At least one field must be supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantFilter {
    /// Exact public key
    pub public_key: Option<String>,
    /// Exact name
    pub name: Option<String>,
    /// Exact wallet balance
    pub wallet: Option<i64>,
}

impl ParticipantFilter {
    /// Empty filter; add at least one field before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on public key
    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    /// Match on name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Match on wallet balance
    pub fn wallet(mut self, wallet: i64) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Whether no field is supplied
    pub fn is_empty(&self) -> bool {
        self.public_key.is_none() && self.name.is_none() && self.wallet.is_none()
    }

    /// Whether `participant` satisfies every supplied field
    pub fn matches(&self, participant: &Participant) -> bool {
        self.public_key
            .as_deref()
            .map_or(true, |key| participant.public_key() == key)
            && self
                .name
                .as_deref()
                .map_or(true, |name| participant.name() == name)
            && self
                .wallet
                .map_or(true, |wallet| participant.wallet() == wallet)
    }
}

/// Read access to registered participants
pub trait ParticipantDirectory {
    /// All participants matching `filter`
    fn lookup(&self, filter: &ParticipantFilter) -> Result<Vec<ParticipantHandle>>;
}

/// In-memory participant list
#[derive(Debug, Default)]
pub struct Directory {
    participants: Vec<ParticipantHandle>,
}

impl Directory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant
    pub fn add(&mut self, participant: ParticipantHandle) -> Result<()> {
        if self.participants.contains(&participant) {
            return Err(Error::DuplicateEntry(format!(
                "participant {} already exists",
                participant.name()
            )));
        }

        tracing::debug!(name = %participant.name(), "Participant registered");
        self.participants.push(participant);
        Ok(())
    }

    /// Unregister a participant
    pub fn remove(&mut self, participant: &ParticipantHandle) -> Result<ParticipantHandle> {
        let index = self
            .participants
            .iter()
            .position(|entry| entry == participant)
            .ok_or_else(|| {
                Error::NotFound(format!("participant {} not in directory", participant.name()))
            })?;

        Ok(self.participants.remove(index))
    }

    /// Registered participants in registration order
    pub fn participants(&self) -> &[ParticipantHandle] {
        &self.participants
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl ParticipantDirectory for Directory {
    fn lookup(&self, filter: &ParticipantFilter) -> Result<Vec<ParticipantHandle>> {
        if filter.is_empty() {
            return Err(Error::RangeViolation(
                "lookup needs at least one of public_key, name, wallet".to_string(),
            ));
        }

        Ok(self
            .participants
            .iter()
            .filter(|handle| filter.matches(&handle.snapshot()))
            .cloned()
            .collect())
    }
}
