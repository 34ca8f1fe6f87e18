//! Participants ("cookiers") and the shared handles transactions hold
//!
//! The participant directory owns participants; transactions and blocks only
//! keep [`ParticipantHandle`]s to them, so that committing a block moves
//! cookies between the very same wallets the directory reports.

use crate::{crypto, Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Minimum participant name length (characters)
pub const NAME_MIN_LEN: usize = 2;

/// Maximum participant name length (characters)
pub const NAME_MAX_LEN: usize = 16;

fn check_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(Error::RangeViolation(format!(
            "name must be of length {}-{}, got {}",
            NAME_MIN_LEN, NAME_MAX_LEN, len
        )));
    }
    Ok(())
}

/// Identified actor holding a cookie wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// RSA public key (base64 DER)
    public_key: String,
    /// Display name, 2-16 characters
    name: String,
    /// Cookie balance; may go negative
    wallet: i64,
}

impl Participant {
    /// Create participant with an empty wallet
    pub fn new(public_key: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;

        Ok(Self {
            public_key: public_key.into(),
            name,
            wallet: 0,
        })
    }

    /// Public key (base64 DER)
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie balance
    pub fn wallet(&self) -> i64 {
        self.wallet
    }

    /// Check the fields a transaction relies on
    ///
    /// The public key ends up in the canonical transaction string, so it must
    /// be non-empty base64 (which also keeps `|` and `,` out of it).
    pub fn check_capability(&self) -> Result<()> {
        if self.public_key.is_empty() {
            return Err(Error::TypeMismatch(
                "participant has no public key".to_string(),
            ));
        }
        if self.public_key.trim() != self.public_key
            || crypto::from_base64(&self.public_key).is_err()
        {
            return Err(Error::TypeMismatch(format!(
                "participant {} public key is not base64",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(Error::TypeMismatch("participant has no name".to_string()));
        }
        Ok(())
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key && self.name == other.name
    }
}

impl Eq for Participant {}

/// Shared reference to a participant
///
/// Clones point at the same participant. Equality follows participant
/// identity, i.e. the (public key, name) pair.
#[derive(Debug, Clone)]
pub struct ParticipantHandle(Arc<RwLock<Participant>>);

impl ParticipantHandle {
    /// Wrap a participant
    pub fn new(participant: Participant) -> Self {
        Self(Arc::new(RwLock::new(participant)))
    }

    /// Create a participant and wrap it
    pub fn create(public_key: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Participant::new(public_key, name).map(Self::new)
    }

    /// Copy of the current participant state
    pub fn snapshot(&self) -> Participant {
        self.0.read().clone()
    }

    /// Public key (base64 DER)
    pub fn public_key(&self) -> String {
        self.0.read().public_key.clone()
    }

    /// Display name
    pub fn name(&self) -> String {
        self.0.read().name.clone()
    }

    /// Cookie balance
    pub fn wallet(&self) -> i64 {
        self.0.read().wallet
    }

    /// Replace the public key
    pub fn set_public_key(&self, public_key: impl Into<String>) {
        self.0.write().public_key = public_key.into();
    }

    /// Rename, keeping the 2-16 character bound
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        check_name(&name)?;
        self.0.write().name = name;
        Ok(())
    }

    /// Overwrite the cookie balance
    pub fn set_wallet(&self, wallet: i64) {
        self.0.write().wallet = wallet;
    }

    /// Add `delta` (possibly negative) to the cookie balance, saturating at
    /// the `i64` bounds
    pub fn adjust_wallet(&self, delta: i64) {
        let mut participant = self.0.write();
        participant.wallet = participant.wallet.saturating_add(delta);
    }

    /// See [`Participant::check_capability`]
    pub fn check_capability(&self) -> Result<()> {
        self.0.read().check_capability()
    }

    /// Verify that `signature` over `message` was made by this participant
    pub fn verify(&self, message: &str, signature: &str) -> Result<bool> {
        let public_key = self.public_key();
        crypto::verify(message, signature, &public_key)
    }

    /// Whether both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ParticipantHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0.read() == *other.0.read()
    }
}

impl Eq for ParticipantHandle {}

impl fmt::Display for ParticipantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let participant = self.0.read();
        write!(f, "{} ({})", participant.name, participant.wallet)
    }
}
