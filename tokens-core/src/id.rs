use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::str::FromStr;

use crate::error::TokenError;

// PartyKey identifies a party on the ledger.
// It is a 32 byte compressed Edwards25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyKey([u8; 32]);

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format as a hex string with a prefix of the first 6 bytes
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "key:{}", prefix)
    }
}

impl Deref for PartyKey {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartyKey {
    /// Create a PartyKey from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PartyKey(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Deterministically derive a public key from seeds
    ///
    /// The seeds are hashed into a scalar which is multiplied by the
    /// Ed25519 base point. Used for named sample parties and tests.
    pub fn from_seed(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"TOKENS_Party");

        for seed in seeds {
            hasher.update(seed);
        }

        let scalar = Scalar::from_bytes_mod_order(hasher.finalize().into());
        PartyKey(EdwardsPoint::mul_base(&scalar).compress().to_bytes())
    }

    /// Check that the key decompresses to a point on the ed25519 curve
    pub fn is_valid_point(&self) -> bool {
        let Ok(compressed) = CompressedEdwardsY::from_slice(self.0.as_ref()) else {
            return false;
        };
        compressed.decompress().is_some()
    }
}

/// A party able to issue or hold tokens
///
/// Two parties are the same party when their owning keys match; the name is
/// informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// Human readable name, e.g. "O=Issuer, L=London, C=GB"
    pub name: String,

    /// The key that signs on behalf of this party
    pub owning_key: PartyKey,
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: PartyKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }

    /// Create a party whose key is derived from its name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let owning_key = PartyKey::from_seed(&[name.as_bytes()]);
        Self { name, owning_key }
    }

    pub fn owning_key(&self) -> &PartyKey {
        &self.owning_key
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.owning_key == other.owning_key
    }
}

impl Eq for Party {}

impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owning_key.hash(state);
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identity of a value record: the transaction that created it and its output index
///
/// Ordered lexicographically by `(tx_hash, index)`. Selection consumes
/// candidates in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub tx_hash: [u8; 32],
    pub index: u32,
}

impl StateRef {
    pub fn new(tx_hash: [u8; 32], index: u32) -> Self {
        Self { tx_hash, index }
    }

    /// Hash seeds into a transaction id
    pub fn create_tx_hash(seeds: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"TOKENS_Transaction");

        for seed in seeds {
            hasher.update(seed);
        }

        hasher.finalize().into()
    }

    /// Build a reference from seeds, mainly for issuance and tests
    pub fn from_seeds(seeds: &[&[u8]], index: u32) -> Self {
        Self::new(Self::create_tx_hash(seeds), index)
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", hex::encode(&self.tx_hash[0..6]), self.index)
    }
}

/// 128-bit identifier with an optional external reference
///
/// Equality, hashing and ordering only consider the 128-bit id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    pub external_id: Option<String>,
    id: [u8; 16],
}

impl UniqueIdentifier {
    /// Create an identifier from raw bytes
    pub fn from_bytes(id: [u8; 16]) -> Self {
        Self {
            external_id: None,
            id,
        }
    }

    /// Create a random (version 4 layout) identifier
    pub fn random() -> Self {
        let mut id: [u8; 16] = rand::random();
        id[6] = (id[6] & 0x0f) | 0x40;
        id[8] = (id[8] & 0x3f) | 0x80;
        Self::from_bytes(id)
    }

    /// Attach an external id, e.g. a business reference
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.id
    }

    /// The id in hyphenated 8-4-4-4-12 form
    pub fn hyphenated(&self) -> String {
        let hex = hex::encode(self.id);
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl PartialEq for UniqueIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UniqueIdentifier {}

impl Hash for UniqueIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for UniqueIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for UniqueIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(external) => write!(f, "{}_{}", external, self.hyphenated()),
            None => write!(f, "{}", self.hyphenated()),
        }
    }
}

impl FromStr for UniqueIdentifier {
    type Err = TokenError;

    /// Parse the hyphenated form produced by `hyphenated`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact)
            .map_err(|e| TokenError::Serialization(format!("Invalid identifier {}: {}", s, e)))?;
        let id: [u8; 16] = bytes
            .try_into()
            .map_err(|_| TokenError::Serialization(format!("Identifier {} is not 16 bytes", s)))?;
        Ok(Self::from_bytes(id))
    }
}

/// Owner of a set of soft-lock reservations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockId(UniqueIdentifier);

impl LockId {
    pub fn new(id: UniqueIdentifier) -> Self {
        LockId(id)
    }

    /// A fresh lock id, one per spend request
    pub fn random() -> Self {
        LockId(UniqueIdentifier::random())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        LockId(UniqueIdentifier::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock:{}", self.0.hyphenated())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_party_key_is_deterministic() {
        let key1 = PartyKey::from_seed(&[b"Alice"]);
        let key2 = PartyKey::from_seed(&[b"Alice"]);
        assert_eq!(key1, key2);

        // Changing seeds creates a different key
        let key3 = PartyKey::from_seed(&[b"Bob"]);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_derived_key_is_on_curve() {
        let key = PartyKey::from_seed(&[b"issuer", b"bank"]);
        assert!(key.is_valid_point());
    }

    #[test]
    fn test_party_equality_uses_key() {
        let key = PartyKey::from_seed(&[b"shared"]);
        let a = Party::new("O=Alpha", key);
        let b = Party::new("O=Alpha Renamed", key);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));

        assert_ne!(Party::named("O=Alpha"), Party::named("O=Beta"));
    }

    #[test]
    fn test_state_ref_ordering() {
        let tx = StateRef::create_tx_hash(&[b"tx1"]);
        let a = StateRef::new(tx, 0);
        let b = StateRef::new(tx, 1);
        assert!(a < b);

        let mut low = [0u8; 32];
        low[0] = 0;
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(StateRef::new(low, 99) < StateRef::new(high, 0));
    }

    #[test]
    fn test_unique_identifier_round_trips_through_text() {
        let id = UniqueIdentifier::random();
        let parsed: UniqueIdentifier = id.hyphenated().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.hyphenated().len(), 36);
    }

    #[test]
    fn test_unique_identifier_external_id_ignored_for_equality() {
        let id = UniqueIdentifier::from_bytes([7u8; 16]);
        let tagged = id.clone().with_external_id("house-1");
        assert_eq!(id, tagged);
        assert!(tagged.to_string().starts_with("house-1_"));
    }

    #[test]
    fn test_random_lock_ids_differ() {
        assert_ne!(LockId::random(), LockId::random());
    }
}
