// intent-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Intent Gate Canonical Hashing
// Description: RFC 8785 JSON canonicalization, chain hashing, and signing.
// Purpose: Provide deterministic digests for dedupe keys, ledgers, and audit
//          chains, plus tenant-keyed HMAC signatures over chain links.
// Dependencies: serde, serde_jcs, sha2, hmac, subtle
// ============================================================================

//! ## Overview
//! Every hash in Intent Gate is computed over RFC 8785 (JCS) canonical JSON so
//! digests are stable across processes and replayable offline. Chain links are
//! SHA-256; each link is additionally HMAC-signed with the owning tenant's
//! signing key, and signatures are compared in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Previous-hash value for the first link of any chain.
pub const GENESIS_PREVIOUS_HASH: &str = "";

/// HMAC-SHA-256 keyed mac used for chain signatures.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Lowercase hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    /// Creates a digest from raw hash bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex_encode(bytes))
    }

    /// Creates a digest from an existing lowercase hex string.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes or signatures.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Signing key was rejected by the mac implementation.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// SECTION: Canonical Hashing
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes a serializable value over its canonical JSON form.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(&bytes))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest::from_bytes(&hasher.finalize())
}

// ============================================================================
// SECTION: Chain Signatures
// ============================================================================

/// HMAC-SHA-256 signature over a chain link, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainSignature(String);

impl ChainSignature {
    /// Creates a signature from an existing lowercase hex string.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the signature as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Signs a record hash with the tenant's signing key.
///
/// # Errors
///
/// Returns [`HashError::InvalidKey`] when the key is rejected.
pub fn sign_digest(key: &[u8], digest: &HashDigest) -> Result<ChainSignature, HashError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| HashError::InvalidKey(err.to_string()))?;
    mac.update(digest.as_str().as_bytes());
    Ok(ChainSignature(hex_encode(&mac.finalize().into_bytes())))
}

/// Verifies a chain signature in constant time.
///
/// # Errors
///
/// Returns [`HashError::InvalidKey`] when the key is rejected.
pub fn verify_signature(
    key: &[u8],
    digest: &HashDigest,
    signature: &ChainSignature,
) -> Result<bool, HashError> {
    let expected = sign_digest(key, digest)?;
    Ok(expected.0.as_bytes().ct_eq(signature.0.as_bytes()).into())
}

// ============================================================================
// SECTION: Signing Keys
// ============================================================================

/// Tenant signing-key registry.
///
/// Key management is an external collaborator; this registry carries the
/// already-delivered key material. Tenants without an override sign with the
/// deployment default key.
#[derive(Debug, Clone)]
pub struct SigningKeys {
    /// Deployment default key.
    default_key: Vec<u8>,
    /// Per-tenant overrides.
    tenant_keys: std::collections::BTreeMap<String, Vec<u8>>,
}

impl SigningKeys {
    /// Creates a registry with only the deployment default key.
    #[must_use]
    pub fn new(default_key: Vec<u8>) -> Self {
        Self {
            default_key,
            tenant_keys: std::collections::BTreeMap::new(),
        }
    }

    /// Adds a per-tenant key override.
    #[must_use]
    pub fn with_tenant_key(mut self, tenant_id: impl Into<String>, key: Vec<u8>) -> Self {
        self.tenant_keys.insert(tenant_id.into(), key);
        self
    }

    /// Returns the signing key for a tenant.
    #[must_use]
    pub fn key_for(&self, tenant_id: &str) -> &[u8] {
        self.tenant_keys.get(tenant_id).map_or(&self.default_key, Vec::as_slice)
    }
}

// ============================================================================
// SECTION: Dedupe Hash
// ============================================================================

/// Canonical payload hashed into an intent dedupe key.
#[derive(Debug, Serialize)]
struct DedupeBasis<'a> {
    /// Tenant scope.
    tenant_id: &'a str,
    /// Submitting entity.
    entity_id: &'a str,
    /// Whitespace-normalized lowercase goal text.
    goal: String,
    /// Intent context mapping.
    context: &'a serde_json::Value,
}

/// Computes the stable dedupe hash for a submission.
///
/// The goal is normalized (trimmed, lowercased, inner whitespace collapsed) so
/// cosmetic differences do not defeat duplicate collapse.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn dedupe_hash(
    tenant_id: &str,
    entity_id: &str,
    goal: &str,
    context: &serde_json::Value,
) -> Result<HashDigest, HashError> {
    let normalized = goal.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    hash_canonical_json(&DedupeBasis {
        tenant_id,
        entity_id,
        goal: normalized,
        context,
    })
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::*;

    /// Tests canonical hashing is key-order independent.
    #[test]
    fn test_canonical_hash_is_stable() {
        let first = hash_canonical_json(&json!({"b": 1, "a": 2})).unwrap();
        let second = hash_canonical_json(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(first, second);
    }

    /// Tests dedupe hashing normalizes goal whitespace and case.
    #[test]
    fn test_dedupe_hash_normalizes_goal() {
        let context = json!({"scope": "weather"});
        let first = dedupe_hash("t1", "e1", "Read  Public\tWeather", &context).unwrap();
        let second = dedupe_hash("t1", "e1", "read public weather", &context).unwrap();
        assert_eq!(first, second);
    }

    /// Tests dedupe hashing separates tenants.
    #[test]
    fn test_dedupe_hash_is_tenant_scoped() {
        let context = json!({});
        let first = dedupe_hash("t1", "e1", "goal", &context).unwrap();
        let second = dedupe_hash("t2", "e1", "goal", &context).unwrap();
        assert_ne!(first, second);
    }

    /// Tests signature verification round-trips and rejects the wrong key.
    #[test]
    fn test_signature_round_trip() {
        let digest = hash_bytes(b"link");
        let signature = sign_digest(b"tenant-key", &digest).unwrap();
        assert!(verify_signature(b"tenant-key", &digest, &signature).unwrap());
        assert!(!verify_signature(b"other-key", &digest, &signature).unwrap());
    }
}
