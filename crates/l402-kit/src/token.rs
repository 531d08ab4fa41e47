//! L402 bearer credential: a simplified macaroon binding a payment hash to an
//! HMAC tag, exchanged together with the settlement preimage for access.
//!
//! A minted token is `payment_hash (32 bytes) || HMAC-SHA256(secret, payment_hash)`,
//! base64-encoded. Minting is deterministic, so any instance configured with the
//! same secret verifies tokens minted by any other instance without shared state.

use std::fmt::{self, Display};
use std::str::FromStr;

use base64::{Engine, prelude::BASE64_STANDARD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Decoded token length: 32-byte payment hash + 32-byte tag.
pub const TOKEN_LEN: usize = 64;

/// A 32-byte payment hash identifying a Lightning invoice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentHash(pub [u8; 32]);

impl PaymentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentHash({})", self.to_hex())
    }
}

impl FromStr for PaymentHash {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|err| TokenError::MalformedToken(format!("invalid payment hash hex: {err}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            TokenError::MalformedToken("payment hash must be 32 bytes".to_string())
        })?;
        Ok(PaymentHash(bytes))
    }
}

impl Serialize for PaymentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PaymentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A minted L402 token, base64 over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Macaroon(pub String);

impl Display for Macaroon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Macaroon {
    /// Extract the leading payment hash without verifying the tag.
    ///
    /// Used to key invoice lookups; never treat the result as proof of payment.
    pub fn payment_hash(&self) -> Result<PaymentHash, TokenError> {
        let bytes = BASE64_STANDARD
            .decode(&self.0)
            .map_err(|err| TokenError::MalformedToken(format!("invalid base64: {err}")))?;
        if bytes.len() != TOKEN_LEN {
            return Err(TokenError::MalformedToken(format!(
                "token must decode to {TOKEN_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        Ok(PaymentHash(hash))
    }
}

/// Token verification failures, surfaced to the caller with the specific reason.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token signature mismatch")]
    BadSignature,
    #[error("preimage does not match payment hash")]
    PreimageMismatch,
}

/// Mints and verifies L402 tokens with a process-wide secret.
///
/// Pure and stateless: safe to call concurrently from any instance, provided
/// every instance is configured with the same secret.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCodec(..)")
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        // HMAC-SHA256 accepts keys of any length.
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .expect("HMAC accepts keys of any length");
        TokenCodec { mac }
    }

    /// Mint a token for a payment hash. Deterministic; no randomness.
    pub fn mint(&self, payment_hash: &PaymentHash) -> Macaroon {
        let mut mac = self.mac.clone();
        mac.update(payment_hash.as_bytes());
        let tag = mac.finalize().into_bytes();

        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.extend_from_slice(payment_hash.as_bytes());
        token.extend_from_slice(&tag);
        Macaroon(BASE64_STANDARD.encode(token))
    }

    /// Verify a token together with the settlement preimage.
    ///
    /// Returns the payment hash bound to the token on success. Both the tag
    /// comparison and the preimage comparison are constant-time.
    pub fn verify(&self, token: &Macaroon, preimage_hex: &str) -> Result<PaymentHash, TokenError> {
        let bytes = BASE64_STANDARD
            .decode(&token.0)
            .map_err(|err| TokenError::MalformedToken(format!("invalid base64: {err}")))?;
        if bytes.len() != TOKEN_LEN {
            return Err(TokenError::MalformedToken(format!(
                "token must decode to {TOKEN_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (id, tag) = bytes.split_at(32);

        let mut mac = self.mac.clone();
        mac.update(id);
        mac.verify_slice(tag).map_err(|_| TokenError::BadSignature)?;

        let preimage = hex::decode(preimage_hex)
            .map_err(|err| TokenError::MalformedToken(format!("invalid preimage hex: {err}")))?;
        let digest = Sha256::digest(&preimage);
        if digest.as_slice().ct_eq(id).into() {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(id);
            Ok(PaymentHash(hash))
        } else {
            Err(TokenError::PreimageMismatch)
        }
    }
}

/// Compute the payment hash of a preimage.
pub fn hash_preimage(preimage: &[u8]) -> PaymentHash {
    let digest = Sha256::digest(preimage);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    PaymentHash(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret")
    }

    fn settled_pair() -> (PaymentHash, String) {
        let preimage = [7u8; 32];
        (hash_preimage(&preimage), hex::encode(preimage))
    }

    #[test]
    fn mint_then_verify_roundtrip() {
        let codec = codec();
        let (hash, preimage_hex) = settled_pair();

        let token = codec.mint(&hash);
        let verified = codec.verify(&token, &preimage_hex).unwrap();
        assert_eq!(verified, hash);
    }

    #[test]
    fn verify_rejects_wrong_preimage() {
        let codec = codec();
        let (hash, _) = settled_pair();

        let token = codec.mint(&hash);
        let other = hex::encode([8u8; 32]);
        assert!(matches!(
            codec.verify(&token, &other),
            Err(TokenError::PreimageMismatch)
        ));
    }

    #[test]
    fn verify_rejects_wrong_length() {
        let codec = codec();
        let short = Macaroon(BASE64_STANDARD.encode([0u8; 63]));
        assert!(matches!(
            codec.verify(&short, &hex::encode([0u8; 32])),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn verify_rejects_garbage_base64() {
        let codec = codec();
        assert!(matches!(
            codec.verify(&Macaroon("not base64!!!".to_string()), "00"),
            Err(TokenError::MalformedToken(_))
        ));
    }

    #[test]
    fn any_tag_bitflip_is_bad_signature() {
        let codec = codec();
        let (hash, preimage_hex) = settled_pair();
        let token = codec.mint(&hash);
        let bytes = BASE64_STANDARD.decode(&token.0).unwrap();

        // Flip every bit of the trailing 32 bytes, one at a time.
        for byte in 32..TOKEN_LEN {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[byte] ^= 1 << bit;
                let tampered = Macaroon(BASE64_STANDARD.encode(&tampered));
                assert!(matches!(
                    codec.verify(&tampered, &preimage_hex),
                    Err(TokenError::BadSignature)
                ));
            }
        }
    }

    #[test]
    fn minting_is_deterministic_across_instances() {
        let (hash, _) = settled_pair();
        assert_eq!(
            TokenCodec::new("shared").mint(&hash),
            TokenCodec::new("shared").mint(&hash)
        );
    }

    #[test]
    fn payment_hash_hex_roundtrip() {
        let (hash, _) = settled_pair();
        let parsed: PaymentHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
    }
}
