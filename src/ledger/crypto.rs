use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A participant's address: the public key in base58 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let encoded = bs58::encode(public_key.as_bytes()).into_string();
        Address(encoded)
    }

    /// Converts the address back to the public key it encodes
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        VerifyingKey::from_bytes(&bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key bytes".to_string())
        })?)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Validate that the string is a valid base58 encoding
        bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Ok(Address(s.to_string()))
    }
}

/// A digital signature in base58 form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        let encoded = bs58::encode(signature.to_bytes()).into_string();
        DigitalSignature(encoded)
    }

    /// Converts the digital signature back to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An asymmetric keypair. The signing half never leaves this struct; the
/// verifying half doubles as the owner's address.
#[derive(Debug, Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Keypair {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        Keypair {
            signing_key,
            verifying_key,
            address,
        }
    }

    /// The base58 address derived from the public key
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The public half of the keypair
    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// The secret half, base58-encoded. Display-only; nothing in the ledger
    /// ever reads this back.
    pub fn secret_key_b58(&self) -> String {
        bs58::encode(self.signing_key.to_bytes()).into_string()
    }

    /// Signs a message with the secret key. Ed25519 signatures are
    /// deterministic: signing the same message twice yields the same bytes.
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature = self.signing_key.sign(message);
        DigitalSignature::from_signature(&signature)
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keypair = Keypair::generate();
        assert!(!keypair.address().as_str().is_empty());
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = Keypair::generate();
        let message = b"Hello, world!";

        let signature = keypair.sign(message);

        let result = verify_signature(message, &signature, keypair.public_key()).unwrap();
        assert!(result);

        // Verify with wrong message
        let wrong_message = b"Wrong message";
        let result = verify_signature(wrong_message, &signature, keypair.public_key()).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let keypair = Keypair::generate();
        let message = b"same payload";

        assert_eq!(keypair.sign(message), keypair.sign(message));
    }

    #[test]
    fn test_address_conversion() {
        let keypair = Keypair::generate();
        let address = keypair.address();

        let public_key = address.to_public_key().unwrap();

        assert_eq!(public_key.as_bytes(), keypair.public_key().as_bytes());
    }

    #[test]
    fn test_distinct_keypairs() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.address(), b.address());
    }
}
