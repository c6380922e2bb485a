use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::amount::Amount;
use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature};
use super::identity::Identity;

/// Placeholder used in hash payloads for the absent sender of a reward
/// transaction and for an absent signature.
const ABSENT_FIELD: &str = "0";

/// Errors that can occur while signing or validating a transaction
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signing key does not match the transaction sender")]
    SenderMismatch,

    #[error("Transaction carries no signature")]
    MissingSignature,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// An intended value transfer between two addresses, or a sender-less
/// reward payout to a miner.
///
/// Immutable once signed; the ledger's tamper hook mutates the amount on
/// purpose to demonstrate that validation catches it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address; `None` marks a reward payout
    pub sender: Option<Address>,

    /// Recipient address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: Amount,

    /// Fee paid to the miner that confirms this transaction
    pub fee: Amount,

    /// Free-form reference label
    pub reference: String,

    /// Signature over the content hash, absent until signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,

    /// Timestamp when the transaction was created
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new unsigned transfer.
    pub fn new(
        sender: Address,
        recipient: Address,
        amount: Amount,
        fee: Amount,
        reference: impl Into<String>,
    ) -> Self {
        Transaction {
            sender: Some(sender),
            recipient,
            amount,
            fee,
            reference: reference.into(),
            signature: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a reward transaction crediting a miner. It has no sender and
    /// is exempt from signing.
    pub fn reward(recipient: Address, amount: Amount) -> Self {
        Transaction {
            sender: None,
            recipient,
            amount,
            fee: Amount::ZERO,
            reference: "Mining reward".to_string(),
            signature: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_reward(&self) -> bool {
        self.sender.is_none()
    }

    /// Amount plus fee, what the sender's balance must cover.
    pub fn total(&self) -> Amount {
        self.amount + self.fee
    }

    fn sender_str(&self) -> &str {
        self.sender.as_ref().map_or(ABSENT_FIELD, Address::as_str)
    }

    /// The deterministic fingerprint of the transaction content, also used
    /// as the signing payload.
    ///
    /// Field order and numeric formatting are pinned (see [`Amount`]); the
    /// signature and timestamp are deliberately excluded so the hash exists
    /// before signing.
    pub fn content_hash(&self) -> String {
        let payload = format!(
            "{}|{}|{}|{}|{}",
            self.sender_str(),
            self.recipient,
            self.amount,
            self.fee,
            self.reference
        );

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The full pinned record of this transaction as it enters a block hash.
    pub(crate) fn canonical_record(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.sender_str(),
            self.recipient,
            self.amount,
            self.fee,
            self.reference,
            self.timestamp.timestamp_millis(),
            self.signature
                .as_ref()
                .map_or(ABSENT_FIELD, DigitalSignature::as_str)
        )
    }

    /// Signs the transaction on behalf of `identity`.
    ///
    /// Fails if the identity's address does not equal the declared sender;
    /// reward transactions have no sender and therefore cannot be signed.
    pub fn sign(&mut self, identity: &Identity) -> Result<(), SignatureError> {
        if self.sender.as_ref() != Some(identity.address()) {
            return Err(SignatureError::SenderMismatch);
        }

        let hash = self.content_hash();
        self.signature = Some(identity.sign(hash.as_bytes()));

        Ok(())
    }

    /// Checks the transaction's signature.
    ///
    /// Reward transactions are valid unconditionally. A missing signature on
    /// a transfer is an error; otherwise the result of verifying the stored
    /// signature against the sender's public key is returned.
    pub fn is_valid(&self) -> Result<bool, SignatureError> {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return Ok(true),
        };

        let signature = match &self.signature {
            Some(signature) => signature,
            None => return Err(SignatureError::MissingSignature),
        };

        let public_key = sender.to_public_key()?;
        let hash = self.content_hash();

        Ok(verify_signature(hash.as_bytes(), signature, &public_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(sender: &Identity, recipient: &Identity, amount: &str) -> Transaction {
        Transaction::new(
            sender.address().clone(),
            recipient.address().clone(),
            amount.parse().unwrap(),
            "0.00000001".parse().unwrap(),
            "test transfer",
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");

        let mut tx = transfer(&sender, &recipient, "1.5");
        tx.sign(&sender).unwrap();

        assert!(tx.signature.is_some());
        assert!(tx.is_valid().unwrap());
    }

    #[test]
    fn test_sign_with_wrong_identity_fails() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");
        let intruder = Identity::new("intruder");

        let mut tx = transfer(&sender, &recipient, "1");
        assert!(matches!(
            tx.sign(&intruder),
            Err(SignatureError::SenderMismatch)
        ));
    }

    #[test]
    fn test_unsigned_transfer_is_an_error() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");

        let tx = transfer(&sender, &recipient, "1");
        assert!(matches!(
            tx.is_valid(),
            Err(SignatureError::MissingSignature)
        ));
    }

    #[test]
    fn test_reward_is_valid_without_signature() {
        let miner = Identity::new("miner");
        let tx = Transaction::reward(miner.address().clone(), Amount::from_coins(3));

        assert!(tx.is_reward());
        assert!(tx.signature.is_none());
        assert!(tx.is_valid().unwrap());
    }

    #[test]
    fn test_rewards_cannot_be_signed() {
        let miner = Identity::new("miner");
        let mut tx = Transaction::reward(miner.address().clone(), Amount::from_coins(3));

        assert!(matches!(tx.sign(&miner), Err(SignatureError::SenderMismatch)));
    }

    #[test]
    fn test_content_hash_ignores_signature_and_timestamp() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");

        let mut a = transfer(&sender, &recipient, "2");
        let b = Transaction {
            timestamp: a.timestamp + chrono::Duration::seconds(30),
            ..a.clone()
        };
        assert_eq!(a.content_hash(), b.content_hash());

        let unsigned_hash = a.content_hash();
        a.sign(&sender).unwrap();
        assert_eq!(a.content_hash(), unsigned_hash);
    }

    #[test]
    fn test_content_hash_covers_every_content_field() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");
        let base = transfer(&sender, &recipient, "2");

        let mut changed_amount = base.clone();
        changed_amount.amount = "2.00000001".parse().unwrap();
        assert_ne!(base.content_hash(), changed_amount.content_hash());

        let mut changed_fee = base.clone();
        changed_fee.fee = Amount::ZERO;
        assert_ne!(base.content_hash(), changed_fee.content_hash());

        let mut changed_reference = base.clone();
        changed_reference.reference = "other".to_string();
        assert_ne!(base.content_hash(), changed_reference.content_hash());
    }

    #[test]
    fn test_tampered_amount_breaks_signature() {
        let sender = Identity::new("sender");
        let recipient = Identity::new("recipient");

        let mut tx = transfer(&sender, &recipient, "1");
        tx.sign(&sender).unwrap();
        assert!(tx.is_valid().unwrap());

        tx.amount = Amount::from_coins(1000);
        assert!(!tx.is_valid().unwrap());
    }
}
