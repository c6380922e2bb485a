use super::crypto::{Address, DigitalSignature, Keypair};

/// A named ledger participant holding an asymmetric keypair.
///
/// The public key doubles as the participant's address and is the only
/// externally visible handle; the signing key stays inside the owned
/// [`Keypair`]. Identities are created once at registration and never
/// change afterwards.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
    keypair: Keypair,
}

impl Identity {
    /// Registers a new participant under `name` with a freshly generated
    /// keypair. Key generation cannot fail.
    pub fn new(name: impl Into<String>) -> Self {
        Identity {
            name: name.into(),
            keypair: Keypair::generate(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The participant's address (base58 public key).
    pub fn address(&self) -> &Address {
        self.keypair.address()
    }

    /// The secret key in base58 form, for display panels only.
    pub fn private_key(&self) -> String {
        self.keypair.secret_key_b58()
    }

    /// Signs an arbitrary message on behalf of this participant.
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        self.keypair.sign(message)
    }
}
