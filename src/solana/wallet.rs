use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::keypair::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::decode_key_bytes;

/// Something that can authorize transactions.
///
/// `SigningKey` is the in-memory implementation; hardware or remote signers
/// plug in behind the same two calls.
pub trait TransactionSigner: Send + Sync {
    /// Address that pays fees and authorizes transfers
    fn public_address(&self) -> Pubkey;

    /// Sign a serialized message
    fn sign(&self, message: &[u8]) -> Signature;
}

/// Handles transaction signing for a decoded private key
pub struct SigningKey {
    keypair: Keypair,
}

impl SigningKey {
    /// Decode a private key given as base58 or as a JSON byte array
    pub fn decode(input: &str) -> Result<Self> {
        let bytes = decode_key_bytes(input)?;
        let keypair = Keypair::from_bytes(&bytes).map_err(|_| Error::InvalidKey)?;
        Ok(Self { keypair })
    }

    /// Wrap an existing keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl TransactionSigner for SigningKey {
    fn public_address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_address", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

/// Create and sign a transaction in one step.
///
/// The signer is both fee payer and the only required signature.
pub fn sign_transaction(
    signer: &dyn TransactionSigner,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<Transaction> {
    let payer = signer.public_address();
    let message = Message::new_with_blockhash(instructions, Some(&payer), &recent_blockhash);

    let required = message.header.num_required_signatures as usize;
    if required != 1 {
        return Err(Error::InvalidInput(format!(
            "transaction needs {} signatures, only the payer can sign",
            required
        )));
    }

    let mut transaction = Transaction::new_unsigned(message);
    transaction.signatures = vec![signer.sign(&transaction.message_data())];
    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::system_instruction;

    #[test]
    fn test_decode_base58_and_json() {
        let keypair = Keypair::new();
        let base58 = bs58::encode(keypair.to_bytes()).into_string();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();

        assert_eq!(SigningKey::decode(&base58).unwrap().public_address(), keypair.pubkey());
        assert_eq!(SigningKey::decode(&json).unwrap().public_address(), keypair.pubkey());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(SigningKey::decode("definitely-not-a-key"), Err(Error::InvalidKey)));
        assert!(matches!(SigningKey::decode("[0, 1, 2]"), Err(Error::InvalidKey)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = Keypair::new();
        let secret = bs58::encode(keypair.to_bytes()).into_string();
        let key = SigningKey::from_keypair(keypair);
        assert!(!format!("{:?}", key).contains(&secret));
    }

    #[test]
    fn test_sign_transaction_verifies() {
        let key = SigningKey::from_keypair(Keypair::new());
        let recipient = Pubkey::new_unique();
        let instruction = system_instruction::transfer(&key.public_address(), &recipient, 42);

        let transaction = sign_transaction(&key, &[instruction], Hash::new_unique()).unwrap();
        assert_eq!(transaction.signatures.len(), 1);
        assert!(transaction.verify().is_ok());
        assert_eq!(transaction.message.account_keys[0], key.public_address());
    }

    #[test]
    fn test_sign_transaction_rejects_foreign_signers() {
        let key = SigningKey::from_keypair(Keypair::new());
        let other = Pubkey::new_unique();
        let instruction = system_instruction::transfer(&other, &key.public_address(), 1);

        assert!(matches!(
            sign_transaction(&key, &[instruction], Hash::new_unique()),
            Err(Error::InvalidInput(_))
        ));
    }
}
