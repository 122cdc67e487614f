//! Account identities: key records, addresses and ownership proofs

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use std::fmt;
use std::path::Path;

use crate::egress::EgressDescriptor;
use crate::error::{IdentityError, MinerError};

/// A signing identity loaded from one key record
#[derive(Clone)]
pub struct AccountIdentity {
    id: usize,
    address: String,
    signing_key: SigningKey,
}

impl fmt::Debug for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AccountIdentity {
    pub fn from_signing_key(id: usize, signing_key: SigningKey) -> Self {
        let address = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        Self {
            id,
            address,
            signing_key,
        }
    }

    /// Decode a base58 key record found on `line` of the keys file.
    ///
    /// 64 bytes are read as a Solana keypair (secret followed by public key,
    /// checked for consistency); 32 bytes as a bare secret seed.
    pub fn from_base58(id: usize, line: usize, encoded: &str) -> Result<Self, IdentityError> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|source| IdentityError::InvalidBase58 { line, source })?;

        let signing_key = match bytes.len() {
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|_| IdentityError::InvalidKeypair { line })?
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            len => return Err(IdentityError::InvalidLength { line, len }),
        };

        Ok(Self::from_signing_key(id, signing_key))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Base58 public key, the account's address on the service
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Detached ed25519 signature over `message`
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn sign_base58(&self, message: &[u8]) -> String {
        bs58::encode(self.sign(message).to_bytes()).into_string()
    }
}

/// Parse key records, one per non-empty line.
///
/// Ids are 1-based positions among the non-empty lines; a bad record yields
/// an error for that line without affecting the others.
pub fn parse_identities(text: &str) -> Vec<Result<AccountIdentity, IdentityError>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .enumerate()
        .map(|(index, (line_index, line))| {
            AccountIdentity::from_base58(index + 1, line_index + 1, line)
        })
        .collect()
}

pub fn load_identities(
    path: &Path,
) -> Result<Vec<Result<AccountIdentity, IdentityError>>, MinerError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_identities(&text))
}

/// An identity bound to the egress path its calls will use
#[derive(Debug, Clone)]
pub struct AccountBinding {
    pub identity: AccountIdentity,
    pub egress: Option<EgressDescriptor>,
}

impl AccountBinding {
    pub fn new(identity: AccountIdentity, egress: Option<EgressDescriptor>) -> Self {
        Self { identity, egress }
    }

    pub fn id(&self) -> usize {
        self.identity.id()
    }

    pub fn address(&self) -> &str {
        self.identity.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;
    use rand::rngs::OsRng;

    #[test]
    fn test_keypair_record_roundtrip() {
        let key = SigningKey::generate(&mut OsRng);
        let record = bs58::encode(key.to_keypair_bytes()).into_string();

        let identity = AccountIdentity::from_base58(1, 1, &record).unwrap();
        assert_eq!(
            identity.address(),
            bs58::encode(key.verifying_key().to_bytes()).into_string()
        );
    }

    #[test]
    fn test_seed_record() {
        let key = SigningKey::generate(&mut OsRng);
        let record = bs58::encode(key.to_bytes()).into_string();

        let identity = AccountIdentity::from_base58(3, 5, &record).unwrap();
        assert_eq!(identity.id(), 3);
        assert_eq!(identity.verifying_key(), key.verifying_key());
    }

    #[test]
    fn test_mismatched_keypair_rejected() {
        let a = SigningKey::generate(&mut OsRng);
        let b = SigningKey::generate(&mut OsRng);
        let mut bytes = a.to_keypair_bytes();
        bytes[32..].copy_from_slice(&b.verifying_key().to_bytes());
        let record = bs58::encode(bytes).into_string();

        assert!(matches!(
            AccountIdentity::from_base58(1, 4, &record),
            Err(IdentityError::InvalidKeypair { line: 4 })
        ));
    }

    #[test]
    fn test_signature_verifies() {
        let identity = AccountIdentity::from_signing_key(1, SigningKey::generate(&mut OsRng));
        let message = b"Activate mining session for Exnus Point";

        let encoded = identity.sign_base58(message);
        let bytes: [u8; 64] = bs58::decode(encoded).into_vec().unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&bytes);
        assert!(identity.verifying_key().verify(message, &signature).is_ok());
    }

    #[test]
    fn test_parse_reports_bad_lines_and_keeps_good_ones() {
        let good = bs58::encode(SigningKey::generate(&mut OsRng).to_keypair_bytes()).into_string();
        let text = format!("{good}\n\nnot-base58-0OIl\n  \n{}\n", bs58::encode([1u8; 10]).into_string());

        let parsed = parse_identities(&text);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_ref().unwrap().id(), 1);
        assert!(matches!(parsed[1], Err(IdentityError::InvalidBase58 { line: 3, .. })));
        assert!(matches!(
            parsed[2],
            Err(IdentityError::InvalidLength { line: 5, len: 10 })
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SigningKey::generate(&mut OsRng);
        let secret = bs58::encode(key.to_bytes()).into_string();
        let identity = AccountIdentity::from_signing_key(1, key);
        assert!(!format!("{:?}", identity).contains(&secret));
    }
}
