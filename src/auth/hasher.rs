use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64, Engine};
use pbkdf2::password_hash::{
    Error as HashError, Output, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use pbkdf2::{pbkdf2_hmac, Algorithm, Params, Pbkdf2};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;
use crate::Result;

const SALT_SIZE: usize = 16;
const OUTPUT_SIZE: usize = 32;
const LEGACY_PREFIX: &str = "$pbkdf2-sha256$";

/// Round count used by existing digests.
pub const DEFAULT_ROUNDS: u32 = 29000;

/// Password hashing capability injected into the auth service.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; `Err` only when the digest can't be read.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool>;
}

/// Salted PBKDF2-HMAC-SHA256.
///
/// New digests use the PHC string format. Digests in the older
/// `$pbkdf2-sha256$<rounds>$<salt>$<checksum>` form, with the adapted base64
/// alphabet (`.` for `+`, no padding), are still accepted by `verify`.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    rounds: u32,
}

impl Pbkdf2Hasher {
    pub fn new(rounds: u32) -> Self {
        Self { rounds: rounds.max(1) }
    }

    fn verify_legacy(plaintext: &str, digest: &LegacyDigest) -> Result<bool> {
        let mut derived = vec![0u8; digest.checksum.len()];
        pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &digest.salt, digest.rounds, &mut derived);

        // Output equality is constant time
        let derived = Output::new(&derived).map_err(hash_error)?;
        let expected = Output::new(&digest.checksum).map_err(hash_error)?;
        Ok(derived == expected)
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt_bytes = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(hash_error)?;

        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_SIZE,
        };

        let digest = Pbkdf2
            .hash_password_customized(
                plaintext.as_bytes(),
                Some(Algorithm::Pbkdf2Sha256.ident()),
                None,
                params,
                &salt,
            )
            .map_err(hash_error)?;

        Ok(digest.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        if let Some(legacy) = LegacyDigest::parse(digest) {
            return Self::verify_legacy(plaintext, &legacy);
        }

        let parsed = PasswordHash::new(digest).map_err(hash_error)?;
        match Pbkdf2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(HashError::Password) => Ok(false),
            Err(e) => Err(hash_error(e)),
        }
    }
}

fn hash_error(err: HashError) -> AppError {
    AppError::InternalError(format!("Password hashing failed: {}", err))
}

struct LegacyDigest {
    rounds: u32,
    salt: Vec<u8>,
    checksum: Vec<u8>,
}

impl LegacyDigest {
    fn parse(digest: &str) -> Option<Self> {
        let rest = digest.strip_prefix(LEGACY_PREFIX)?;
        let mut parts = rest.split('$');

        let rounds = parts.next()?.parse().ok()?;
        let salt = decode_ab64(parts.next()?)?;
        let checksum = decode_ab64(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self { rounds, salt, checksum })
    }
}

fn decode_ab64(value: &str) -> Option<Vec<u8>> {
    BASE64.decode(value.replace('.', "+")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Modular-crypt digest: rounds 1000, password "secret1"
    const LEGACY_DIGEST: &str =
        "$pbkdf2-sha256$1000$MDEyMzQ1Njc4OWFiY2RlZg$b20hQ5gwi4VB5BfWcGk4yXJCAVSnXid2Td6rxjzTfvg";

    #[test]
    fn test_hash_and_verify() {
        let hasher = Pbkdf2Hasher::new(1000);
        let digest = hasher.hash("secret1").unwrap();

        assert!(digest.starts_with("$pbkdf2-sha256$"));
        assert!(digest.contains("i=1000"));
        assert!(!digest.contains("secret1"));
        assert!(hasher.verify("secret1", &digest).unwrap());
        assert!(!hasher.verify("secret2", &digest).unwrap());
        assert!(!hasher.verify("", &digest).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Pbkdf2Hasher::new(1000);
        let a = hasher.hash("secret1").unwrap();
        let b = hasher.hash("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_rounds() {
        assert_eq!(Pbkdf2Hasher::default().rounds, DEFAULT_ROUNDS);
        assert_eq!(Pbkdf2Hasher::new(0).rounds, 1);
    }

    #[test]
    fn test_verify_legacy_digest() {
        let hasher = Pbkdf2Hasher::default();
        assert!(hasher.verify("secret1", LEGACY_DIGEST).unwrap());
        assert!(!hasher.verify("secret", LEGACY_DIGEST).unwrap());
    }

    #[test]
    fn test_malformed_digest_is_an_error() {
        let hasher = Pbkdf2Hasher::new(1000);
        let result = hasher.verify("secret1", "not-a-digest");
        assert!(matches!(result, Err(AppError::InternalError(_))));
    }

    #[test]
    fn test_legacy_parse_rejects_phc() {
        let hasher = Pbkdf2Hasher::new(1000);
        let digest = hasher.hash("x").unwrap();
        assert!(LegacyDigest::parse(&digest).is_none());
    }
}
