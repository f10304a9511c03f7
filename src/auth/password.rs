//! Password hashing

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier as _, Version};
use rand::Rng;

/// Hash/verify capability for staff passwords
pub trait PasswordHasher: Send + Sync {
    /// Produce a PHC-formatted hash
    fn hash(&self, plain: &str) -> Result<String, String>;

    /// Check `plain` against a stored hash; unparseable hashes never verify
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

/// Argon2id hasher
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hasher with explicit memory (KiB) and iteration costs
    pub fn with_cost(m_cost_kib: u32, t_cost: u32) -> Result<Self, String> {
        let params = Params::new(m_cost_kib, t_cost, 1, None).map_err(|e| e.to_string())?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, String> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| e.to_string())?;

        let phc = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| e.to_string())?
            .to_string();
        Ok(phc)
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
