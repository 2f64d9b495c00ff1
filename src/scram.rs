//! SCRAM password hashing for role credential rotation (4.B `change_passwords`).
//!
//! Produces the `SCRAM-SHA-X$iters:salt$storedKey:serverKey` form Postgres
//! stores in `pg_authid.rolpassword`, per RFC 5802's `SaltedPassword` /
//! `ClientKey` / `StoredKey` / `ServerKey` derivation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

pub const MIN_ITERATIONS: u32 = 4096;
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScramAlgorithm {
    #[serde(rename = "scram-sha-1")]
    Sha1,
    #[serde(rename = "scram-sha-256")]
    #[default]
    Sha256,
}

impl ScramAlgorithm {
    fn tag(self) -> &'static str {
        match self {
            ScramAlgorithm::Sha1 => "SCRAM-SHA-1",
            ScramAlgorithm::Sha256 => "SCRAM-SHA-256",
        }
    }
}

/// Hash `password` with a freshly generated 16-byte salt and `iterations`
/// (clamped up to [`MIN_ITERATIONS`]), returning the stored-password string.
pub fn hash_password(
    algorithm: ScramAlgorithm,
    password: &str,
    iterations: u32,
) -> EngineResult<String> {
    let iterations = iterations.max(MIN_ITERATIONS);
    if password.is_empty() {
        return Err(EngineError::InvalidInput(
            "cannot hash an empty password".to_string(),
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let (stored_key, server_key) = match algorithm {
        ScramAlgorithm::Sha1 => derive::<Sha1>(password.as_bytes(), &salt, iterations),
        ScramAlgorithm::Sha256 => derive::<Sha256>(password.as_bytes(), &salt, iterations),
    };

    Ok(format!(
        "{}${}:{}${}:{}",
        algorithm.tag(),
        iterations,
        BASE64.encode(salt),
        BASE64.encode(stored_key),
        BASE64.encode(server_key),
    ))
}

fn derive<D>(password: &[u8], salt: &[u8], iterations: u32) -> (Vec<u8>, Vec<u8>)
where
    D: Digest + hmac::digest::core_api::BlockSizeUser + Clone + Sync,
    Hmac<D>: Mac,
{
    let mut salted_password = vec![0u8; <D as Digest>::output_size()];
    pbkdf2::pbkdf2_hmac::<D>(password, salt, iterations, &mut salted_password);

    let client_key = hmac_digest::<D>(&salted_password, b"Client Key");
    let stored_key = {
        let mut hasher = D::new();
        hasher.update(&client_key);
        hasher.finalize().to_vec()
    };
    let server_key = hmac_digest::<D>(&salted_password, b"Server Key");

    (stored_key, server_key)
}

fn hmac_digest<D>(key: &[u8], data: &[u8]) -> Vec<u8>
where
    D: Digest + hmac::digest::core_api::BlockSizeUser,
    Hmac<D>: Mac,
{
    let mut mac = <Hmac<D> as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_have_expected_shape() {
        let hash = hash_password(ScramAlgorithm::Sha256, "correct horse battery staple", 4096)
            .unwrap();
        let parts: Vec<&str> = hash.splitn(2, '$').collect();
        assert_eq!(parts[0], "SCRAM-SHA-256");
        let rest: Vec<&str> = parts[1].splitn(2, '$').collect();
        let iter_and_salt: Vec<&str> = rest[0].splitn(2, ':').collect();
        assert_eq!(iter_and_salt[0], "4096");
        assert!(BASE64.decode(iter_and_salt[1]).unwrap().len() == 16);
        let keys: Vec<&str> = rest[1].splitn(2, ':').collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn iterations_are_clamped_to_the_minimum() {
        let hash = hash_password(ScramAlgorithm::Sha256, "pw", 10).unwrap();
        assert!(hash.contains(&format!("${}:", MIN_ITERATIONS)));
    }

    #[test]
    fn two_hashes_of_the_same_password_differ() {
        let a = hash_password(ScramAlgorithm::Sha256, "pw", 4096).unwrap();
        let b = hash_password(ScramAlgorithm::Sha256, "pw", 4096).unwrap();
        assert_ne!(a, b, "salts must be freshly generated");
    }

    #[test]
    fn rejects_empty_password() {
        assert!(hash_password(ScramAlgorithm::Sha256, "", 4096).is_err());
    }

    #[test]
    fn sha1_variant_tags_correctly() {
        let hash = hash_password(ScramAlgorithm::Sha1, "pw", 4096).unwrap();
        assert!(hash.starts_with("SCRAM-SHA-1$"));
    }
}
