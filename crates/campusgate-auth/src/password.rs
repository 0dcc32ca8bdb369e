//! Institution-admin password hashing and verification (Argon2id).

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use campusgate_core::error::{CampusError, CampusResult};

fn peppered(password: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{password}").into_bytes(),
        None => password.as_bytes().to_vec(),
    }
}

/// Hash a password into a PHC string for the credential collection.
pub fn hash_password(password: &str, pepper: Option<&str>) -> CampusResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(&peppered(password, pepper), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CampusError::Internal(format!("hash error: {e}")))
}

/// Verify a plaintext password against a stored PHC string.
///
/// A malformed stored hash is a verification failure, not an error:
/// the credential row is unusable either way.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> bool {
    let Ok(parsed) = argon2::PasswordHash::new(hash) else {
        tracing::warn!("stored admin credential has a malformed hash");
        return false;
    };
    Argon2::default()
        .verify_password(&peppered(password, pepper), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hash = hash_password("hunter2", None).unwrap();
        assert!(verify_password("hunter2", &hash, None));
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hash = hash_password("hunter2", None).unwrap();
        assert!(!verify_password("wrong", &hash, None));
    }

    #[test]
    fn pepper_is_applied() {
        let hash = hash_password("hunter2", Some("pepper!")).unwrap();
        assert!(verify_password("hunter2", &hash, Some("pepper!")));
        assert!(!verify_password("hunter2", &hash, None));
    }

    #[test]
    fn malformed_hash_does_not_verify() {
        assert!(!verify_password("pw", "not-a-hash", None));
    }
}
