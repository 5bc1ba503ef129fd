//! Participant identities, session codes and entry validation.

use rand::Rng;

use crate::error::SessionError;

/// Stable participant identity, unique per session by expectation.
pub type ParticipantId = String;

/// Length of a participant identity.
pub const PARTICIPANT_ID_LEN: usize = 6;

/// Length of a session code.
pub const SESSION_CODE_LEN: usize = 4;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Session codes are compared uppercased, so only uppercase is generated.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_string<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Generate a 6-character alphanumeric participant identity.
///
/// Uniqueness is expected, not guaranteed.
pub fn generate_participant_id<R: Rng + ?Sized>(rng: &mut R) -> ParticipantId {
    random_string(rng, ID_ALPHABET, PARTICIPANT_ID_LEN)
}

/// Generate a 4-character session code.
pub fn generate_session_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_string(rng, CODE_ALPHABET, SESSION_CODE_LEN)
}

/// Normalize a user-entered session code: trimmed, case-insensitive,
/// exactly [`SESSION_CODE_LEN`] ASCII alphanumerics.
pub fn normalize_session_code(input: &str) -> Result<String, SessionError> {
    let code = input.trim().to_ascii_uppercase();
    let valid = code.len() == SESSION_CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric());
    if valid {
        Ok(code)
    } else {
        Err(SessionError::InvalidSessionCode(input.to_string()))
    }
}

/// Trim a display name, rejecting an empty one.
pub fn validate_name(input: &str) -> Result<String, SessionError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(SessionError::EmptyName);
    }
    Ok(name.to_string())
}

/// Rendezvous identity a host listens under for `code`.
pub fn host_identity(code: &str) -> String {
    format!("{code}-host")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_generated_identities_have_expected_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let id = generate_participant_id(&mut rng);
        assert_eq!(id.len(), PARTICIPANT_ID_LEN);
        assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));

        let code = generate_session_code(&mut rng);
        assert_eq!(code.len(), SESSION_CODE_LEN);
        assert_eq!(normalize_session_code(&code), Ok(code.clone()));
    }

    #[test]
    fn test_session_code_is_case_insensitive() {
        assert_eq!(normalize_session_code(" ab12 "), Ok("AB12".to_string()));
    }

    #[test]
    fn test_session_code_rejects_malformed_input() {
        for bad in ["", "AB1", "AB123", "AB-1", "ÄB12"] {
            assert_eq!(
                normalize_session_code(bad),
                Err(SessionError::InvalidSessionCode(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name("  Ada "), Ok("Ada".to_string()));
        assert_eq!(validate_name("   "), Err(SessionError::EmptyName));
    }

    #[test]
    fn test_host_identity() {
        assert_eq!(host_identity("AB12"), "AB12-host");
    }
}
