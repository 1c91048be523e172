use rand::Rng;
use time::{Duration, OffsetDateTime};

use crate::auth::password;
use crate::error::ApiError;

/// Which of the two independent PIN workflows a challenge belongs to. Each
/// channel keeps its own hash/expiry pair on the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChannel {
    Verification,
    Reset,
}

/// A freshly generated challenge. The plaintext exists only long enough to be
/// emailed; everything persisted is the hash.
pub struct IssuedPin {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

fn generate() -> String {
    // Uniform over the 6-digit space; uniqueness across users is not needed
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

pub fn issue(ttl_seconds: i64) -> anyhow::Result<IssuedPin> {
    let plaintext = generate();
    let hash = password::hash_secret(&plaintext)?;
    let expires_at = OffsetDateTime::now_utc() + Duration::seconds(ttl_seconds);
    Ok(IssuedPin {
        plaintext,
        hash,
        expires_at,
    })
}

/// Decide whether a submitted PIN is accepted against the stored challenge.
///
/// Expiry is checked before the hash comparison so an expired-but-correct PIN
/// is still rejected. A record with no pending challenge (hash or expiry
/// absent) fails with `InvalidPin` rather than erroring.
pub fn check(
    pin: &str,
    stored_hash: Option<&str>,
    expires_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    match expires_at {
        Some(expiry) if now > expiry => return Err(ApiError::PinExpired),
        Some(_) => {}
        None => return Err(ApiError::InvalidPin),
    }
    let hash = stored_hash.ok_or(ApiError::InvalidPin)?;
    if password::verify_secret(pin, hash)? {
        Ok(())
    } else {
        Err(ApiError::InvalidPin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_pin_is_six_digits() {
        let issued = issue(120).expect("issue should succeed");
        assert_eq!(issued.plaintext.len(), 6);
        assert!(issued.plaintext.chars().all(|c| c.is_ascii_digit()));
        let n: u32 = issued.plaintext.parse().unwrap();
        assert!((100_000..1_000_000).contains(&n));
    }

    #[test]
    fn issued_pin_expires_after_ttl() {
        let before = OffsetDateTime::now_utc();
        let issued = issue(120).expect("issue should succeed");
        let after = OffsetDateTime::now_utc();
        assert!(issued.expires_at >= before + Duration::seconds(120));
        assert!(issued.expires_at <= after + Duration::seconds(120));
    }

    #[test]
    fn correct_pin_before_expiry_is_accepted() {
        let issued = issue(120).expect("issue should succeed");
        let now = OffsetDateTime::now_utc();
        check(
            &issued.plaintext,
            Some(issued.hash.as_str()),
            Some(issued.expires_at),
            now,
        )
        .expect("pin should be accepted");
    }

    #[test]
    fn wrong_pin_is_rejected() {
        let issued = issue(120).expect("issue should succeed");
        let wrong = if issued.plaintext == "100000" {
            "100001"
        } else {
            "100000"
        };
        let err = check(wrong, Some(issued.hash.as_str()), Some(issued.expires_at), OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidPin));
    }

    #[test]
    fn expired_but_correct_pin_is_rejected() {
        let issued = issue(120).expect("issue should succeed");
        let later = issued.expires_at + Duration::seconds(1);
        let err = check(
            &issued.plaintext,
            Some(issued.hash.as_str()),
            Some(issued.expires_at),
            later,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::PinExpired));
    }

    #[test]
    fn absent_challenge_is_rejected_not_an_error() {
        // A consumed or never-issued PIN leaves both fields null.
        let err = check("123456", None, None, OffsetDateTime::now_utc()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidPin));
    }

    #[test]
    fn hash_without_expiry_is_rejected() {
        let issued = issue(120).expect("issue should succeed");
        let err = check(
            &issued.plaintext,
            Some(issued.hash.as_str()),
            None,
            OffsetDateTime::now_utc(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidPin));
    }
}
