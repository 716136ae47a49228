use super::*;

fn account_with_password(password: &str) -> AccountRow {
    let salt = generate_salt();
    AccountRow {
        id: Uuid::nil(),
        password: Some(hash_password(password, &salt)),
        password_salt: Some(salt),
        status: STATUS_ACTIVE.into(),
    }
}

// =============================================================================
// normalize_email
// =============================================================================

#[test]
fn normalize_email_lowercases_and_trims() {
    assert_eq!(normalize_email("  Alice@Example.COM "), Some("alice@example.com".into()));
}

#[test]
fn normalize_email_rejects_malformed() {
    for raw in ["", "alice", "@example.com", "alice@", "a@b@c"] {
        assert_eq!(normalize_email(raw), None, "expected rejection for {raw:?}");
    }
}

// =============================================================================
// hashing
// =============================================================================

#[test]
fn hash_password_is_deterministic_per_salt() {
    assert_eq!(hash_password("pw", "salt"), hash_password("pw", "salt"));
    assert_ne!(hash_password("pw", "salt"), hash_password("pw", "pepper"));
    assert_eq!(hash_password("pw", "salt").len(), 64);
}

#[test]
fn generate_salt_is_32_hex_chars() {
    let salt = generate_salt();
    assert_eq!(salt.len(), 32);
    assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn verify_password_accepts_correct_password() {
    assert!(verify_password(&account_with_password("hunter2"), "hunter2"));
}

#[test]
fn verify_password_rejects_wrong_password() {
    assert!(!verify_password(&account_with_password("hunter2"), "hunter3"));
}

#[test]
fn verify_password_rejects_account_without_password() {
    let mut account = account_with_password("hunter2");
    account.password = None;
    assert!(!verify_password(&account, "hunter2"));
}

#[test]
fn constant_time_eq_checks_length() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"abcd"));
}

#[test]
fn account_error_codes() {
    assert_eq!(AccountError::NotFound.error_code(), "account_not_found");
    assert_eq!(AccountError::Banned.error_code(), "account_banned");
    assert_eq!(AccountError::PasswordMismatch.error_code(), "email_or_password_mismatch");
}
