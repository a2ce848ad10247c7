//! Deterministic tenant naming.
//!
//! Bucket, user and policy names are pure functions of the normalized email.
//! Nothing is stored: deprovisioning recomputes the same names from the same
//! address.

use crate::models::account::TenantNames;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Hex characters of the SHA-256 digest appended to every bucket name.
const HASH_SUFFIX_LEN: usize = 16;

/// Longest sanitized prefix kept, so `prefix-hash` stays within 63 characters.
const MAX_PREFIX_LEN: usize = 63 - 1 - HASH_SUFFIX_LEN;

/// Prefix used when nothing in the address survives sanitizing.
const EMPTY_PREFIX: &str = "u";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("email is required")]
    Empty,
    #[error("email `{0}` is malformed")]
    Malformed(String),
}

/// Lowercase and trim an address. Every derivation starts here.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and check the address has the shape `local@domain`.
pub fn parse_email(raw: &str) -> Result<String, EmailError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(EmailError::Empty);
    }
    let well_formed = !email.chars().any(|c| c.is_whitespace() || c.is_control())
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };
    if well_formed {
        Ok(email)
    } else {
        Err(EmailError::Malformed(email))
    }
}

/// Map an email address to its bucket name: `sanitized-hexhash`.
///
/// The sanitized part keeps only `[0-9a-z]` from the whole normalized
/// address. The hash suffix separates addresses that sanitize identically
/// (`a.b@x.io` and `ab@x.io`). Total over any input.
pub fn derive_bucket_name(email: &str) -> String {
    let email = normalize_email(email);
    let digest = Sha256::digest(email.as_bytes());
    let hash = hex::encode(digest);

    let mut prefix: String = email
        .chars()
        .filter(|c| matches!(c, '0'..='9' | 'a'..='z'))
        .take(MAX_PREFIX_LEN)
        .collect();
    if prefix.is_empty() {
        prefix.push_str(EMPTY_PREFIX);
    }

    format!("{}-{}", prefix, &hash[..HASH_SUFFIX_LEN])
}

/// Name of the canned policy attached to the tenant user.
pub fn derive_policy_name(bucket_name: &str) -> String {
    format!("user-{}-policy", bucket_name)
}

impl TenantNames {
    /// Derive every name for `email`. The access key is the normalized email.
    pub fn derive(email: &str) -> Self {
        let email = normalize_email(email);
        let bucket_name = derive_bucket_name(&email);
        let policy_name = derive_policy_name(&bucket_name);
        Self {
            access_key_id: email.clone(),
            email,
            bucket_name,
            policy_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn case_and_whitespace_do_not_change_the_name() {
        let a = derive_bucket_name("Alice.Smith@Example.com ");
        let b = derive_bucket_name("alice.smith@example.com");
        assert_eq!(a, b);
        assert!(a.starts_with("alicesmithexamplecom-"));
        assert_eq!(a, derive_bucket_name("  ALICE.SMITH@EXAMPLE.COM"));
    }

    #[test]
    fn shared_sanitized_prefix_is_disambiguated_by_hash() {
        let mut seen = HashSet::new();
        for i in 0..5000 {
            // every variant sanitizes to `johndoeexamplecom`
            let dots = ".".repeat(i % 7);
            let plus = "+".repeat(i / 7);
            let email = format!("john{}doe{}@example.com", dots, plus);
            assert!(seen.insert(derive_bucket_name(&email)), "collision for {}", email);
        }
        assert_eq!(seen.len(), 5000);
    }

    #[test]
    fn bucket_names_are_storage_safe() {
        for email in [
            "bob@example.com",
            "",
            "@",
            "+-_@!!",
            "very.long.name.with.many.parts.and.more.and.more.and.more@some.really.long.domain.example.org",
        ] {
            let name = derive_bucket_name(email);
            assert!(name.len() >= 3 && name.len() <= 63, "{}", name);
            assert!(
                name.chars()
                    .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-')),
                "{}",
                name
            );
            assert!(!name.starts_with('-') && !name.ends_with('-'), "{}", name);
        }
    }

    #[test]
    fn names_rederive_identically() {
        let first = TenantNames::derive(" Carol@Example.org");
        let second = TenantNames::derive("carol@example.org");
        assert_eq!(first, second);
        assert_eq!(first.access_key_id, "carol@example.org");
        assert_eq!(
            first.policy_name,
            format!("user-{}-policy", first.bucket_name)
        );
    }

    #[test]
    fn parse_email_rejects_empty_and_malformed() {
        assert_eq!(parse_email("   "), Err(EmailError::Empty));
        assert!(matches!(parse_email("nobody"), Err(EmailError::Malformed(_))));
        assert!(matches!(parse_email("@example.com"), Err(EmailError::Malformed(_))));
        assert!(matches!(parse_email("a@"), Err(EmailError::Malformed(_))));
        assert!(matches!(parse_email("a@b@c"), Err(EmailError::Malformed(_))));
        assert!(matches!(parse_email("a b@c.d"), Err(EmailError::Malformed(_))));
        assert_eq!(parse_email(" A@B.C ").unwrap(), "a@b.c");
    }
}
