//! Mapping between escrow user ids and NEAR account ids

use std::sync::OnceLock;

use regex::Regex;

use super::network::Network;
use super::result::{Error, Result};

/// Number of user id characters embedded in a NEAR account name
const NEAR_PREFIX_LEN: usize = 8;

fn near_account_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^near-([a-zA-Z0-9]{8})\..*$").expect("static NEAR account pattern")
    })
}

/// Check that a user id can be mapped to a NEAR account.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.len() < NEAR_PREFIX_LEN {
        return Err(Error::validation(format!(
            "User id '{}' must be at least {} characters",
            user_id, NEAR_PREFIX_LEN
        )));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::validation(format!(
            "User id '{}' may only contain letters, digits, '-' and '_'",
            user_id
        )));
    }
    if !user_id[..NEAR_PREFIX_LEN]
        .chars()
        .all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::validation(format!(
            "The first {} characters of user id '{}' must be alphanumeric",
            NEAR_PREFIX_LEN, user_id
        )));
    }
    Ok(())
}

/// `near-<first 8 chars>.<suffix>`
pub fn near_account_id(user_id: &str, network: Network) -> Result<String> {
    validate_user_id(user_id)?;
    Ok(format!(
        "near-{}.{}",
        &user_id[..NEAR_PREFIX_LEN],
        network.near_suffix()
    ))
}

/// Recover the user id prefix encoded in a NEAR account id.
pub fn user_prefix_from_near_account(account_id: &str) -> Option<String> {
    near_account_pattern()
        .captures(account_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_account_uses_first_eight_chars() {
        let account = near_account_id("alice1234567", Network::Testnet).unwrap();
        assert_eq!(account, "near-alice123.testnet");

        let account = near_account_id("alice1234567", Network::Mainnet).unwrap();
        assert_eq!(account, "near-alice123.near");
    }

    #[test]
    fn test_reverse_mapping() {
        assert_eq!(
            user_prefix_from_near_account("near-alice123.testnet"),
            Some("alice123".to_string())
        );
        assert_eq!(user_prefix_from_near_account("alice.testnet"), None);
        assert_eq!(user_prefix_from_near_account("near-short.testnet"), None);
    }

    #[test]
    fn test_rejects_short_or_odd_user_ids() {
        assert!(validate_user_id("bob").is_err());
        assert!(validate_user_id("bob with spaces").is_err());
        assert!(validate_user_id("bo-b12345").is_err());
        assert!(validate_user_id("freelancer_01").is_ok());
    }
}
