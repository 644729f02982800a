//! Input checks applied before anything is sent to the CRM

use crate::error::{NotifyError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Longest SMS body accepted, in UTF-16 code units (the unit the CRM counts).
pub const MAX_BODY_LEN: usize = 1600;

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    // ASCII digits only; `\d` would also accept other Unicode digits
    PHONE.get_or_init(|| Regex::new(r"^\+?[1-9][0-9]{1,14}$").expect("phone pattern compiles"))
}

/// Accept E.164-like numbers: optional `+`, no leading zero, 2 to 15 digits.
pub fn validate_phone(phone: &str) -> Result<()> {
    if phone_pattern().is_match(phone) {
        Ok(())
    } else {
        Err(NotifyError::validation(
            "phone",
            format!("'{}' is not an E.164 phone number", phone),
        ))
    }
}

pub fn validate_body(body: &str) -> Result<()> {
    let len = body.encode_utf16().count();
    if len == 0 {
        return Err(NotifyError::validation("body", "message body is empty"));
    }
    if len > MAX_BODY_LEN {
        return Err(NotifyError::validation(
            "body",
            format!("message body is {} characters, limit is {}", len, MAX_BODY_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_common_numbers() {
        for phone in ["+19195550100", "19195550100", "+442071838750", "12"] {
            assert!(validate_phone(phone).is_ok(), "{} should be valid", phone);
        }
    }

    #[test]
    fn rejects_malformed_numbers() {
        for phone in [
            "",
            "+",
            "+0123456789",
            "1",
            "919-555-0100",
            "(919) 5550100",
            "+1234567890123456",
            "+1９１９５５５０１００",
        ] {
            let err = validate_phone(phone).unwrap_err();
            assert!(err.is_validation(), "{} should be rejected", phone);
        }
    }

    #[test]
    fn body_bounds_are_inclusive() {
        assert!(validate_body("a").is_ok());
        assert!(validate_body(&"a".repeat(MAX_BODY_LEN)).is_ok());
        assert!(validate_body("").unwrap_err().is_validation());
        assert!(validate_body(&"a".repeat(MAX_BODY_LEN + 1))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn emoji_count_as_two_units() {
        let body = "🚨".repeat(MAX_BODY_LEN / 2);
        assert!(validate_body(&body).is_ok());
        let too_long = format!("{}a", body);
        assert!(validate_body(&too_long).is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_e164_numbers_pass(first in 1u8..=9, rest in "[0-9]{1,14}", plus in any::<bool>()) {
            let phone = format!("{}{}{}", if plus { "+" } else { "" }, first, rest);
            prop_assert!(validate_phone(&phone).is_ok());
        }

        #[test]
        fn prop_letters_are_rejected(prefix in "[0-9]{0,5}", junk in "[a-zA-Z -]{1,5}", suffix in "[0-9]{0,5}") {
            let phone = format!("1{}{}{}", prefix, junk, suffix);
            prop_assert!(validate_phone(&phone).is_err());
        }

        #[test]
        fn prop_overlong_bodies_rejected(extra in 1usize..500) {
            let body = "x".repeat(MAX_BODY_LEN + extra);
            prop_assert!(validate_body(&body).is_err());
        }
    }
}
