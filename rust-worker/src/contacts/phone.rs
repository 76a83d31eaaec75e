//! Phone number normalization.

/// Country code prepended to 10-digit local numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "91";

/// Minimum number of digits for a phone field to be accepted.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Normalize a raw phone field.
///
/// Strips every non-digit character. Returns `None` when fewer than
/// [`MIN_PHONE_DIGITS`] digits remain. A bare 10-digit local number gets
/// [`DEFAULT_COUNTRY_CODE`] prepended; longer numbers are assumed to already
/// carry a country code and are kept as-is.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }

    if digits.len() == MIN_PHONE_DIGITS {
        Some(format!("{}{}", DEFAULT_COUNTRY_CODE, digits))
    } else {
        Some(digits)
    }
}
