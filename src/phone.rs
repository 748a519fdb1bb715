//! Phone Number Normalization
//!
//! Canonicalizes subscriber numbers into the international digits-only form
//! the payment gateway expects (`2547XXXXXXXX` for Kenya). Normalization is
//! best-effort by design: there is no error path, the gateway is the final
//! validator of whether a number can receive an STK push.

/// Normalizes raw phone input against a configured dialing prefix.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    /// Strip everything that is not a digit, then fix the prefix:
    /// - trunk form `07XXXXXXXX`: drop the `0`, prepend the country code
    /// - bare mobile form `7XXXXXXXX`: prepend the country code
    /// - already international `2547XXXXXXXX`: pass through
    /// - anything else: prepend the country code and let the gateway judge
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        if let Some(rest) = cleaned.strip_prefix('0') {
            format!("{}{}", self.country_code, rest)
        } else if cleaned.starts_with('7') {
            format!("{}{}", self.country_code, cleaned)
        } else if cleaned.starts_with(&self.country_code) {
            cleaned
        } else {
            format!("{}{}", self.country_code, cleaned)
        }
    }
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new("254")
    }
}
