use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Kenyan MSISDN in international format without a leading `+`,
/// e.g. `254712345678`. The only form the gateway accepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Msisdn(String);

impl Msisdn {
    /// Normalizes the common local spellings into international format.
    ///
    /// Accepted: `0712345678`, `712345678`, `254712345678`, `+254712345678`.
    /// Anything else is a validation error; no gateway call is attempted
    /// with an unnormalizable number.
    pub fn normalize(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidPhone(raw.to_string()));
        }

        let normalized = if digits.len() == 12 && digits.starts_with("254") {
            digits.to_string()
        } else if digits.len() == 10 && digits.starts_with('0') {
            format!("254{}", &digits[1..])
        } else if digits.len() == 9 && (digits.starts_with('7') || digits.starts_with('1')) {
            format!("254{digits}")
        } else {
            return Err(Error::InvalidPhone(raw.to_string()));
        };

        Ok(Msisdn(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
