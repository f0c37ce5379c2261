use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their real expiry so a
/// request started just before the deadline does not arrive with a dead token.
const EXPIRY_MARGIN_SECONDS: i64 = 10;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// A credential is usable when it has an access token that has not expired.
    /// No expiry means the token never expires.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECONDS) > now,
            None => true,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Get minutes remaining until expiry (for logging)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expiry
            .map(|expiry| (expiry - Utc::now()).num_minutes().max(0))
    }
}

// Tokens never show up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &str| if token.is_empty() { "[EMPTY]" } else { "[REDACTED]" };
        f.debug_struct("Credential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expiry", &self.expiry)
            .finish()
    }
}
