//! Service-account authentication for the spreadsheet service.
//!
//! The key file is exchanged for a short-lived bearer token by signing an
//! RS256 assertion; the token is cached and refreshed inside its expiry
//! margin.

use std::path::Path;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::config::TOKEN_EXPIRY_MARGIN;
use crate::error::SheetError;

const OAUTH_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

pub(crate) const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the signed assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Parsed service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Load the key file named by the `GCP_JSON` configuration entry.
    pub fn load(path: &Path) -> Result<Self, SheetError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SheetError::Auth(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SheetError::Auth(format!("malformed credentials file: {e}")))
    }

    /// Sign the RS256 assertion exchanged for a bearer token.
    pub(crate) fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, SheetError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: OAUTH_SCOPES,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| SheetError::Auth(format!("invalid private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SheetError::Auth(format!("cannot sign assertion: {e}")))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Short-lived bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: String, expires_in_seconds: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: created_at + chrono::Duration::seconds(expires_in_seconds),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// True while the token has more than the refresh margin left.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN.as_secs() as i64);
        now + margin < self.expires_at
    }
}
