//! Webhook signature verification.
//!
//! Mux signs every webhook with a `mux-signature` header of the form
//! `t=<unix seconds>,v1=<hex hmac>`. The HMAC-SHA256 is computed over
//! `"<t>." + body` with the endpoint's signing secret. Verification always
//! runs over the raw request bytes as received.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{MuxError, MuxResult, SignatureError};

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the signature.
pub const SIGNATURE_HEADER: &str = "mux-signature";

/// Default allowed distance between the signed timestamp and now.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Verifies webhook signatures with a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    /// MAC already keyed with the signing secret
    keyed: HmacSha256,
    tolerance: Duration,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier. The secret is used byte for byte as the HMAC key;
    /// an empty or blank secret is a configuration error.
    pub fn new(secret: impl AsRef<str>) -> MuxResult<Self> {
        let secret = secret.as_ref();
        if secret.trim().is_empty() {
            return Err(MuxError::configuration("Missing MUX_WEBHOOK_SECRET"));
        }

        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| MuxError::configuration(format!("Invalid signing secret: {}", e)))?;

        Ok(Self {
            keyed,
            tolerance: Duration::from_secs(DEFAULT_TOLERANCE_SECS),
        })
    }

    /// Override the timestamp tolerance.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verify `body` against the header value, using the current time.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(body, header, Utc::now().timestamp())
    }

    /// Verify `body` against the header value at a given unix time.
    pub fn verify_at(
        &self,
        body: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = match header.map(str::trim) {
            Some(h) if !h.is_empty() => h,
            _ => return Err(SignatureError::Missing),
        };

        let parsed = ParsedHeader::parse(header)?;

        let timestamp: i64 = parsed
            .timestamp
            .parse()
            .map_err(|_| SignatureError::Malformed("timestamp is not an integer".to_string()))?;

        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::Expired { timestamp, now });
        }

        let mac = self.mac_for(parsed.timestamp, body);

        let matched = parsed.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produce a header value for `body` signed at `timestamp`.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> String {
        let ts = timestamp.to_string();
        let digest = self.mac_for(&ts, body).finalize().into_bytes();
        format!("t={},v1={}", ts, hex::encode(digest))
    }

    fn mac_for(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

/// `t=...,v1=...` header split into its parts.
struct ParsedHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

impl<'a> ParsedHeader<'a> {
    fn parse(header: &'a str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = Some(value.trim()),
                "v1" => signatures.push(value.trim()),
                _ => {}
            }
        }

        let timestamp = timestamp
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?;

        if signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}
