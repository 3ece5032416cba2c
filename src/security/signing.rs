//! Timed, signed JSON payloads exchanged with the SC server.
//!
//! Tokens are laid out as `payload.timestamp.signature`, matching the
//! itsdangerous `TimedSerializer` the server uses:
//! - `payload` is compact JSON;
//! - `timestamp` is the URL-safe base64 (no padding) of the big-endian Unix
//!   time with leading zero bytes stripped;
//! - `signature` is the URL-safe base64 (no padding) of
//!   HMAC-SHA1(`SHA1(salt || "signer" || secret)`, `payload.timestamp`).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha1::{Digest, Sha1};
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

const SEPARATOR: char = '.';
const DEFAULT_SALT: &[u8] = b"itsdangerous";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("signature does not match")]
    BadSignature,
    #[error("signature age {age}s exceeds {max_age}s")]
    Expired { age: i64, max_age: u64 },
    #[error("cannot sign payload: {0}")]
    Encode(String),
}

/// Signs and verifies timestamped JSON with a shared secret.
#[derive(Clone)]
pub struct TimedSerializer {
    key: [u8; 20],
}

impl std::fmt::Debug for TimedSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedSerializer").field("key", &"<redacted>").finish()
    }
}

impl TimedSerializer {
    pub fn new(secret: &SecretString) -> Self {
        Self::with_salt(secret, DEFAULT_SALT)
    }

    pub fn with_salt(secret: &SecretString, salt: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(salt);
        hasher.update(b"signer");
        hasher.update(secret.expose_secret().as_bytes());
        Self { key: hasher.finalize().into() }
    }

    /// Sign `value` with the current time.
    pub fn dumps(&self, value: &Value) -> Result<String, SignatureError> {
        self.dumps_at(value, chrono::Utc::now().timestamp())
    }

    pub fn dumps_at(&self, value: &Value, timestamp: i64) -> Result<String, SignatureError> {
        let payload =
            serde_json::to_string(value).map_err(|e| SignatureError::Encode(e.to_string()))?;
        let unsigned = format!("{}{}{}", payload, SEPARATOR, encode_timestamp(timestamp));
        let signature = URL_SAFE_NO_PAD.encode(self.mac(unsigned.as_bytes())?.finalize().into_bytes());
        Ok(format!("{}{}{}", unsigned, SEPARATOR, signature))
    }

    /// Verify a token and return its JSON payload if it is at most `max_age` seconds old.
    pub fn loads(&self, token: &str, max_age: u64) -> Result<Value, SignatureError> {
        self.loads_at(token, max_age, chrono::Utc::now().timestamp())
    }

    pub fn loads_at(&self, token: &str, max_age: u64, now: i64) -> Result<Value, SignatureError> {
        let token = token.trim();
        let (unsigned, signature) = token
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| SignatureError::Malformed("no separator found".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::BadSignature)?;
        self.mac(unsigned.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| SignatureError::BadSignature)?;

        let (payload, timestamp) = unsigned
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| SignatureError::Malformed("timestamp missing".to_string()))?;
        let timestamp = decode_timestamp(timestamp)?;

        let age = now - timestamp;
        if age < 0 || age as u64 > max_age {
            return Err(SignatureError::Expired { age, max_age });
        }

        serde_json::from_str(payload).map_err(|e| SignatureError::Malformed(e.to_string()))
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha1, SignatureError> {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(&self.key)
            .map_err(|e| SignatureError::Encode(e.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}

fn encode_timestamp(timestamp: i64) -> String {
    let bytes = (timestamp.max(0) as u64).to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    URL_SAFE_NO_PAD.encode(&bytes[first..])
}

fn decode_timestamp(encoded: &str) -> Result<i64, SignatureError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| SignatureError::Malformed("timestamp is not base64".to_string()))?;
    if bytes.len() > 8 {
        return Err(SignatureError::Malformed("timestamp too long".to_string()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(buf) as i64)
}
