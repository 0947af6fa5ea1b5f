//! Presigned object URLs.
//!
//! `{base}/{key}?method=PUT&expires=1700000000&signature=ab12...` where the
//! signature is HMAC-SHA256 over `method\nkey\nexpires\ncontent_type`, hex
//! encoded. GET URLs sign an empty content type.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::StorageError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Put,
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Put => "PUT",
            Method::Get => "GET",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUT" => Ok(Method::Put),
            "GET" => Ok(Method::Get),
            other => Err(StorageError::Presign(format!("unsupported method {other}"))),
        }
    }
}

#[derive(Clone)]
pub struct Presigner {
    secret: Vec<u8>,
    base_url: String,
}

impl fmt::Debug for Presigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Presigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Presigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, method: Method, key: &str, expires: i64, content_type: &str) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::Presign(e.to_string()))?;
        mac.update(format!("{method}\n{key}\n{expires}\n{content_type}").as_bytes());
        Ok(mac)
    }

    pub fn signature(&self, method: Method, key: &str, expires: i64, content_type: &str) -> Result<String, StorageError> {
        let mac = self.mac(method, key, expires, content_type)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn url(
        &self,
        method: Method,
        key: &str,
        content_type: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;
        let expires = (now + ttl).timestamp();
        let signature = self.signature(method, key, expires, content_type)?;
        let path = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}?method={}&expires={}&signature={}",
            self.base_url, path, method, expires, signature
        ))
    }

    /// Check a presented signature in constant time, then its expiry.
    pub fn verify(
        &self,
        method: Method,
        key: &str,
        expires: i64,
        content_type: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let presented = hex::decode(signature).map_err(|_| StorageError::Presign("malformed signature".into()))?;
        self.mac(method, key, expires, content_type)?
            .verify_slice(&presented)
            .map_err(|_| StorageError::Presign("signature mismatch".into()))?;

        if now.timestamp() > expires {
            return Err(StorageError::Presign("url expired".into()));
        }
        Ok(())
    }
}
