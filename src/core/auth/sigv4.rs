//! AWS SigV4 request signing
//!
//! Implementation of the AWS Signature Version 4 signing process for
//! APIs that require it alongside the bearer token.

use super::types::SigningCredentials;
use crate::utils::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything a signer may look at
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

/// Computes extra headers that authenticate a request
///
/// Signing is a pure function of its inputs; the timestamp is passed in so the
/// result is reproducible.
pub trait RequestSigner: Send + Sync {
    fn sign(
        &self,
        request: &SigningRequest<'_>,
        credentials: &SigningCredentials,
        timestamp: DateTime<Utc>,
    ) -> Result<HashMap<String, String>>;
}

/// AWS SigV4 signer
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    service: String,
}

impl Default for SigV4Signer {
    fn default() -> Self {
        Self::new(crate::config::models::default_service())
    }
}

impl SigV4Signer {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn calculate_signature(
        &self,
        credentials: &SigningCredentials,
        string_to_sign: &str,
        date_stamp: &str,
    ) -> std::result::Result<String, String> {
        let k_date = hmac_sha256(
            format!("AWS4{}", credentials.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, credentials.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
        Ok(hex::encode(signature))
    }
}

impl RequestSigner for SigV4Signer {
    fn sign(
        &self,
        request: &SigningRequest<'_>,
        credentials: &SigningCredentials,
        timestamp: DateTime<Utc>,
    ) -> Result<HashMap<String, String>> {
        let fail = |message: String| DispatchError::signing(request.url, message);

        let parsed_url =
            url::Url::parse(request.url).map_err(|e| fail(format!("Invalid URL: {}", e)))?;
        let host = parsed_url
            .host_str()
            .ok_or_else(|| fail("Missing host in URL".to_string()))?;
        let host = match parsed_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        let mut added = HashMap::new();
        added.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &credentials.session_token {
            added.insert("x-amz-security-token".to_string(), token.clone());
        }

        // Lowercased and sorted; the caller's headers plus host and the ones added here
        let mut canonical_headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        canonical_headers.insert("host".to_string(), host);
        for (k, v) in &added {
            canonical_headers.insert(k.clone(), v.clone());
        }

        let canonical_headers_str: String = canonical_headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers = canonical_headers
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = hex::encode(Sha256::digest(request.body));
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method.to_uppercase(),
            canonical_path(parsed_url.path()),
            canonical_query(&parsed_url),
            canonical_headers_str,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, credentials.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self
            .calculate_signature(credentials, &string_to_sign, &date_stamp)
            .map_err(fail)?;

        added.insert(
            "authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
            ),
        );

        Ok(added)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| format!("HMAC key error: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding of everything outside the unreserved set
fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn canonical_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    // Url keeps the path percent-encoded; decode first so nothing is encoded twice
    let decoded = percent_decode(path);
    uri_encode(&String::from_utf8_lossy(&decoded), true)
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn canonical_query(url: &url::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, false), uri_encode(&v, false)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
