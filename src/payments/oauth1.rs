//! OAuth 1.0a request signing (RFC 5849 §3.4, HMAC-SHA1).
//!
//! Builds the normalized parameter string, the signature base string, and
//! the signed query string for providers that authenticate requests by
//! signature rather than bearer token. Stateless and deterministic for a
//! fixed nonce/timestamp; a failure to sign is a programming error, never
//! a transient fault.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// A fully signed request: the assembled query string (signature included)
/// and the complete URL to send the caller to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub signature: String,
    pub query_string: String,
    pub url: String,
}

/// Percent-encodes per RFC 3986 with the unreserved set `A-Za-z0-9-_.~`.
///
/// Differs from default URL encoding in that `!`, `'`, `(`, `)` and `*`
/// are escaped too; OAuth signatures break without this.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// The standard `oauth_*` protocol parameters for one request.
pub fn protocol_params(
    consumer_key: &str,
    nonce: &str,
    timestamp: i64,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("oauth_consumer_key".to_string(), consumer_key.to_string());
    params.insert("oauth_nonce".to_string(), nonce.to_string());
    params.insert(
        "oauth_signature_method".to_string(),
        SIGNATURE_METHOD.to_string(),
    );
    params.insert("oauth_timestamp".to_string(), timestamp.to_string());
    params.insert("oauth_version".to_string(), OAUTH_VERSION.to_string());
    params
}

/// Joins the (already lexicographically ordered) parameters as
/// `key=value` pairs with `&`, percent-encoding every key and value.
fn normalized_param_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `METHOD&encode(url)&encode(paramString)` per RFC 5849 §3.4.1.
pub fn signature_base_string(
    method: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> String {
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&normalized_param_string(params))
    )
}

fn hmac_sha1_base64(key: &str, data: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Signs one request. The signing key is `consumerSecret + "&"` — there is
/// no token secret in this two-legged flow. The returned query string is
/// the normalized parameter string with `oauth_signature` appended.
pub fn sign_request(
    method: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    consumer_secret: &str,
) -> SignedRequest {
    let param_string = normalized_param_string(params);
    let base_string = signature_base_string(method, url, params);
    let signing_key = format!("{}&", consumer_secret);
    let signature = hmac_sha1_base64(&signing_key, &base_string);

    let query_string = format!(
        "{}&oauth_signature={}",
        param_string,
        percent_encode(&signature)
    );
    let full_url = format!("{}?{}", url, query_string);

    SignedRequest {
        signature,
        query_string,
        url: full_url,
    }
}

/// Nonce for one request. Only needs to avoid signature collisions between
/// concurrent requests, not to be unguessable.
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
