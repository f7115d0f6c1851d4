//! Inbound telephony webhook signature validation.
//!
//! The provider signs each webhook with HMAC-SHA1 over the full request URL
//! followed by the form parameters sorted lexicographically by key, each
//! appended as `key` then `value`, base64-encoded. An invalid or missing
//! signature means the payload cannot be trusted: handlers answer with an
//! empty voice document and do no pipeline work, so the endpoint leaks
//! nothing to unauthenticated callers.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::{BTreeMap, HashMap};

/// Decides whether inbound webhook payloads can be trusted.
#[derive(Debug, Clone)]
pub struct SignatureValidator {
    auth_token: Option<String>,
    enabled: bool,
}

impl SignatureValidator {
    pub fn new(auth_token: Option<String>, enabled: bool) -> Self {
        Self {
            auth_token,
            enabled,
        }
    }

    /// Validates the signature header against the request URL and form
    /// parameters. Always passes when validation is disabled; always fails
    /// when enabled without a configured token or signature.
    pub fn validate(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        signature: Option<&str>,
    ) -> bool {
        if !self.enabled {
            return true;
        }
        let (Some(token), Some(signature)) = (&self.auth_token, signature) else {
            return false;
        };
        let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature) else {
            return false;
        };

        // verify_slice compares in constant time, so response timing leaks
        // nothing about how much of a guessed signature matched.
        signing_mac(token, url, params).verify_slice(&provided).is_ok()
    }
}

/// HMAC-SHA1 over the request URL followed by the form parameters sorted
/// lexicographically by key, each appended as key then value.
fn signing_mac(auth_token: &str, url: &str, params: &HashMap<String, String>) -> Hmac<Sha1> {
    let sorted: BTreeMap<&String, &String> = params.iter().collect();

    let mut payload = url.to_string();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }

    let mut mac =
        Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac
}

/// Computes the expected base64 HMAC-SHA1 signature for a webhook request.
pub fn compute_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    let digest = signing_mac(auth_token, url, params).finalize().into_bytes();
    base64::engine::general_purpose::STANDARD.encode(digest)
}
