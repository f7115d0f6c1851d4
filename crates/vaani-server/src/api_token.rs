//! Soft-phone access token endpoint.
//!
//! Mints the short-lived JWT the browser voice SDK exchanges for a media
//! session. The grant ties the token to the configured outgoing application
//! and a fixed client identity.

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token lifetime in seconds.
const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct VoiceGrant {
    application_sid: String,
}

#[derive(Debug, Serialize)]
struct IncomingGrant {
    allow: bool,
}

#[derive(Debug, Serialize)]
struct Grants {
    identity: String,
    voice: VoiceGrantWrapper,
}

#[derive(Debug, Serialize)]
struct VoiceGrantWrapper {
    outgoing: VoiceGrant,
    incoming: IncomingGrant,
}

#[derive(Debug, Serialize)]
struct Claims {
    jti: String,
    iss: String,
    sub: String,
    exp: u64,
    grants: Grants,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    identity: Option<String>,
}

/// `GET /client-token?identity=` — returns `{ token, identity }` or a 400
/// when the soft-phone credentials are not configured. The caller may name
/// its own identity; the configured default applies otherwise.
pub async fn client_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let telephony = &state.config.telephony;

    let (api_key_sid, api_key_secret, app_sid) = match (
        telephony.api_key_sid.as_deref(),
        telephony.api_key_secret.as_deref(),
        telephony.twiml_app_sid.as_deref(),
    ) {
        (Some(sid), Some(secret), Some(app)) => (sid, secret, app),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "soft-phone credentials not configured" })),
            )
                .into_response();
        }
    };

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(now) => now.as_secs(),
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "system clock before epoch" })),
            )
                .into_response();
        }
    };

    let identity = query
        .identity
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| telephony.client_identity.clone());
    let claims = Claims {
        jti: format!("{api_key_sid}-{now}"),
        iss: api_key_sid.to_string(),
        sub: telephony.account_sid.clone().unwrap_or_default(),
        exp: now + TOKEN_TTL_SECS,
        grants: Grants {
            identity: identity.clone(),
            voice: VoiceGrantWrapper {
                outgoing: VoiceGrant {
                    application_sid: app_sid.to_string(),
                },
                incoming: IncomingGrant { allow: true },
            },
        },
    };

    // The voice SDK requires this content-type marker in the JWT header.
    let mut header = Header::default();
    header.cty = Some("twilio-fv=1".to_string());

    match encode(
        &header,
        &claims,
        &EncodingKey::from_secret(api_key_secret.as_bytes()),
    ) {
        Ok(token) => Json(json!({ "token": token, "identity": identity })).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "token signing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "token signing failed" })),
            )
                .into_response()
        }
    }
}
