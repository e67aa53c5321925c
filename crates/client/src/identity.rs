//! Session identity derivation
//!
//! The server issues an opaque bearer credential (structurally a JWT:
//! `header.payload.signature`). The client decodes the payload purely for
//! display and message attribution — it never verifies the signature and
//! never treats the claims as authorization. That remains a server concern.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

use crate::error::SyncError;

/// Claim keys that may carry the user ID, in lookup order.
/// Older tokens carry `id` instead of the standard `sub`.
const SUBJECT_CLAIMS: [&str; 2] = ["sub", "id"];

/// Extract the user ID from a bearer credential without a server round-trip.
///
/// Fails with [`SyncError::MalformedCredential`] if the payload segment is
/// not base64url JSON or lacks a subject claim. Callers must treat that as
/// "no identity" — attribution features turn off, nothing else breaks.
pub fn user_id_from_credential(credential: &str) -> Result<String, SyncError> {
    let mut segments = credential.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(SyncError::MalformedCredential(
                "expected header.payload.signature".to_string(),
            ))
        }
    };

    // Some issuers pad base64url segments even though the JWT spec says not to.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| SyncError::MalformedCredential(format!("payload is not base64url: {err}")))?;

    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|err| SyncError::MalformedCredential(format!("payload is not JSON: {err}")))?;

    for key in SUBJECT_CLAIMS {
        match claims.get(key) {
            Some(Value::String(subject)) if !subject.is_empty() => return Ok(subject.clone()),
            Some(Value::Number(subject)) => return Ok(subject.to_string()),
            _ => {}
        }
    }

    Err(SyncError::MalformedCredential(
        "payload has no subject claim".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_with_payload(payload: &str) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        format!("eyJhbGciOiJIUzI1NiJ9.{encoded}.c2lnbmF0dXJl")
    }

    #[test]
    fn extracts_sub_claim() {
        let token = credential_with_payload(r#"{"sub":"u-17","exp":1700000000}"#);
        assert_eq!(user_id_from_credential(&token).unwrap(), "u-17");
    }

    #[test]
    fn falls_back_to_id_claim() {
        let token =
            credential_with_payload(r#"{"id":42,"phoneNumber":"+15550100","role":"user"}"#);
        assert_eq!(user_id_from_credential(&token).unwrap(), "42");
    }

    #[test]
    fn prefers_sub_over_id() {
        let token = credential_with_payload(r#"{"sub":"u-1","id":"u-2"}"#);
        assert_eq!(user_id_from_credential(&token).unwrap(), "u-1");
    }

    #[test]
    fn tolerates_padded_payload() {
        let encoded = URL_SAFE_NO_PAD.encode(r#"{"sub":"u-3"}"#);
        let token = format!("h.{encoded}==.s");
        assert_eq!(user_id_from_credential(&token).unwrap(), "u-3");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(
            user_id_from_credential("only-one-segment"),
            Err(SyncError::MalformedCredential(_))
        ));
        assert!(matches!(
            user_id_from_credential("a.b"),
            Err(SyncError::MalformedCredential(_))
        ));
        assert!(matches!(
            user_id_from_credential("a.b.c.d"),
            Err(SyncError::MalformedCredential(_))
        ));
    }

    #[test]
    fn rejects_non_base64_payload() {
        assert!(matches!(
            user_id_from_credential("h.!!not-base64!!.s"),
            Err(SyncError::MalformedCredential(_))
        ));
    }

    #[test]
    fn rejects_non_json_payload() {
        let encoded = URL_SAFE_NO_PAD.encode("plain text");
        let token = format!("h.{encoded}.s");
        assert!(matches!(
            user_id_from_credential(&token),
            Err(SyncError::MalformedCredential(_))
        ));
    }

    #[test]
    fn rejects_missing_subject_claim() {
        let token = credential_with_payload(r#"{"role":"admin"}"#);
        assert!(matches!(
            user_id_from_credential(&token),
            Err(SyncError::MalformedCredential(_))
        ));
    }
}
