// relay-protocol: wire types shared between the relay server and its tests.
//
// HTTP response bodies are plain JSON objects; the handoff channel frames use
// a top-level `type` field for discriminated serialization. Every wire type
// uses camelCase field names, matching the relay's external interface
// contract — Rust-side fields stay snake_case, as usual.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Uniform HTTP error envelope
// ---------------------------------------------------------------------------

/// Shape shared by every non-2xx API response (§7 of the relay spec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Pairing HTTP bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub pair_id: Uuid,
    pub relay_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub public_key: String,
    pub relay_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub pair_id: Uuid,
    pub partner_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub paired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_public_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry HTTP bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub day_id: String,
    /// Standard base64, decoded server-side into opaque bytes.
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDto {
    pub id: Uuid,
    pub day_id: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesResponse {
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub entry_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Push subscription HTTP body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Handoff channel frames (§4.5)
// ---------------------------------------------------------------------------

/// Frames exchanged over the upgraded bidirectional handoff channel.
///
/// Serializes/deserializes using the `type` field as a tag, matching the
/// client-facing contract (`{"type": "auth", ...}`). The enum-level
/// `rename_all` governs the tag's own values; each struct variant carries its
/// own `rename_all` so the fields inside it are camelCase too — `rename_all`
/// on an enum does not cascade into struct-variant field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum HandoffFrame {
    /// Client -> server: authenticate as the watcher (initiator side).
    #[serde(rename_all = "camelCase")]
    Auth {
        public_key: String,
        timestamp: String,
        signature: String,
    },
    /// Client -> server: authenticate as the collector (follower side).
    #[serde(rename_all = "camelCase")]
    CollectAuth {
        public_key: String,
        timestamp: String,
        signature: String,
    },
    /// Server -> client: auth accepted, channel is live.
    Ready,
    /// Server -> watcher: the pair has been joined.
    #[serde(rename_all = "camelCase")]
    Paired { partner_public_key: String },
    /// Watcher -> server, or server -> collector: the history bundle.
    Bundle { payload: String },
    /// Server -> client: the channel is being closed due to a protocol error.
    Error { message: String },
}

/// Fixed string prefixes the handoff auth signature is computed over, so a
/// watch signature can never be replayed as a collect signature or vice versa.
pub mod handoff_prefixes {
    pub const WATCH: &str = "WATCH";
    pub const COLLECT: &str = "COLLECT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_frame_uses_type_tag_for_auth() {
        let frame = HandoffFrame::Auth {
            public_key: "pk".to_owned(),
            timestamp: "2026-02-17T10:00:00Z".to_owned(),
            signature: "sig".to_owned(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "auth");
        assert_eq!(json["publicKey"], "pk");
    }

    #[test]
    fn handoff_frame_ready_round_trips() {
        let json = serde_json::json!({"type": "ready"});
        let frame: HandoffFrame = serde_json::from_value(json).unwrap();
        assert_eq!(frame, HandoffFrame::Ready);
    }

    #[test]
    fn handoff_frame_paired_uses_camel_case_field() {
        let frame = HandoffFrame::Paired {
            partner_public_key: "partner".to_owned(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "paired");
        assert_eq!(json["partnerPublicKey"], "partner");
    }

    #[test]
    fn http_error_envelope_serializes_as_error_field() {
        let env = HttpErrorEnvelope {
            error: "Too many requests".to_owned(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Too many requests"}));
    }

    #[test]
    fn status_response_omits_partner_key_when_unpaired() {
        let resp = StatusResponse {
            paired: false,
            partner_public_key: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"paired": false}));
    }

    #[test]
    fn initiate_request_uses_camel_case_public_key() {
        let req = InitiateRequest {
            public_key: "pk".to_owned(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"publicKey": "pk"}));
    }

    #[test]
    fn join_response_uses_camel_case_fields() {
        let resp = JoinResponse {
            pair_id: Uuid::nil(),
            partner_public_key: "partner".to_owned(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["partnerPublicKey"], "partner");
        assert!(json.get("partner_public_key").is_none());
    }
}
