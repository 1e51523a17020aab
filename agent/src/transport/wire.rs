//! Wire format of the remote endpoint.
//!
//! ```text
//! GET  {endpoint}?op=get&token=..&t=..
//!   -> {"ok":true,"updatedAt":"<ISO>"|null,"data":{..}}
//! POST {endpoint}?token=..&t=..   body {"op":"set","baseUpdatedAt":"..","data":{..}}
//!   -> {"ok":true,"updatedAt":"<ISO>"} | {"ok":false,"conflict":true}
//!
//! failures -> {"ok":false,"error":"<reason>"}
//! ```

use super::{GetOutcome, SetOutcome, TransportError};
use clubsync_engine::Document;
use serde::{Deserialize, Serialize};

/// Body of a write request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest<'a> {
    pub op: &'static str,
    /// Empty when this device has never pulled
    pub base_updated_at: &'a str,
    pub data: &'a Document,
}

impl<'a> SetRequest<'a> {
    pub fn new(data: &'a Document, base_updated_at: Option<&'a str>) -> Self {
        Self {
            op: "set",
            base_updated_at: base_updated_at.unwrap_or(""),
            data,
        }
    }
}

/// Any reply of the remote endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Older deployments name the stamp `updatedAtISO`
    #[serde(default, rename = "updatedAtISO")]
    pub updated_at_iso: Option<String>,
    #[serde(default)]
    pub data: Option<Document>,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    fn stamp(&self) -> Option<String> {
        [&self.updated_at, &self.updated_at_iso]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
    }

    /// Failure reason of an `ok:false` reply or a non-2xx status.
    fn failure(&self, status: u16) -> Option<TransportError> {
        if !self.ok {
            return Some(match self.error.as_deref() {
                Some(reason) if !reason.is_empty() => TransportError::Remote(reason.to_string()),
                _ => TransportError::Status(status),
            });
        }
        if !(200..300).contains(&status) {
            return Some(TransportError::Status(status));
        }
        None
    }
}

/// Parse a reply body. Bodies that are not a JSON object are `non_json`.
pub fn decode_reply(body: &str) -> Result<Reply, TransportError> {
    serde_json::from_str(body).map_err(|_| TransportError::NonJson)
}

/// Interpret the reply to a GET.
pub fn decode_get(status: u16, body: &str) -> GetOutcome {
    let reply = match decode_reply(body) {
        Ok(reply) => reply,
        Err(e) => return GetOutcome::Failed(e),
    };
    if let Some(error) = reply.failure(status) {
        return GetOutcome::Failed(error);
    }
    GetOutcome::Ok {
        updated_at: reply.stamp(),
        data: reply.data.unwrap_or_default(),
    }
}

/// Interpret the reply to a SET.
pub fn decode_set(status: u16, body: &str) -> SetOutcome {
    let reply = match decode_reply(body) {
        Ok(reply) => reply,
        Err(e) => return SetOutcome::Failed(e),
    };
    if reply.conflict {
        return SetOutcome::Conflict;
    }
    if let Some(error) = reply.failure(status) {
        return SetOutcome::Failed(error);
    }
    match reply.stamp() {
        Some(updated_at) => SetOutcome::Ok { updated_at },
        None => SetOutcome::Failed(TransportError::MissingStamp),
    }
}
