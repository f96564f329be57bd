//! Server wire payloads.
//!
//! All requests are JSON POST bodies; every reply is a JSON object that
//! either reports success (`"result": "OK"`, possibly with data) or carries
//! a nonzero `code`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ProtocolError};
use crate::pool::Message;

pub const PATH_AUTHORIZE: &str = "/authorize.json";
pub const PATH_GET_MSGS: &str = "/getMsgsAndSync.json";
pub const PATH_ADD_MSGS: &str = "/addMsgs.json";
pub const PATH_ADD_RECORD: &str = "/addRecord.json";
pub const PATH_ADD_STREAM: &str = "/addStream.json";

/// Sub-protocol announced when opening the frame stream.
pub const STREAM_SUBPROTO: &str = "RAW_JPEG";

/// Stamp sent with the first get-messages request after authentication.
pub const INITIAL_STAMP: &str = "";

pub const RESULT_OK: &str = "OK";
pub const RESULT_BAD: &str = "BAD";

// Server result codes
pub const CODE_NO_ERROR: i64 = 0;
pub const CODE_NO_SUCH_SESSION: i64 = 6;

// ───────────────────────────────────────────────────────────────
// Requests
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub name: &'a str,
    pub pass: &'a str,
    pub device: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct GetMsgsRequest<'a> {
    pub shash: &'a str,
    pub stamp: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AddMsgsRequest<'a> {
    pub shash: &'a str,
    pub msgs: &'a [Message],
}

/// Path of the snapshot upload for a session.
pub fn record_path(shash: &str) -> String {
    format!("{PATH_ADD_RECORD}?shash={shash}")
}

/// Path of the long-lived frame stream for a session.
pub fn stream_path(shash: &str, period_ms: u32) -> String {
    format!("{PATH_ADD_STREAM}?shash={shash}&subproto={STREAM_SUBPROTO}&delta={period_ms}")
}

// ───────────────────────────────────────────────────────────────
// Replies
// ───────────────────────────────────────────────────────────────

/// Union of every reply shape the server produces.
#[derive(Debug, Default, Deserialize)]
pub struct ServerReply {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub shash: Option<String>,
    /// Raw message list; entries are validated one by one.
    #[serde(default)]
    pub msgs: Option<Vec<Value>>,
}

impl ServerReply {
    /// Parse a response body.
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body).map_err(|_| ProtocolError::UnparsableResponse.into())
    }

    /// Classify the reply.
    ///
    /// A nonzero `code` wins over everything else; code 6 means the session
    /// id is unknown to the server.
    pub fn check(&self) -> Result<(), Error> {
        match self.code {
            Some(CODE_NO_SUCH_SESSION) => return Err(Error::SessionInvalid),
            Some(code) if code != CODE_NO_ERROR => {
                return Err(ProtocolError::ServerCode(code).into());
            }
            _ => {}
        }
        match self.result.as_deref() {
            None | Some(RESULT_OK) => Ok(()),
            Some(_) => Err(ProtocolError::BadResult.into()),
        }
    }

    /// Session id from an auth reply.
    pub fn session_id(&self) -> Result<&str, Error> {
        self.check()?;
        match self.shash.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ProtocolError::MissingSessionId.into()),
        }
    }

    /// Validated messages from a get-messages reply.
    ///
    /// Entries without a `msg` kind are dropped with a warning.
    pub fn take_messages(&mut self) -> Vec<Message> {
        let raw = self.msgs.take().unwrap_or_default();
        raw.into_iter()
            .filter_map(|v| match serde_json::from_value::<Message>(v) {
                Ok(m) => Some(m),
                Err(_) => {
                    log::warn!("Sync: skipping malformed incoming message");
                    None
                }
            })
            .collect()
    }
}
