use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{FrameRecord, NotificationRequest};

pub const RECORD_FRAME: &str = "recording:record-frame";
pub const SEND_NOTIFICATION: &str = "notification:send";

/// What actually crosses the page/worker boundary: `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    RecordFrame(FrameRecord),
    SendNotification(NotificationRequest),
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unknown message type '{0}'")]
    Unknown(String),
    #[error("malformed '{kind}' payload: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::RecordFrame(_) => RECORD_FRAME,
            WorkerMessage::SendNotification(_) => SEND_NOTIFICATION,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let data = match self {
            WorkerMessage::RecordFrame(record) => serde_json::to_value(record)?,
            WorkerMessage::SendNotification(request) => serde_json::to_value(request)?,
        };
        Ok(Envelope {
            kind: self.kind().to_string(),
            data,
        })
    }

    pub fn parse(envelope: Envelope) -> Result<Self, MessageError> {
        let Envelope { kind, data } = envelope;
        let parsed = match kind.as_str() {
            RECORD_FRAME => serde_json::from_value(data).map(WorkerMessage::RecordFrame),
            SEND_NOTIFICATION => serde_json::from_value(data).map(WorkerMessage::SendNotification),
            _ => return Err(MessageError::Unknown(kind)),
        };
        parsed.map_err(|source| MessageError::Malformed { kind, source })
    }
}
