// src/types.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PayloadError;

/// Record type string for a URI ("smart poster" style) record.
pub const INPUT_TYPE_URI: &str = "Sp";
/// Record type string for a text record.
pub const INPUT_TYPE_TEXT: &str = "T";

// One entry of a WRITE_NDEF payload, as sent by the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InputRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub value: String,
}

impl InputRecord {
    pub fn new(record_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            value: value.into(),
        }
    }
}

/// A record the encoder knows how to put on a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdefRecord {
    Uri { uri: String },
    Text { text: String },
}

impl NdefRecord {
    /// Maps a client record onto a supported NDEF record. Unknown types give `None`.
    pub fn from_input(input: &InputRecord) -> Option<Self> {
        match input.record_type.as_str() {
            INPUT_TYPE_URI => Some(Self::Uri {
                uri: input.value.clone(),
            }),
            INPUT_TYPE_TEXT => Some(Self::Text {
                text: input.value.clone(),
            }),
            _ => None,
        }
    }
}

// Messages sent TO the WebSocket client
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    ReaderStatus { success: bool },
    TagPresented { uid: String },
    TagRemoved { uid: String },
    // Acknowledgement: the client's payload, echoed as received
    NdefWritten { payload: Value },
    NdefWriteError { error: String },
    ReaderError { error: String },
}

// Messages received FROM the WebSocket client
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    GetReaderStatus,
    WriteNdef {
        #[serde(default)]
        payload: Value,
    },
}

// Internal commands sent from WS Server -> NFC Thread
#[derive(Debug)]
pub enum NfcCommand {
    Write {
        records: Vec<InputRecord>,
        // raw payload, sent back on success
        payload: Value,
    },
    CheckReaderStatus,
}

/// Validates the raw `payload` of a WRITE_NDEF request.
///
/// Only the typed view is returned; callers keep `payload` itself for the
/// acknowledgement.
///
/// A missing payload and one that is not a list of `{type, value}` objects
/// are caller errors; an empty list is passed on and rejected by the encoder.
pub fn parse_write_payload(payload: &Value) -> Result<Vec<InputRecord>, PayloadError> {
    match payload {
        Value::Null => Err(PayloadError::Missing),
        Value::Array(_) => {
            Vec::<InputRecord>::deserialize(payload)
                .map_err(|e| PayloadError::Malformed(e.to_string()))
        }
        _ => Err(PayloadError::NotAList),
    }
}
