// src/error.rs
use thiserror::Error;

use crate::tag_io::TagIoError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// None of the input records had a type the encoder supports.
    #[error("Unrecognised tag type")]
    NoRecognizedRecords,

    #[error("NDEF message of {0} bytes does not fit a TLV length field")]
    MessageTooLong(usize),
}

/// Failure of a tag write. Every variant ends the operation.
///
/// Pages are written without any transaction support: after
/// [`WriteError::PageWriteFailed`] the pages before `page` keep the new data
/// and the tag holds a partial message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("Couldn't read capability container of RFID tag")]
    CapabilityReadFailed(#[source] TagIoError),

    #[error("Tag too small! ({required} bytes needed, {available} available)")]
    TagTooSmall { required: usize, available: usize },

    #[error("Write error at page {page} ({pages_written} pages already written)")]
    PageWriteFailed { page: u16, pages_written: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefDecodeError {
    #[error("No NDEF TLV found")]
    NoNdefTlv,

    #[error("data ends before {0} is complete")]
    Truncated(&'static str),

    #[error("invalid text record: {0}")]
    InvalidText(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Missing a payload")]
    Missing,

    #[error("Payload must be a list of records")]
    NotAList,

    #[error("Malformed payload record: {0}")]
    Malformed(String),
}

/// Everything a write command can fail with, as reported to the client.
#[derive(Debug, Error)]
pub enum NfcError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("No reader connected")]
    NoReader,

    #[error("No RFID tag found")]
    NoTag,
}
