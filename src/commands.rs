// src/commands.rs
// Client requests in, replies out. Kept free of PC/SC so it runs against any TagIo.
use crossbeam_channel::Sender;
use log::{debug, error, warn};
use serde_json::Value;

use crate::error::NfcError;
use crate::ndef;
use crate::tag_io::TagIo;
use crate::types::{
    IncomingMessage, InputRecord, NfcCommand, OutgoingMessage, parse_write_payload,
};
use crate::writer::TagWriter;

/// Handles one text frame from a client.
///
/// Valid requests go to the NFC thread. A rejected request never reaches it;
/// the reply to broadcast is returned instead.
pub fn handle_client_text(
    text: &str,
    nfc_cmd_tx: &Sender<NfcCommand>,
) -> Option<OutgoingMessage> {
    match serde_json::from_str::<IncomingMessage>(text) {
        Ok(IncomingMessage::GetReaderStatus) => {
            let _ = nfc_cmd_tx.send(NfcCommand::CheckReaderStatus);
            None
        }
        Ok(IncomingMessage::WriteNdef { payload }) => match parse_write_payload(&payload) {
            Ok(records) => {
                debug!("incoming records: {:?}", records);
                let _ = nfc_cmd_tx.send(NfcCommand::Write { records, payload });
                None
            }
            Err(e) => {
                warn!("Rejected write request: {}", e);
                Some(OutgoingMessage::NdefWriteError {
                    error: e.to_string(),
                })
            }
        },
        Err(e) => {
            warn!("Ignoring unknown message {:?}: {}", text, e);
            None
        }
    }
}

/// Encodes `records` and writes them to `tag`.
pub async fn write_ndef<T: TagIo>(
    writer: &TagWriter,
    tag: &mut T,
    records: &[InputRecord],
) -> Result<(), NfcError> {
    let buffer = ndef::encode(records)?;
    debug!("framed NDEF buffer: {}", hex::encode(&buffer));
    writer.write_tag(&buffer, tag).await?;
    Ok(())
}

/// Reply for a finished write: the client's own payload on success.
pub fn write_reply(result: Result<(), NfcError>, payload: Value) -> OutgoingMessage {
    match result {
        Ok(()) => OutgoingMessage::NdefWritten { payload },
        Err(e) => {
            error!("NDEF write failed: {}", e);
            OutgoingMessage::NdefWriteError {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;
    use serde_json::json;

    use super::*;
    use crate::tag_io::fake::FakeTag;

    async fn write_and_reply(tag: &mut FakeTag, payload: Value) -> OutgoingMessage {
        let records = parse_write_payload(&payload).unwrap();
        let result = write_ndef(&TagWriter::default(), tag, &records).await;
        write_reply(result, payload)
    }

    #[tokio::test]
    async fn success_echoes_the_payload_unchanged() {
        let payload = json!([{"type": "T", "value": "hi", "lang": "fr"}, {"type": "T"}]);
        let mut tag = FakeTag::new(0x12);

        let reply = write_and_reply(&mut tag, payload.clone()).await;

        assert_eq!(
            reply,
            OutgoingMessage::NdefWritten {
                payload: payload.clone()
            }
        );
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"type": "NDEF_WRITTEN", "payload": payload})
        );
        assert!(!tag.write_log.is_empty());
    }

    #[tokio::test]
    async fn oversized_message_reports_tag_too_small() {
        let payload = json!([{"type": "T", "value": "x".repeat(200)}]);
        let mut tag = FakeTag::new(0x12);

        let reply = write_and_reply(&mut tag, payload).await;

        let OutgoingMessage::NdefWriteError { error } = reply else {
            panic!("expected an error reply");
        };
        assert!(error.starts_with("Tag too small!"), "{error}");
        assert!(tag.write_log.is_empty());
    }

    #[tokio::test]
    async fn unrecognised_records_never_touch_the_tag() {
        let payload = json!([{"type": "X", "value": "y"}]);
        let mut tag = FakeTag::new(0x12);

        let reply = write_and_reply(&mut tag, payload).await;

        assert_eq!(
            reply,
            OutgoingMessage::NdefWriteError {
                error: "Unrecognised tag type".into()
            }
        );
        assert_eq!(tag.cc_reads, 0);
    }

    #[tokio::test]
    async fn failed_page_reports_write_error() {
        let payload = json!([{"type": "T", "value": "hello"}]);
        let mut tag = FakeTag::new(0x12).failing_page(5, u32::MAX);

        let reply = write_and_reply(&mut tag, payload).await;

        assert_eq!(
            reply,
            OutgoingMessage::NdefWriteError {
                error: "Write error at page 5 (1 pages already written)".into()
            }
        );
    }

    #[test]
    fn write_request_is_forwarded_with_its_payload() {
        let (tx, rx) = unbounded();
        let text = r#"{"type":"WRITE_NDEF","payload":[{"type":"Sp","value":"https://a.b","x":1}]}"#;

        assert_eq!(handle_client_text(text, &tx), None);

        let Ok(NfcCommand::Write { records, payload }) = rx.try_recv() else {
            panic!("expected a write command");
        };
        assert_eq!(records, vec![InputRecord::new("Sp", "https://a.b")]);
        assert_eq!(payload, json!([{"type": "Sp", "value": "https://a.b", "x": 1}]));
    }

    #[test]
    fn missing_payload_is_rejected_before_the_nfc_thread() {
        let (tx, rx) = unbounded();

        let reply = handle_client_text(r#"{"type":"WRITE_NDEF"}"#, &tx);

        assert_eq!(
            reply,
            Some(OutgoingMessage::NdefWriteError {
                error: "Missing a payload".into()
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_list_payload_is_rejected_before_the_nfc_thread() {
        let (tx, rx) = unbounded();

        let reply = handle_client_text(r#"{"type":"WRITE_NDEF","payload":"hello"}"#, &tx);

        assert!(matches!(reply, Some(OutgoingMessage::NdefWriteError { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reader_status_request_is_forwarded() {
        let (tx, rx) = unbounded();

        assert_eq!(handle_client_text(r#"{"type":"GET_READER_STATUS"}"#, &tx), None);
        assert!(matches!(rx.try_recv(), Ok(NfcCommand::CheckReaderStatus)));

        assert_eq!(handle_client_text("not json", &tx), None);
        assert!(rx.try_recv().is_err());
    }
}
