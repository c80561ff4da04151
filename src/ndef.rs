// src/ndef.rs
use log::debug;

use crate::error::{EncodingError, NdefDecodeError};
use crate::types::{InputRecord, NdefRecord};

// TLV block types used in Type-2 tag memory
pub const TLV_NULL: u8 = 0x00;
pub const TLV_NDEF_MESSAGE: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;
const TLV_LONG_LENGTH: u8 = 0xFF;
// 0xFFFF is reserved, so a 3-byte length tops out one below it
const MAX_TLV_LENGTH: usize = 0xFFFE;

// Record header flags
const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_WELL_KNOWN: u8 = 0x01;

const RTD_TEXT: &[u8] = b"T";
const RTD_URI: &[u8] = b"U";

const TEXT_LANGUAGE: &str = "en";
const TEXT_UTF16: u8 = 0x80;
const TEXT_LANG_LEN_MASK: u8 = 0x3F;

/// URI identifier codes, NFC Forum URI RTD. Index = code.
pub const URI_PREFIXES: &[&str] = &[
    "",                           // 0x00 - no abbreviation
    "http://www.",                // 0x01
    "https://www.",               // 0x02
    "http://",                    // 0x03
    "https://",                   // 0x04
    "tel:",                       // 0x05
    "mailto:",                    // 0x06
    "ftp://anonymous:anonymous@", // 0x07
    "ftp://ftp.",                 // 0x08
    "ftps://",                    // 0x09
    "sftp://",                    // 0x0A
    "smb://",                     // 0x0B
    "nfs://",                     // 0x0C
    "ftp://",                     // 0x0D
    "dav://",                     // 0x0E
    "news:",                      // 0x0F
    "telnet://",                  // 0x10
    "imap:",                      // 0x11
    "rtsp://",                    // 0x12
    "urn:",                       // 0x13
    "pop:",                       // 0x14
    "sip:",                       // 0x15
    "sips:",                      // 0x16
    "tftp:",                      // 0x17
    "btspp://",                   // 0x18
    "btl2cap://",                 // 0x19
    "btgoep://",                  // 0x1A
    "tcpobex://",                 // 0x1B
    "irdaobex://",                // 0x1C
    "file://",                    // 0x1D
    "urn:epc:id:",                // 0x1E
    "urn:epc:tag:",               // 0x1F
    "urn:epc:pat:",               // 0x20
    "urn:epc:raw:",               // 0x21
    "urn:epc:",                   // 0x22
    "urn:nfc:",                   // 0x23
];

/// Encodes client records into the bytes to write from page 4 onwards.
///
/// Records whose type is neither `"Sp"` nor `"T"` are skipped without error;
/// only a list with nothing left after skipping is rejected.
pub fn encode(records: &[InputRecord]) -> Result<Vec<u8>, EncodingError> {
    let mapped: Vec<NdefRecord> = records
        .iter()
        .filter_map(|input| {
            let record = NdefRecord::from_input(input);
            if record.is_none() {
                debug!("skipping record of unsupported type {:?}", input.record_type);
            }
            record
        })
        .collect();

    encode_records(&mapped)
}

/// Serializes already-mapped records and wraps them for a Type-2 tag.
pub fn encode_records(records: &[NdefRecord]) -> Result<Vec<u8>, EncodingError> {
    if records.is_empty() {
        return Err(EncodingError::NoRecognizedRecords);
    }
    frame_tlv(&encode_message(records))
}

/// Plain NDEF message: records back to back, MB on the first and ME on the last.
pub fn encode_message(records: &[NdefRecord]) -> Vec<u8> {
    let mut message = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mb = i == 0;
        let me = i == records.len() - 1;
        encode_record(record, mb, me, &mut message);
    }
    message
}

fn encode_record(record: &NdefRecord, mb: bool, me: bool, out: &mut Vec<u8>) {
    let (type_field, payload) = match record {
        NdefRecord::Text { text } => (RTD_TEXT, text_payload(text)),
        NdefRecord::Uri { uri } => (RTD_URI, uri_payload(uri)),
    };

    // Bit 7: MB, Bit 6: ME, Bit 5: CF(0), Bit 4: SR, Bit 3: IL(0), Bits 2-0: TNF
    let mut header = TNF_WELL_KNOWN;
    if mb {
        header |= FLAG_MB;
    }
    if me {
        header |= FLAG_ME;
    }
    let short_record = payload.len() < 0xFF;
    if short_record {
        header |= FLAG_SR;
    }

    out.push(header);
    out.push(type_field.len() as u8);
    if short_record {
        out.push(payload.len() as u8);
    } else {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(type_field);
    out.extend_from_slice(&payload);
}

// Text Record: [Status Byte] + [Lang Code] + [Text]
fn text_payload(text: &str) -> Vec<u8> {
    let lang = TEXT_LANGUAGE.as_bytes();
    let mut payload = Vec::with_capacity(1 + lang.len() + text.len());
    // Bit 7=0 (UTF-8), bits 5-0 = lang length
    payload.push(lang.len() as u8);
    payload.extend_from_slice(lang);
    payload.extend_from_slice(text.as_bytes());
    payload
}

// URI Record: [Prefix Code] + [rest of URI]
fn uri_payload(uri: &str) -> Vec<u8> {
    let (code, rest) = URI_PREFIXES
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(code, prefix)| uri.strip_prefix(prefix).map(|rest| (code, rest)))
        // longest prefix wins, so "https://www." beats "https://"
        .min_by_key(|(_, rest)| rest.len())
        .unwrap_or((0, uri));

    let mut payload = Vec::with_capacity(1 + rest.len());
    payload.push(code as u8);
    payload.extend_from_slice(rest.as_bytes());
    payload
}

/// Wraps an NDEF message in an NDEF TLV and appends the terminator.
///
/// Layout: `03 LL <message> FE 00`, or `03 FF HH LL <message> FE 00` once
/// the message reaches 255 bytes.
pub fn frame_tlv(message: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let len = message.len();
    if len > MAX_TLV_LENGTH {
        return Err(EncodingError::MessageTooLong(len));
    }

    let mut tlv = Vec::with_capacity(len + 6);
    tlv.push(TLV_NDEF_MESSAGE);
    if len < 0xFF {
        tlv.push(len as u8);
    } else {
        tlv.push(TLV_LONG_LENGTH);
        tlv.extend_from_slice(&(len as u16).to_be_bytes());
    }
    tlv.extend_from_slice(message);
    tlv.push(TLV_TERMINATOR);
    tlv.push(0x00);
    Ok(tlv)
}

/// Finds the NDEF message TLV in raw tag memory (starting at page 4) and
/// returns the message bytes.
pub fn unwrap_tlv(data: &[u8]) -> Result<&[u8], NdefDecodeError> {
    let mut cursor = 0;

    while cursor < data.len() {
        let tlv_type = data[cursor];
        cursor += 1;

        match tlv_type {
            TLV_NULL => continue,
            TLV_TERMINATOR => return Err(NdefDecodeError::NoNdefTlv),
            _ => {}
        }

        // 1. Length: one byte, or 0xFF followed by two
        let first = *data.get(cursor).ok_or(NdefDecodeError::Truncated("TLV length"))?;
        cursor += 1;
        let len = if first == TLV_LONG_LENGTH {
            let bytes = data
                .get(cursor..cursor + 2)
                .ok_or(NdefDecodeError::Truncated("TLV length"))?;
            cursor += 2;
            u16::from_be_bytes([bytes[0], bytes[1]]) as usize
        } else {
            first as usize
        };

        // 2. Value; lock and memory control TLVs are stepped over
        let value = data
            .get(cursor..cursor + len)
            .ok_or(NdefDecodeError::Truncated("TLV value"))?;
        if tlv_type == TLV_NDEF_MESSAGE {
            return Ok(value);
        }
        cursor += len;
    }

    Err(NdefDecodeError::NoNdefTlv)
}

/// Parses the text and URI records of an NDEF message. Records of any other
/// type are skipped.
pub fn parse_ndef_records(data: &[u8]) -> Result<Vec<NdefRecord>, NdefDecodeError> {
    let mut records = Vec::new();
    let mut cursor = 0;

    while cursor < data.len() {
        let header = data[cursor];
        let tnf = header & TNF_MASK;
        let is_short_record = (header & FLAG_SR) != 0;
        let has_id = (header & FLAG_IL) != 0;
        let is_me = (header & FLAG_ME) != 0;
        cursor += 1;

        // 1. Type length, payload length (1 byte for SR, 4 otherwise), ID length
        let type_len = take(data, &mut cursor, 1, "type length")?[0] as usize;
        let payload_len = if is_short_record {
            take(data, &mut cursor, 1, "payload length")?[0] as usize
        } else {
            let b = take(data, &mut cursor, 4, "payload length")?;
            u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
        };
        let id_len = if has_id {
            take(data, &mut cursor, 1, "id length")?[0] as usize
        } else {
            0
        };

        // 2. Type, ID, payload
        let record_type = take(data, &mut cursor, type_len, "record type")?;
        take(data, &mut cursor, id_len, "record id")?;
        let payload = take(data, &mut cursor, payload_len, "payload")?;

        if tnf == TNF_WELL_KNOWN && record_type == RTD_TEXT {
            records.push(NdefRecord::Text {
                text: decode_text_payload(payload)?,
            });
        } else if tnf == TNF_WELL_KNOWN && record_type == RTD_URI {
            records.push(NdefRecord::Uri {
                uri: decode_uri_payload(payload),
            });
        } else {
            debug!("skipping record with TNF {tnf} and type {record_type:02X?}");
        }

        if is_me {
            break;
        }
    }

    Ok(records)
}

fn take<'a>(
    data: &'a [u8],
    cursor: &mut usize,
    n: usize,
    what: &'static str,
) -> Result<&'a [u8], NdefDecodeError> {
    let bytes = data
        .get(*cursor..*cursor + n)
        .ok_or(NdefDecodeError::Truncated(what))?;
    *cursor += n;
    Ok(bytes)
}

fn decode_text_payload(payload: &[u8]) -> Result<String, NdefDecodeError> {
    let (&status_byte, rest) = payload
        .split_first()
        .ok_or(NdefDecodeError::Truncated("text status byte"))?;
    let lang_len = (status_byte & TEXT_LANG_LEN_MASK) as usize;
    let text = rest
        .get(lang_len..)
        .ok_or(NdefDecodeError::Truncated("text language code"))?;

    if status_byte & TEXT_UTF16 != 0 {
        if text.len() % 2 != 0 {
            return Err(NdefDecodeError::InvalidText("odd UTF-16 length".into()));
        }
        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map_err(|e| NdefDecodeError::InvalidText(e.to_string()))
    } else {
        String::from_utf8(text.to_vec()).map_err(|e| NdefDecodeError::InvalidText(e.to_string()))
    }
}

fn decode_uri_payload(payload: &[u8]) -> String {
    let Some((&code, rest)) = payload.split_first() else {
        return String::new();
    };
    let prefix = URI_PREFIXES.get(code as usize).copied().unwrap_or("");
    format!("{}{}", prefix, String::from_utf8_lossy(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> InputRecord {
        InputRecord::new("T", s)
    }

    fn uri(s: &str) -> InputRecord {
        InputRecord::new("Sp", s)
    }

    // Message length of a single short text record holding `n` ASCII bytes
    fn text_message_len(n: usize) -> usize {
        4 + 3 + n
    }

    #[test]
    fn text_record_layout() {
        let buffer = encode(&[text("hello")]).unwrap();
        assert_eq!(
            buffer,
            vec![
                0x03, 0x0C, // NDEF TLV, 12 bytes
                0xD1, 0x01, 0x08, b'T', // MB|ME|SR|well-known, type len, payload len
                0x02, b'e', b'n', b'h', b'e', b'l', b'l', b'o', //
                0xFE, 0x00,
            ]
        );
    }

    #[test]
    fn frame_starts_with_tlv_and_ends_with_terminator() {
        let inputs = [
            vec![text("a")],
            vec![uri("https://example.com/x")],
            vec![text("one"), uri("tel:123"), text("two")],
        ];
        for records in inputs {
            let buffer = encode(&records).unwrap();
            assert_eq!(buffer[0], 0x03);
            assert_eq!(&buffer[buffer.len() - 2..], &[0xFE, 0x00]);
        }
    }

    #[test]
    fn short_length_header_below_255() {
        let body = "x".repeat(247);
        assert_eq!(text_message_len(body.len()), 254);
        let buffer = encode(&[text(&body)]).unwrap();
        assert_eq!(&buffer[..2], &[0x03, 254]);
        assert_eq!(buffer.len(), 2 + 254 + 2);
    }

    #[test]
    fn long_length_header_from_255() {
        let body = "x".repeat(248);
        assert_eq!(text_message_len(body.len()), 255);
        let buffer = encode(&[text(&body)]).unwrap();
        assert_eq!(&buffer[..4], &[0x03, 0xFF, 0x00, 0xFF]);
        assert_eq!(buffer.len(), 4 + 255 + 2);
    }

    #[test]
    fn long_record_uses_four_byte_payload_length() {
        let body = "y".repeat(300);
        let message = encode_message(&[NdefRecord::Text { text: body.clone() }]);
        // no SR flag once the payload reaches 255 bytes
        assert_eq!(message[0], 0xC1);
        assert_eq!(&message[2..6], &303u32.to_be_bytes());
        assert_eq!(message.len(), 1 + 1 + 4 + 1 + 303);

        let buffer = frame_tlv(&message).unwrap();
        assert_eq!(&buffer[..4], &[0x03, 0xFF, 0x01, 0x36]);
        assert_eq!(
            parse_ndef_records(unwrap_tlv(&buffer).unwrap()).unwrap(),
            vec![NdefRecord::Text { text: body }]
        );
    }

    #[test]
    fn empty_or_unrecognised_input_is_rejected() {
        assert_eq!(encode(&[]), Err(EncodingError::NoRecognizedRecords));
        assert_eq!(
            encode(&[InputRecord::new("X", "y")]),
            Err(EncodingError::NoRecognizedRecords)
        );
        assert_eq!(
            EncodingError::NoRecognizedRecords.to_string(),
            "Unrecognised tag type"
        );
    }

    #[test]
    fn unrecognised_types_are_skipped() {
        let mixed = encode(&[InputRecord::new("X", "y"), text("kept"), InputRecord::new("U", "z")]);
        assert_eq!(mixed, encode(&[text("kept")]));
    }

    #[test]
    fn multiple_records_set_begin_and_end_flags() {
        let message = encode_message(&[
            NdefRecord::Text { text: "a".into() },
            NdefRecord::Text { text: "b".into() },
            NdefRecord::Text { text: "c".into() },
        ]);
        // each record: header, type len, payload len, 'T', 0x02 'e' 'n', char
        assert_eq!(message.len(), 3 * 8);
        assert_eq!(message[0], 0x91); // MB|SR
        assert_eq!(message[8], 0x11); // SR
        assert_eq!(message[16], 0x51); // ME|SR
    }

    #[test]
    fn uri_prefix_abbreviation() {
        assert_eq!(uri_payload("https://www.example.com"), b"\x02example.com");
        assert_eq!(uri_payload("https://example.com"), b"\x04example.com");
        assert_eq!(uri_payload("urn:epc:id:123"), b"\x1E123");
        assert_eq!(uri_payload("mailto:a@b.c"), b"\x06a@b.c");
        assert_eq!(uri_payload("custom:thing"), b"\x00custom:thing");
    }

    #[test]
    fn oversized_message_is_rejected() {
        let message = vec![0u8; MAX_TLV_LENGTH + 1];
        assert_eq!(
            frame_tlv(&message),
            Err(EncodingError::MessageTooLong(MAX_TLV_LENGTH + 1))
        );
        assert!(frame_tlv(&message[1..]).is_ok());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let records = vec![
            NdefRecord::Uri {
                uri: "https://www.example.com/path".into(),
            },
            NdefRecord::Text { text: "héllo".into() },
        ];
        let buffer = encode_records(&records).unwrap();
        let message = unwrap_tlv(&buffer).unwrap();
        assert_eq!(parse_ndef_records(message).unwrap(), records);
    }

    #[test]
    fn unwrap_skips_null_and_control_tlvs() {
        // NULL, lock control TLV (01 03 xx xx xx), then the NDEF TLV
        let mut data = vec![0x00, 0x01, 0x03, 0xA0, 0x10, 0x44];
        data.extend(encode(&[text("hi")]).unwrap());
        let message = unwrap_tlv(&data).unwrap();
        assert_eq!(
            parse_ndef_records(message).unwrap(),
            vec![NdefRecord::Text { text: "hi".into() }]
        );
    }

    #[test]
    fn unwrap_reports_missing_or_cut_tlv() {
        assert_eq!(unwrap_tlv(&[0xFE, 0x00]), Err(NdefDecodeError::NoNdefTlv));
        assert_eq!(unwrap_tlv(&[0x00, 0x00]), Err(NdefDecodeError::NoNdefTlv));
        assert_eq!(
            unwrap_tlv(&[0x03, 0x0C, 0xD1]),
            Err(NdefDecodeError::Truncated("TLV value"))
        );
    }

    #[test]
    fn parse_rejects_truncated_record() {
        assert_eq!(
            parse_ndef_records(&[0xD1, 0x01, 0x08, b'T', 0x02]),
            Err(NdefDecodeError::Truncated("payload"))
        );
    }

    #[test]
    fn parse_reads_utf16_text() {
        // status: UTF-16 flag | lang length 2
        let payload = [0x82, b'e', b'n', 0x00, b'h', 0x00, b'i'];
        let mut message = vec![0xD1, 0x01, payload.len() as u8, b'T'];
        message.extend_from_slice(&payload);
        assert_eq!(
            parse_ndef_records(&message).unwrap(),
            vec![NdefRecord::Text { text: "hi".into() }]
        );
    }
}
