// src/apdu.rs
// Pseudo-APDUs understood by ACR122U-style PC/SC readers
use pcsc::Card;

use crate::tag_io::TagIoError;

const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

impl From<pcsc::Error> for TagIoError {
    fn from(err: pcsc::Error) -> Self {
        TagIoError::Transmit(err.to_string())
    }
}

fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>, TagIoError> {
    let mut recv_buffer = [0u8; 256];
    let resp = card.transmit(apdu, &mut recv_buffer)?;

    // Last two bytes are the status word; 0x90 0x00 is Success
    match resp {
        [data @ .., sw1, sw2] if [*sw1, *sw2] == SW_SUCCESS => Ok(data.to_vec()),
        [.., sw1, sw2] => Err(TagIoError::Status {
            sw1: *sw1,
            sw2: *sw2,
        }),
        _ => Err(TagIoError::ShortRead(resp.len())),
    }
}

// Read: FF B0 MSB LSB Len
pub fn read_binary(card: &Card, block: u16, length: u8) -> Result<Vec<u8>, TagIoError> {
    let [msb, lsb] = block.to_be_bytes();
    transmit(card, &[0xFF, 0xB0, msb, lsb, length])
}

// Write: FF D6 MSB LSB Len [Data]
pub fn update_binary(card: &Card, block: u16, data: &[u8]) -> Result<(), TagIoError> {
    let [msb, lsb] = block.to_be_bytes();
    let mut apdu = vec![0xFF, 0xD6, msb, lsb, data.len() as u8];
    apdu.extend_from_slice(data);
    transmit(card, &apdu).map(|_| ())
}

// Get Data (UID): FF CA 00 00 00
pub fn get_uid(card: &Card) -> Result<Vec<u8>, TagIoError> {
    transmit(card, &[0xFF, 0xCA, 0x00, 0x00, 0x00])
}
