// src/cards.rs
use log::warn;
use pcsc::Card;

use crate::apdu;
use crate::tag_io::{PAGE_SIZE, Page, TagIo, TagIoError};

/// A Type-2 tag reached through a connected PC/SC card handle.
///
/// The PC/SC calls block the calling thread until the reader answers, so the
/// returned futures complete on first poll.
pub struct PcscTag<'a> {
    card: &'a Card,
}

impl<'a> PcscTag<'a> {
    pub fn new(card: &'a Card) -> Self {
        Self { card }
    }

    /// Tag UID as upper-case hex.
    pub fn uid(&self) -> Result<String, TagIoError> {
        apdu::get_uid(self.card).map(hex::encode_upper)
    }
}

impl TagIo for PcscTag<'_> {
    async fn read_page(&mut self, page: u16) -> Result<Page, TagIoError> {
        // Some readers hand back four pages (16 bytes) for one READ
        let data = apdu::read_binary(self.card, page, PAGE_SIZE as u8)?;
        data.get(..PAGE_SIZE)
            .and_then(|bytes| Page::try_from(bytes).ok())
            .ok_or(TagIoError::ShortRead(data.len()))
    }

    async fn write_page(&mut self, page: u16, data: &Page) -> Result<bool, TagIoError> {
        match apdu::update_binary(self.card, page, data) {
            Ok(()) => Ok(true),
            Err(TagIoError::Status { sw1, sw2 }) => {
                warn!("tag refused page {page}: {sw1:02X}{sw2:02X}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
