// src/writer.rs
use log::{debug, info, warn};

use crate::error::WriteError;
use crate::tag_io::{PAGE_SIZE, Page, TagIo};

pub const CAPABILITY_CONTAINER_PAGE: u16 = 3;
/// Pages 0-3 hold the UID, lock bytes and capability container.
pub const FIRST_DATA_PAGE: u16 = 4;

// Capability container byte 2 -> total page count
const KNOWN_TAGS: &[(u8, u16)] = &[
    (0x12, 36),  // NTAG213
    (0x3E, 124), // NTAG215
    (0x6D, 218), // NTAG216
];

// Highest byte count the page cursor can address
const MAX_ADDRESSABLE_BYTES: usize = (u16::MAX - FIRST_DATA_PAGE) as usize * PAGE_SIZE;

type Result<T, E = WriteError> = std::result::Result<T, E>;

/// How much of a tag is available for the NDEF buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCapacity {
    Known { total_pages: u16 },
    /// Subtype not recognised: pages are written until the tag refuses one.
    Unknown,
}

impl TagCapacity {
    pub fn from_capability_container(cc: &Page) -> Self {
        KNOWN_TAGS
            .iter()
            .find(|(size_byte, _)| *size_byte == cc[2])
            .map(|&(_, total_pages)| Self::Known { total_pages })
            .unwrap_or(Self::Unknown)
    }

    /// Bytes from page 4 to the end of the tag, if known.
    pub fn data_bytes(&self) -> Option<usize> {
        match *self {
            Self::Known { total_pages } => {
                Some(total_pages.saturating_sub(FIRST_DATA_PAGE) as usize * PAGE_SIZE)
            }
            Self::Unknown => None,
        }
    }
}

/// Attempts per step. Retries happen back to back, without delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub capability_read_attempts: u32,
    pub page_write_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            capability_read_attempts: 1,
            page_write_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    ReadingCapability,
    Validating,
    Writing { page: u16 },
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct WriteCursor {
    page: u16,
    offset: usize,
}

impl WriteCursor {
    fn new() -> Self {
        Self {
            page: FIRST_DATA_PAGE,
            offset: 0,
        }
    }

    fn advance(&mut self) {
        self.page += 1;
        self.offset += PAGE_SIZE;
    }

    fn pages_written(&self) -> u16 {
        self.page - FIRST_DATA_PAGE
    }
}

/// Writes a framed NDEF buffer to a Type-2 tag.
#[derive(Debug, Clone, Default)]
pub struct TagWriter {
    policy: RetryPolicy,
}

impl TagWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Reads the tag size, checks `buffer` fits and writes it from page 4.
    ///
    /// Nothing is written when the size check fails. A page that fails every
    /// attempt aborts the write; pages already written are left in place.
    pub async fn write_tag<T: TagIo>(&self, buffer: &[u8], tag: &mut T) -> Result<()> {
        let mut state = WriterState::Idle;
        let result = self.run(buffer, tag, &mut state).await;
        match &result {
            Ok(()) => {
                transition(&mut state, WriterState::Done);
                info!("wrote {} bytes to tag", buffer.len());
            }
            Err(err) => {
                transition(&mut state, WriterState::Failed);
                warn!("tag write failed: {err}");
            }
        }
        result
    }

    async fn run<T: TagIo>(
        &self,
        buffer: &[u8],
        tag: &mut T,
        state: &mut WriterState,
    ) -> Result<()> {
        // 1. Capability container -> capacity
        transition(state, WriterState::ReadingCapability);
        let cc = self.read_capability(tag).await?;
        let capacity = TagCapacity::from_capability_container(&cc);
        debug!("capability container {cc:02X?} -> {capacity:?}");

        // 2. Fail before touching the tag if the buffer can't fit
        transition(state, WriterState::Validating);
        let available = capacity.data_bytes().unwrap_or(MAX_ADDRESSABLE_BYTES);
        if buffer.len() > available {
            return Err(WriteError::TagTooSmall {
                required: buffer.len(),
                available,
            });
        }

        // 3. One page at a time, zero padding the last
        let mut cursor = WriteCursor::new();
        while cursor.offset < buffer.len() {
            transition(state, WriterState::Writing { page: cursor.page });

            let end = (cursor.offset + PAGE_SIZE).min(buffer.len());
            let mut block: Page = [0; PAGE_SIZE];
            block[..end - cursor.offset].copy_from_slice(&buffer[cursor.offset..end]);

            if !self.write_page(tag, cursor.page, &block).await {
                return Err(WriteError::PageWriteFailed {
                    page: cursor.page,
                    pages_written: cursor.pages_written(),
                });
            }
            cursor.advance();
        }

        Ok(())
    }

    async fn read_capability<T: TagIo>(&self, tag: &mut T) -> Result<Page> {
        let attempts = self.policy.capability_read_attempts.max(1);
        let mut attempt = 1;
        loop {
            match tag.read_page(CAPABILITY_CONTAINER_PAGE).await {
                Ok(cc) => return Ok(cc),
                Err(err) if attempt < attempts => {
                    warn!("capability container read {attempt}/{attempts} failed: {err}");
                    attempt += 1;
                }
                Err(err) => return Err(WriteError::CapabilityReadFailed(err)),
            }
        }
    }

    async fn write_page<T: TagIo>(&self, tag: &mut T, page: u16, block: &Page) -> bool {
        let attempts = self.policy.page_write_attempts.max(1);
        for attempt in 1..=attempts {
            match tag.write_page(page, block).await {
                Ok(true) => return true,
                Ok(false) => warn!("page {page} write rejected ({attempt}/{attempts})"),
                Err(err) => warn!("page {page} write {attempt}/{attempts} failed: {err}"),
            }
        }
        false
    }
}

fn transition(state: &mut WriterState, next: WriterState) {
    debug!("writer: {state:?} -> {next:?}");
    *state = next;
}
