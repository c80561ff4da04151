// src/tag_io.rs
use std::future::Future;

use thiserror::Error;

/// Bytes per Type-2 tag page.
pub const PAGE_SIZE: usize = 4;

pub type Page = [u8; PAGE_SIZE];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagIoError {
    #[error("reader transmit failed: {0}")]
    Transmit(String),

    #[error("tag answered with status {sw1:02X}{sw2:02X}")]
    Status { sw1: u8, sw2: u8 },

    #[error("short page read: got {0} bytes")]
    ShortRead(usize),
}

/// Page-level access to a Type-2 tag.
///
/// Callers must not run two operations against the same tag at once; the
/// writer issues its calls strictly one after another.
pub trait TagIo {
    fn read_page(&mut self, page: u16) -> impl Future<Output = Result<Page, TagIoError>>;

    /// Writes one page. `Ok(false)` means the tag refused the write.
    fn write_page(
        &mut self,
        page: u16,
        data: &Page,
    ) -> impl Future<Output = Result<bool, TagIoError>>;
}
