//! Encodes NDEF records into the Type-2 (Ultralight / NTAG) tag layout and
//! writes them to a tag page by page.
//!
//! The tag itself is reached through the [`tag_io::TagIo`] capability, so the
//! encoder and writer run the same against a PC/SC reader or an in-memory tag.

pub mod apdu;
pub mod cards;
pub mod commands;
pub mod config;
pub mod error;
pub mod ndef;
pub mod nfc_service;
pub mod tag_io;
pub mod types;
pub mod writer;
pub mod ws;
