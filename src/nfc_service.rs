// src/nfc_service.rs
use std::collections::HashMap;
use std::ffi::{CStr, CString};

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use pcsc::{Context, PNP_NOTIFICATION, Protocols, ReaderState, Scope, ShareMode, State};
use tokio::sync::broadcast::Sender;

use crate::cards::PcscTag;
use crate::commands;
use crate::config::Config;
use crate::error::NfcError;
use crate::types::{InputRecord, NfcCommand, OutgoingMessage};
use crate::writer::TagWriter;

/// NFC thread main loop. Blocks; run it on a dedicated OS thread.
///
/// Commands are handled one at a time, so write requests never overlap on
/// the same tag.
pub fn run(config: Config, tx: Sender<OutgoingMessage>, rx: Receiver<NfcCommand>) {
    info!("Starting NFC Service (Event Driven)...");

    let ctx = match Context::establish(Scope::User) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to establish context: {}", err);
            let _ = tx.send(OutgoingMessage::ReaderError {
                error: err.to_string(),
            });
            return;
        }
    };

    let writer = TagWriter::new(config.retry_policy);
    info!("Retry policy: {:?}", writer.policy());
    let mut readers_buf = [0; 2048];
    let mut reader_names: Vec<CString> = Vec::new();
    // UID of the tag currently on each reader
    let mut present_uids: HashMap<CString, String> = HashMap::new();

    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];

    loop {
        // 1. Wait for State Change
        if let Err(err) = ctx.get_status_change(config.poll_interval, &mut reader_states) {
            if err != pcsc::Error::Timeout {
                error!("PCSC Error: {}", err);
                std::thread::sleep(std::time::Duration::from_secs(1));
                continue;
            }
        }

        // 2. CHECK FOR COMMANDS
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                NfcCommand::Write { records, payload } => {
                    info!("Received write command with {} records", records.len());
                    let result = write_to_first_tag(&ctx, &reader_names, &writer, &records);
                    let _ = tx.send(commands::write_reply(result, payload));
                }
                NfcCommand::CheckReaderStatus => {
                    reader_names = list_readers(&ctx, &mut readers_buf);
                    watch_readers(&mut reader_states, &reader_names);
                    present_uids.retain(|name, _| reader_names.contains(name));
                    let _ = tx.send(OutgoingMessage::ReaderStatus {
                        success: !reader_names.is_empty(),
                    });
                }
            }
        }

        // 3. PROCESS EVENTS
        let mut readers_changed = false;

        // Check PnP (Index 0)
        if reader_states[0].event_state().intersects(State::CHANGED) {
            info!("Hardware change detected");
            readers_changed = true;
            reader_states[0].sync_current_state();
        }

        // Check Readers (Indices 1..)
        for rs in reader_states.iter_mut().skip(1) {
            if !rs.event_state().intersects(State::CHANGED) {
                continue;
            }
            let name = rs.name().to_owned();
            let current = rs.event_state();

            // Tag presented
            if current.intersects(State::PRESENT) && !rs.current_state().intersects(State::PRESENT)
            {
                info!("Tag presented on {:?}", name);
                if let Some(uid) = handle_tag_presented(&ctx, &name, &tx) {
                    present_uids.insert(name.clone(), uid);
                }
            }

            // Tag removed
            if current.intersects(State::EMPTY) && rs.current_state().intersects(State::PRESENT) {
                info!("Tag removed from {:?}", name);
                let uid = present_uids.remove(&name).unwrap_or_default();
                let _ = tx.send(OutgoingMessage::TagRemoved { uid });
            }

            rs.sync_current_state();
        }

        // 4. REFRESH LIST
        if readers_changed {
            reader_names = list_readers(&ctx, &mut readers_buf);
            watch_readers(&mut reader_states, &reader_names);
            present_uids.retain(|name, _| reader_names.contains(name));

            let _ = tx.send(OutgoingMessage::ReaderStatus {
                success: !reader_names.is_empty(),
            });
        }
    }
}

// Keep the PnP state (index 0), rebuild the rest
fn watch_readers(reader_states: &mut Vec<ReaderState>, reader_names: &[CString]) {
    reader_states.truncate(1);
    for name in reader_names {
        reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
    }
}

fn list_readers(ctx: &Context, buf: &mut [u8]) -> Vec<CString> {
    match ctx.list_readers(buf) {
        Ok(iter) => iter.map(CString::from).collect(),
        Err(err) => {
            debug!("No readers listed: {}", err);
            Vec::new()
        }
    }
}

fn handle_tag_presented(
    ctx: &Context,
    reader_name: &CStr,
    tx: &Sender<OutgoingMessage>,
) -> Option<String> {
    let card = match ctx.connect(reader_name, ShareMode::Shared, Protocols::ANY) {
        Ok(card) => card,
        Err(e) => {
            error!("Failed to connect to tag: {}", e);
            return None;
        }
    };

    match PcscTag::new(&card).uid() {
        Ok(uid) => {
            let _ = tx.send(OutgoingMessage::TagPresented { uid: uid.clone() });
            Some(uid)
        }
        Err(e) => {
            warn!("Could not read tag UID: {}", e);
            None
        }
    }
}

fn write_to_first_tag(
    ctx: &Context,
    reader_names: &[CString],
    writer: &TagWriter,
    records: &[InputRecord],
) -> Result<(), NfcError> {
    if reader_names.is_empty() {
        return Err(NfcError::NoReader);
    }

    // First reader with a tag on it gets the write
    let card = reader_names
        .iter()
        .find_map(|name| ctx.connect(name, ShareMode::Shared, Protocols::ANY).ok())
        .ok_or(NfcError::NoTag)?;

    let mut tag = PcscTag::new(&card);
    futures::executor::block_on(commands::write_ndef(writer, &mut tag, records))
}
