use crossbeam_channel::unbounded;
use log::info;
use tokio::sync::broadcast;

use nfc_ndef_writer::config::Config;
use nfc_ndef_writer::types::{NfcCommand, OutgoingMessage};
use nfc_ndef_writer::{nfc_service, ws};

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = Config::from_env();
    info!("Starting NFC NDEF writer with {:?}", config);

    // Channel: WS -> NFC (Commands)
    // Crossbeam (sync) because the NFC thread blocks on PC/SC
    let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();

    // Channel: NFC -> WS (Events); broadcast send is sync, usable from the NFC thread
    let (event_tx, _) = broadcast::channel::<OutgoingMessage>(100);

    let nfc_config = config.clone();
    let nfc_event_tx = event_tx.clone();
    std::thread::spawn(move || {
        nfc_service::run(nfc_config, nfc_event_tx, cmd_rx);
    });

    ws::start_server(config.bind_address, cmd_tx, event_tx).await;
}
