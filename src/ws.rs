// src/ws.rs
use std::net::SocketAddr;

use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::sync::broadcast;
use warp::Filter;

use crate::commands;
use crate::types::{NfcCommand, OutgoingMessage};

pub async fn start_server(
    addr: SocketAddr,
    nfc_cmd_tx: Sender<NfcCommand>,
    events: broadcast::Sender<OutgoingMessage>,
) {
    // WS on the root path "/"
    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let nfc_cmd_tx = nfc_cmd_tx.clone();
            let events = events.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, nfc_cmd_tx, events))
        });

    let routes = ws_route.with(warp::cors().allow_any_origin());

    info!("WebSocket server running on ws://{}", addr);
    warp::serve(routes).run(addr).await;
}

async fn handle_connection(
    ws: warp::ws::WebSocket,
    nfc_cmd_tx: Sender<NfcCommand>,
    events: broadcast::Sender<OutgoingMessage>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let mut rx_broadcast = events.subscribe();

    // Broadcasts -> Client
    tokio::spawn(async move {
        while let Ok(msg) = rx_broadcast.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize {:?}: {}", msg, e);
                    continue;
                }
            };
            if client_ws_tx
                .send(warp::ws::Message::text(json))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Client -> NFC thread
    while let Some(result) = client_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        };
        let Ok(text) = msg.to_str() else {
            continue;
        };
        if let Some(reply) = commands::handle_client_text(text, &nfc_cmd_tx) {
            let _ = events.send(reply);
        }
    }
}
