//! Inbound event dispatch. Every handler isolates its own failure: the
//! error is reported to the originating connection and the read loop goes
//! on with the next frame.

use tracing::{debug, warn};

use kinship_core::events::ErrorEvent;
use kinship_core::{ChatError, ClientEvent, ServerEvent};

use crate::connection::ClientConnection;
use crate::hub::ChatHub;

/// Parse and handle one text frame from `conn`.
pub async fn handle_frame(hub: &ChatHub, conn: &ClientConnection, text: &str) {
    match ClientEvent::from_frame(text) {
        Ok(event) => handle_event(hub, conn, event).await,
        Err(e) => report(conn, &e, None),
    }
}

pub async fn handle_event(hub: &ChatHub, conn: &ClientConnection, event: ClientEvent) {
    let result = dispatch(hub, conn, &event).await;
    if let Err(e) = result {
        report(conn, &e, Some(&event));
    }
}

async fn dispatch(hub: &ChatHub, conn: &ClientConnection, event: &ClientEvent) -> Result<(), ChatError> {
    debug!(connection_id = %conn.id, event = event.name(), "inbound event");
    match event {
        ClientEvent::JoinChat(r) => hub.join_chat(conn, r.conversation_id).await.map(drop),
        ClientEvent::SendMessage(m) => hub.pipeline().send_message(&conn.identity, m.clone()).await.map(drop),
        ClientEvent::Typing(r) => hub.receipts().typing_start(conn, r.conversation_id).map(drop),
        ClientEvent::StopTyping(r) => hub.receipts().typing_stop(conn, r.conversation_id).map(drop),
        ClientEvent::MarkMessagesRead(r) => hub
            .receipts()
            .mark_read(r.conversation_id, conn.user_id())
            .await
            .map(drop),
        ClientEvent::SendFriendRequest(f) => hub
            .notifications()
            .relay_friend_request(conn.user_id(), f.recipient_id)
            .await
            .map(drop),
    }
}

/// Report a frame that never became an event (binary payload, bad encoding).
pub fn reject(conn: &ClientConnection, err: ChatError) {
    report(conn, &err, None);
}

fn report(conn: &ClientConnection, err: &ChatError, event: Option<&ClientEvent>) {
    if err.is_silent() {
        debug!(connection_id = %conn.id, error = %err, "silent failure");
        return;
    }
    warn!(
        connection_id = %conn.id,
        user_id = %conn.user_id(),
        request = event.map(|e| e.name()),
        kind = err.kind().as_str(),
        error = %err,
        "request failed"
    );
    let mut report = ErrorEvent::from_error(err);
    if let Some(event) = event {
        report = report.for_request(event);
    }
    conn.send_event(&ServerEvent::from(report));
}
