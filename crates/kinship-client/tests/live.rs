//! Client state driven by a real server over both transports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use kinship_client::{ApiClient, ChatSocket, ClientError, Reconciler};
use kinship_core::events::{ConversationRef, SendMessage};
use kinship_core::messages::Identity;
use kinship_core::{ChatError, ClientEvent, ConversationId, ErrorKind, ServerEvent, UserId};
use kinship_server::config::ServerConfig;
use kinship_server::{ChatServer, IdentityVerifier, ServerHandle};
use kinship_store::{ChatStore, Database, SqliteChatStore};

const TIMEOUT: Duration = Duration::from_secs(5);

struct NamedTokens;

impl IdentityVerifier for NamedTokens {
    fn verify(&self, token: &str) -> Result<Identity, ChatError> {
        match token {
            "ada" => Ok(Identity::new(UserId::new(1), "Ada")),
            "bea" => Ok(Identity::new(UserId::new(2), "Bea")),
            _ => Err(ChatError::auth("unknown token")),
        }
    }
}

async fn boot() -> (ServerHandle, ConversationId) {
    let store = Arc::new(SqliteChatStore::new(Database::in_memory().unwrap()));
    store.upsert_user(&Identity::new(UserId::new(1), "Ada")).unwrap();
    store.upsert_user(&Identity::new(UserId::new(2), "Bea")).unwrap();
    let conv = store.open_conversation(UserId::new(1), UserId::new(2)).unwrap();
    let handle = ChatServer::new(ServerConfig::default(), store, Arc::new(NamedTokens))
        .listen()
        .await
        .unwrap();
    (handle, conv)
}

async fn wait_online(handle: &ServerHandle, user: i64) {
    wait_presence(handle, user, true).await;
}

async fn wait_presence(handle: &ServerHandle, user: i64, online: bool) {
    timeout(TIMEOUT, async {
        while handle.hub().directory().is_online(UserId::new(user)) != online {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for presence");
}

#[tokio::test]
async fn notification_counts_once_and_http_read_clears_it() {
    let (handle, conv) = boot().await;
    let http = format!("http://{}", handle.addr);
    let ws = format!("ws://{}", handle.addr);

    let ada_api = ApiClient::new(&http, "ada");
    let mut ada = Reconciler::new(UserId::new(1), ada_api.list_chats().await.unwrap());
    assert_eq!(ada.unread(conv), 0);
    let mut ada_socket = ChatSocket::connect(&ws, "ada").await.unwrap();
    wait_online(&handle, 1).await;

    let bea_socket = ChatSocket::connect(&ws, "bea").await.unwrap();
    wait_online(&handle, 2).await;
    bea_socket
        .send(ClientEvent::SendMessage(SendMessage {
            conversation_id: conv,
            body: "hello Ada".into(),
            recipient_id: UserId::new(1),
            client_message_id: Some("b-1".into()),
        }))
        .await
        .unwrap();

    timeout(TIMEOUT, async {
        loop {
            let event = ada_socket.next_event().await.expect("socket closed");
            let notified = matches!(event, ServerEvent::NewMessageNotification(_));
            ada.apply(&event, Instant::now());
            if notified {
                break;
            }
        }
    })
    .await
    .expect("timeout waiting for notification");

    assert!(ada.is_online(UserId::new(2)));
    assert_eq!(ada.unread(conv), 1);
    let top = ada.conversations().iter().next().unwrap();
    assert_eq!(top.last_message.as_deref(), Some("hello Ada"));

    assert_eq!(ada.open_conversation(conv, &ada_api).await.unwrap(), 1);
    assert_eq!(ada.unread(conv), 0);

    // A fresh snapshot agrees with the optimistic state.
    ada.reconnect(ada_api.list_chats().await.unwrap());
    assert_eq!(ada.unread(conv), 0);

    bea_socket.close();
    handle.shutdown().await;
}

#[tokio::test]
async fn rejected_http_request_surfaces_kind() {
    let (handle, conv) = boot().await;
    let api = ApiClient::new(format!("http://{}", handle.addr), "nobody");
    let err = api.history(conv, None).await.unwrap_err();
    match err {
        ClientError::Rejected { status, kind, .. } => {
            assert_eq!(status, 401);
            assert_eq!(kind, Some(ErrorKind::Auth));
        }
        other => panic!("unexpected {other:?}"),
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn own_echo_resolves_pending_send() {
    let (handle, conv) = boot().await;
    let ws = format!("ws://{}", handle.addr);
    let mut bea = Reconciler::new(UserId::new(2), Vec::new());
    let mut socket = ChatSocket::connect(&ws, "bea").await.unwrap();
    wait_online(&handle, 2).await;

    socket
        .send(ClientEvent::JoinChat(ConversationRef { conversation_id: conv }))
        .await
        .unwrap();
    let history = timeout(TIMEOUT, async {
        loop {
            if let ServerEvent::ChatHistory(h) = socket.next_event().await.expect("socket closed") {
                break h;
            }
        }
    })
    .await
    .expect("timeout waiting for history");
    assert!(history.is_empty());

    let frame = bea.send(
        SendMessage {
            conversation_id: conv,
            body: "ping".into(),
            recipient_id: UserId::new(1),
            client_message_id: Some("b-7".into()),
        },
        Instant::now(),
    );
    socket.send(frame).await.unwrap();
    assert_eq!(bea.sends().len(), 1);

    timeout(TIMEOUT, async {
        loop {
            let event = socket.next_event().await.expect("socket closed");
            let echo = matches!(event, ServerEvent::NewMessage(_));
            bea.apply(&event, Instant::now());
            if echo {
                break;
            }
        }
    })
    .await
    .expect("timeout waiting for echo");
    assert!(bea.sends().is_empty());
    assert_eq!(bea.total_unread(), 0);

    socket.close();
    handle.shutdown().await;
}

fn message_to_ada(conv: ConversationId, body: &str) -> ClientEvent {
    ClientEvent::SendMessage(SendMessage {
        conversation_id: conv,
        body: body.to_owned(),
        recipient_id: UserId::new(1),
        client_message_id: None,
    })
}

/// Wait for `n` room echoes on a socket joined to the conversation.
async fn await_echoes(socket: &mut ChatSocket, n: usize) {
    timeout(TIMEOUT, async {
        let mut seen = 0;
        while seen < n {
            if let ServerEvent::NewMessage(_) = socket.next_event().await.expect("socket closed") {
                seen += 1;
            }
        }
    })
    .await
    .expect("timeout waiting for echoes");
}

#[tokio::test]
async fn unread_after_reconnect_matches_messages_sent_during_gap() {
    let (handle, conv) = boot().await;
    let http = format!("http://{}", handle.addr);
    let ws = format!("ws://{}", handle.addr);
    let ada_api = ApiClient::new(&http, "ada");

    let mut ada = Reconciler::new(UserId::new(1), ada_api.list_chats().await.unwrap());
    let mut ada_socket = ChatSocket::connect(&ws, "ada").await.unwrap();
    wait_online(&handle, 1).await;

    let mut bea_socket = ChatSocket::connect(&ws, "bea").await.unwrap();
    wait_online(&handle, 2).await;
    bea_socket
        .send(ClientEvent::JoinChat(ConversationRef { conversation_id: conv }))
        .await
        .unwrap();
    timeout(TIMEOUT, async {
        while !matches!(bea_socket.next_event().await, Some(ServerEvent::ChatHistory(_))) {}
    })
    .await
    .expect("timeout waiting for history");

    // Before the gap: a live message is counted, then read.
    bea_socket.send(message_to_ada(conv, "before")).await.unwrap();
    await_echoes(&mut bea_socket, 1).await;
    timeout(TIMEOUT, async {
        loop {
            let event = ada_socket.next_event().await.expect("socket closed");
            let notified = matches!(event, ServerEvent::NewMessageNotification(_));
            ada.apply(&event, Instant::now());
            if notified {
                break;
            }
        }
    })
    .await
    .expect("timeout waiting for notification");
    assert_eq!(ada.unread(conv), 1);
    assert!(ada.is_online(UserId::new(2)));
    assert_eq!(ada.open_conversation(conv, &ada_api).await.unwrap(), 1);
    ada.close();

    // A stale begin_read leaves a pending entry that must not survive.
    ada.begin_read(conv);
    assert_eq!(ada.pending_read(conv), Some(0));

    ada_socket.close();
    wait_presence(&handle, 1, false).await;

    for body in ["one", "two", "three"] {
        bea_socket.send(message_to_ada(conv, body)).await.unwrap();
    }
    await_echoes(&mut bea_socket, 3).await;

    ada.reconnect(ada_api.list_chats().await.unwrap());
    assert_eq!(ada.unread(conv), 3);
    assert_eq!(ada.total_unread(), 3);
    assert_eq!(ada.pending_read(conv), None);
    assert!(!ada.is_online(UserId::new(2)));

    bea_socket.close();
    handle.shutdown().await;
}
