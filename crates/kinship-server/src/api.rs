//! REST surface: conversation list, open, history reload, bulk mark-read,
//! friends presence and health. Every route except `/health` requires a
//! bearer token.

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use kinship_core::messages::{ConversationSummary, Identity, Message};
use kinship_core::{ChatError, ConversationId, UserId};
use kinship_store::FriendPresence;

use crate::auth::extract_token;
use crate::error::ApiError;
use crate::hub::HealthSnapshot;
use crate::server::AppState;

/// Authenticated caller of a REST route.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, None)
            .ok_or_else(|| ChatError::auth("missing bearer token"))?;
        Ok(Self(state.verifier.verify(&token)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatRequest {
    pub other_user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatResponse {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub success: bool,
    pub marked_count: usize,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendStatusView {
    #[serde(flatten)]
    pub friend: FriendPresence,
    pub online: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chats", get(list_chats).post(open_chat))
        .route("/api/chats/{id}/messages", get(chat_messages))
        .route("/api/chats/{id}/read", post(mark_read))
        .route("/api/presence/friends", get(friends_presence))
}

async fn health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.hub.health())
}

async fn list_chats(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let viewer = me.user_id;
    let list = state.hub.store().call(move |s| s.list_conversations(viewer)).await?;
    Ok(Json(list))
}

async fn open_chat(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(req): Json<OpenChatRequest>,
) -> Result<Json<OpenChatResponse>, ApiError> {
    state.hub.admit(&me).await?;
    let (a, b) = (me.user_id, req.other_user_id);
    let conversation_id = state.hub.store().call(move |s| s.open_conversation(a, b)).await?;
    Ok(Json(OpenChatResponse { conversation_id }))
}

async fn chat_messages(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(conversation): Path<ConversationId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let max = state.hub.config().history_limit;
    let limit = params.limit.unwrap_or(max).min(max).max(1);
    let store = state.hub.store();
    store.participants_of(conversation, me.user_id).await?;
    let history = store.call(move |s| s.load_history(conversation, limit)).await?;
    Ok(Json(history))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(conversation): Path<ConversationId>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let marked_count = state.hub.receipts().mark_read(conversation, me.user_id).await?;
    Ok(Json(MarkReadResponse {
        success: true,
        marked_count,
        conversation_id: conversation,
    }))
}

async fn friends_presence(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<FriendStatusView>>, ApiError> {
    let viewer = me.user_id;
    let friends = state.hub.store().call(move |s| s.accepted_friends(viewer)).await?;
    let directory = state.hub.directory();
    let views = friends
        .into_iter()
        .map(|friend| FriendStatusView {
            online: directory.is_online(friend.profile.user_id),
            friend,
        })
        .collect();
    Ok(Json(views))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    use crate::connection::test_support::identity;
    use crate::hub::test_support::hub;
    use crate::hub::{ChatHub, HubConfig};
    use crate::server::test_support::{state_for, StaticVerifier};
    use kinship_store::{ChatStore, FriendStatus};

    fn request(method: Method, uri: &str, user: Option<i64>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer user-{user}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn requires_bearer_token() {
        let (hub, _, _) = hub();
        let app = routes().with_state(state_for(hub, StaticVerifier));
        let resp = app.oneshot(request(Method::GET, "/api/chats", None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(resp).await["error"]["kind"], "auth");
    }

    #[tokio::test]
    async fn list_reports_unread_counts() {
        let (hub, store, conv) = hub();
        store.insert_message(conv, UserId::new(2), "one").unwrap();
        store.insert_message(conv, UserId::new(2), "two").unwrap();
        let app = routes().with_state(state_for(hub, StaticVerifier));

        let resp = app.oneshot(request(Method::GET, "/api/chats", Some(1), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body[0]["conversationId"], conv.get());
        assert_eq!(body[0]["unreadCount"], 2);
        assert_eq!(body[0]["peer"]["name"], "Bea");
    }

    #[tokio::test]
    async fn open_chat_is_canonical() {
        let (hub, _, conv) = hub();
        let app = routes().with_state(state_for(hub, StaticVerifier));

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/chats", Some(2), Some(serde_json::json!({"otherUserId": 1}))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["conversationId"], conv.get());

        let resp = app
            .oneshot(request(Method::POST, "/api/chats", Some(2), Some(serde_json::json!({"otherUserId": 2}))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_requires_participation_and_clamps_limit() {
        let (hub, store, conv) = hub();
        for i in 0..5 {
            store.insert_message(conv, UserId::new(1), &format!("m{i}")).unwrap();
        }
        let app = routes().with_state(state_for(hub, StaticVerifier));

        let uri = format!("/api/chats/{conv}/messages?limit=2");
        let resp = app.clone().oneshot(request(Method::GET, &uri, Some(2), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[1]["body"], "m4");

        let resp = app.oneshot(request(Method::GET, &uri, Some(3), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_limit_never_drops_below_one() {
        let (store, conv) = crate::storage::test_support::seeded();
        store.insert_message(conv, UserId::new(1), "only").unwrap();
        let config = HubConfig {
            history_limit: 0,
            ..HubConfig::default()
        };
        let hub = Arc::new(ChatHub::new(config, store));
        let app = routes().with_state(state_for(hub, StaticVerifier));

        for uri in [format!("/api/chats/{conv}/messages"), format!("/api/chats/{conv}/messages?limit=0")] {
            let resp = app.clone().oneshot(request(Method::GET, &uri, Some(1), None)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(json(resp).await.as_array().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn mark_read_fallback_matches_socket_path() {
        let (hub, store, conv) = hub();
        store.insert_message(conv, UserId::new(2), "hey").unwrap();
        let (bea, mut rb) = hub.connect(identity(2, "Bea"));
        hub.rooms().join(&bea.id, conv);
        let app = routes().with_state(state_for(Arc::clone(&hub), StaticVerifier));

        let uri = format!("/api/chats/{conv}/read");
        let resp = app.clone().oneshot(request(Method::POST, &uri, Some(1), None)).await.unwrap();
        let body = json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["markedCount"], 1);
        assert_eq!(body["conversationId"], conv.get());

        let names: Vec<_> = crate::connection::test_support::drain(&mut rb)
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(names, ["messages_read"]);

        let resp = app.oneshot(request(Method::POST, &uri, Some(1), None)).await.unwrap();
        assert_eq!(json(resp).await["markedCount"], 0);
    }

    #[tokio::test]
    async fn friends_presence_reports_online_flag() {
        let (hub, store, _) = hub();
        store.upsert_friendship(UserId::new(1), UserId::new(2), FriendStatus::Accepted).unwrap();
        store.upsert_friendship(UserId::new(3), UserId::new(1), FriendStatus::Pending).unwrap();
        let (_bea, _rb) = hub.connect(identity(2, "Bea"));
        let app = routes().with_state(state_for(hub, StaticVerifier));

        let resp = app
            .oneshot(request(Method::GET, "/api/presence/friends", Some(1), None))
            .await
            .unwrap();
        let body = json(resp).await;
        let friends = body.as_array().unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0]["userId"], 2);
        assert_eq!(friends[0]["online"], true);
        assert!(friends[0].get("lastActiveAt").is_some());
    }

    #[tokio::test]
    async fn health_is_public() {
        let (hub, _, _) = hub();
        let app = routes().with_state(state_for(hub, StaticVerifier));
        let resp = app.oneshot(request(Method::GET, "/health", None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["uptimeSecs"].is_number());
        assert_eq!(body["onlineUsers"], 0);
    }
}
