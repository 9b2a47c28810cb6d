//! Integration tests for the live notification protocol.
//!
//! These mirror the server's wire messages and feed them into an engine
//! synchronizer, so the two sides of the channel stay in agreement.

use serde_json::json;
use threadline_engine::{
    Entity, HttpRemote, Notification, PushOutcome, Store, SyncConfig, Synchronizer, ThreadRef,
    Viewer,
};

fn synchronizer() -> Synchronizer<HttpRemote> {
    // Pushes never reach the remote; the address is never dialled.
    let remote = HttpRemote::new("http://127.0.0.1:9");
    let store = Store::new(
        ThreadRef::new("listing", 7),
        Viewer::user(7, "Ada"),
        SyncConfig::default(),
    );
    Synchronizer::new(remote, store)
}

#[cfg(test)]
mod protocol_tests {
    use super::*;

    #[test]
    fn test_client_ping_shape() {
        #[derive(serde::Deserialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        enum ClientMessage {
            Ping,
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_pong_is_ignored_by_clients() {
        let pong = Notification::from_json(&json!({"type": "pong"})).unwrap();
        assert_eq!(pong.kind().name(), "unknown");
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(ThreadRef::new("listing", 7).channel(), "comments_listing_7");
    }
}

#[cfg(test)]
mod push_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_push_from_another_client() {
        let sync = synchronizer();
        let entity = Entity::new(42, "Hello", 1_706_745_600_000);
        let raw = serde_json::to_value(Notification::created(&entity, None)).unwrap();

        assert_eq!(sync.handle_push_json(&raw).await, PushOutcome::Applied);
        assert_eq!(sync.top_level(), vec![42]);
        assert_eq!(sync.get_entity(42).unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn test_like_and_delete_pushes() {
        let sync = synchronizer();
        let entity = Entity::new(42, "Hello", 1_706_745_600_000);
        sync.handle_push(Notification::created(&entity, None)).await;

        let like = json!({"type": "like_toggle", "id": 42, "like_count": 3});
        assert_eq!(sync.handle_push_json(&like).await, PushOutcome::Applied);
        assert_eq!(sync.get_entity(42).unwrap().like_count, 3);

        let delete = json!({"type": "delete", "id": 42});
        sync.handle_push_json(&delete).await;
        assert!(sync.get_entity(42).is_none());
        assert!(sync.top_level().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_push_is_dropped() {
        let sync = synchronizer();
        let outcome = sync.handle_push_json(&json!({"type": "create", "id": "x"})).await;
        assert_eq!(outcome, PushOutcome::Ignored);
        assert!(sync.top_level().is_empty());
    }
}
