//! Realtime protocol: handshake credentials, client messages and server events.

mod registry;

pub use registry::{ConnectionRegistry, MAX_CHANNEL_ROOMS, Room};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthContext, CredentialSource};

/// Credentials presented on the WebSocket upgrade request.
///
/// Checked once by the verification gate; later messages are not re-verified.
pub struct Handshake<'a> {
    headers: &'a HeaderMap,
}

impl<'a> Handshake<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self { headers }
    }
}

impl CredentialSource for Handshake<'_> {
    fn headers(&self) -> &HeaderMap {
        self.headers
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to the rooms of channels the client is a member of
    JoinChannels {
        #[serde(rename = "channelIds")]
        channel_ids: Vec<i64>,
    },
    /// Tell another user they have a new notification
    NewNotification { to: i64 },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection established with the verified identity
    Connected { user: AuthContext },
    /// Channel rooms joined in response to `join_channels`
    Joined {
        #[serde(rename = "channelIds")]
        channel_ids: Vec<i64>,
    },
    Notification,
    /// Ping to keep connection alive
    Ping,
    Error { message: String },
}

/// Apply one text frame from connection `id`. Returns the reply for the sender, if any.
pub fn handle_client_message(
    registry: &ConnectionRegistry,
    id: Uuid,
    text: &str,
) -> Option<ServerEvent> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable realtime message");
            return Some(ServerEvent::Error {
                message: "Invalid message".into(),
            });
        }
    };

    match message {
        ClientMessage::JoinChannels { channel_ids } => {
            let joined = registry.join_channels(id, &channel_ids);
            Some(ServerEvent::Joined {
                channel_ids: joined,
            })
        }
        ClientMessage::NewNotification { to } => {
            let delivered = registry.emit(Room::User(to), ServerEvent::Notification);
            tracing::debug!(to, delivered, "Relayed notification");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::db::UserRole;

    #[test]
    fn test_server_event_json() {
        let event = ServerEvent::Connected {
            user: AuthContext {
                user_id: 3,
                organization_id: Some(1),
                department_id: None,
                role: UserRole::Student,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["user"]["userId"], 3);
        assert_eq!(json["user"]["organizationId"], 1);

        let json = serde_json::to_value(ServerEvent::Notification).unwrap();
        assert_eq!(json, serde_json::json!({"type": "notification"}));
    }

    #[test]
    fn test_join_channels_message() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(1, tx);

        let reply = handle_client_message(
            &registry,
            id,
            r#"{"type":"join_channels","channelIds":[4,5]}"#,
        );

        assert_eq!(
            reply,
            Some(ServerEvent::Joined {
                channel_ids: vec![4, 5]
            })
        );
        assert_eq!(registry.members(Room::Channel(4)), 1);
    }

    #[test]
    fn test_new_notification_relays_to_user_room() {
        let registry = ConnectionRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let sender = registry.register(1, tx_a);
        registry.register(2, tx_b);

        let reply = handle_client_message(&registry, sender, r#"{"type":"new_notification","to":2}"#);

        assert_eq!(reply, None);
        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::Notification);
    }

    #[test]
    fn test_garbage_gets_error_reply() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(1, tx);

        let reply = handle_client_message(&registry, id, "not json");
        assert!(matches!(reply, Some(ServerEvent::Error { .. })));
    }

    #[test]
    fn test_handshake_reads_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());

        assert_eq!(Handshake::new(&headers).bearer_token(), Some("abc"));
    }
}
