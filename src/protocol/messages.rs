//! 클라이언트-서버 메시지 프로토콜 정의

use serde::{Deserialize, Serialize};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Presence
    JoinRoom {
        room_id: String,
        session_id: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    UpdateName {
        room_id: String,
        name: String,
    },

    // Playback
    SyncAction {
        room_id: String,
        action: PlaybackAction,
    },
    RequestSync {
        room_id: String,
    },
    GetState {
        room_id: String,
    },

    // Queue
    QueueAdd {
        room_id: String,
        video: QueueItem,
    },
    QueueRemove {
        room_id: String,
        index: usize,
    },
    QueueReorder {
        room_id: String,
        from_index: usize,
        to_index: usize,
    },
    RequestQueueAdd {
        room_id: String,
        video: QueueItem,
    },
    ResolveQueueRequest {
        room_id: String,
        video: QueueItem,
        approved: bool,
    },
    PlayNext {
        room_id: String,
        #[serde(default)]
        ended_video_id: Option<String>,
    },
    ToggleAutoplay {
        room_id: String,
    },

    // Moderation
    SetPassword {
        room_id: String,
        #[serde(default)]
        password: Option<String>,
    },
    GrantAdmin {
        room_id: String,
        target_user_id: String,
    },
    KickUser {
        room_id: String,
        target_user_id: String,
    },
    MuteUser {
        room_id: String,
        target_user_id: String,
        seconds: u64,
    },

    // Chat
    ChatMessage {
        room_id: String,
        message: String,
        #[serde(default)]
        image: Option<String>,
    },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    // Connection
    Connected {
        socket_id: String,
    },
    HeartbeatAck,
    Error {
        code: String,
        message: String,
    },

    // Presence
    UserJoined {
        user: UserInfo,
        count: usize,
        admin: Option<String>,
    },
    UserUpdated {
        user: UserInfo,
    },
    UserLeft {
        user_id: String,
        count: usize,
        admin: Option<String>,
        #[serde(default)]
        kicked: bool,
    },
    AdminChanged {
        new_admin_id: String,
        new_admin_name: String,
    },
    PasswordRequired {
        room_id: String,
    },
    InvalidPassword {
        room_id: String,
        message: String,
    },
    DuplicateSession,
    Kicked {
        room_id: String,
        reason: String,
    },

    // Playback
    SyncState(RoomSnapshot),
    SyncAction {
        action: PlaybackAction,
        sender: String,
        time: f64,
        playing: bool,
    },
    SyncExact {
        time: f64,
        playing: bool,
    },

    // Queue
    QueueUpdated {
        queue: Vec<QueueItem>,
    },
    AdminQueueRequest {
        video: QueueItem,
        requested_by: String,
    },

    // Chat
    ChatMessage(ChatEntry),
}

impl ServerMessage {
    /// 시스템 채팅 메시지 생성
    pub fn system_chat(content: impl Into<String>) -> Self {
        ServerMessage::ChatMessage(ChatEntry {
            kind: ChatKind::System,
            user_id: None,
            name: None,
            content: content.into(),
            image: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn error(err: &crate::error::RoomError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// 재생 제어 동작
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek { time: f64 },
    ChangeVideo { video_id: String },
}

/// 대기열 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 초 단위
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub added_by: Option<String>,
}

impl QueueItem {
    /// 제목 또는 메타데이터가 빠져 있는지
    pub fn needs_metadata(&self) -> bool {
        self.title.is_none() || self.duration.map_or(true, |d| d <= 0.0)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// 사용자 공개 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub inactive: bool,
}

/// 방 전체 상태 스냅샷 (sync_state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub playing: bool,
    pub timestamp: f64,
    pub duration: f64,
    pub users: Vec<UserInfo>,
    pub admin: Option<String>,
    pub has_password: bool,
    /// 관리자에게 보내는 스냅샷에만 포함
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub queue: Vec<QueueItem>,
    pub auto_play_enabled: bool,
}

/// 방 목록 API 응답 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub user_count: usize,
    pub admin_name: String,
    pub current_title: Option<String>,
    pub playing: bool,
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    User,
    System,
}

/// 채팅 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_seek_intent() {
        let raw = json!({
            "type": "sync_action",
            "payload": {
                "room_id": "lobby",
                "action": { "kind": "seek", "time": 42.5 }
            }
        });

        let msg: ClientMessage = serde_json::from_value(raw).unwrap();

        match msg {
            ClientMessage::SyncAction { room_id, action } => {
                assert_eq!(room_id, "lobby");
                assert_eq!(action, PlaybackAction::Seek { time: 42.5 });
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn join_room_optional_fields_default_to_none() {
        let raw = json!({
            "type": "join_room",
            "payload": { "room_id": "lobby", "session_id": "s-1" }
        });

        let msg: ClientMessage = serde_json::from_value(raw).unwrap();

        assert!(matches!(
            msg,
            ClientMessage::JoinRoom { username: None, password: None, .. }
        ));
    }

    #[test]
    fn unit_events_serialize_with_snake_case_tag() {
        let value = serde_json::to_value(ServerMessage::DuplicateSession).unwrap();
        assert_eq!(value, json!({ "type": "duplicate_session" }));
    }

    #[test]
    fn snapshot_hides_absent_password() {
        let snapshot = RoomSnapshot {
            room_id: "r".into(),
            video_id: None,
            title: None,
            artist: None,
            playing: false,
            timestamp: 0.0,
            duration: 180.0,
            users: vec![],
            admin: None,
            has_password: true,
            password: None,
            queue: vec![],
            auto_play_enabled: true,
        };

        let value = serde_json::to_value(ServerMessage::SyncState(snapshot)).unwrap();

        assert_eq!(value["type"], "sync_state");
        assert_eq!(value["payload"]["has_password"], true);
        assert!(value["payload"].get("password").is_none());
    }
}
