//! 방 관리 핸들러
//!
//! 클라이언트 메시지를 방 명령으로 바꿔 해당 방 액터에 전달한다.

use crate::protocol::ClientMessage;
use crate::room::{RoomCommand, RoomIntent};
use crate::state::AppState;
use std::sync::Arc;

/// 방 참여 처리. 방이 없으면 레지스트리가 새로 만든다.
pub fn handle_join_room(
    state: &Arc<AppState>,
    peer_id: &str,
    room_id: &str,
    session_id: &str,
    username: Option<String>,
    password: Option<String>,
) {
    let room_id = room_id.trim();
    let session_id = session_id.trim();
    if room_id.is_empty() || session_id.is_empty() {
        tracing::debug!(peer_id = %peer_id, "join_room without room or session id ignored");
        return;
    }

    tracing::debug!(peer_id = %peer_id, room_id = %room_id, session_id = %session_id, "handle_join_room");

    // 연결 종료 시 Disconnect 가 Join 뒤에 오도록 먼저 기록한다
    if !state.peers.attach(peer_id, room_id) {
        tracing::debug!(peer_id = %peer_id, room_id = %room_id, "join_room from closed connection ignored");
        return;
    }

    state.rooms.join(
        room_id,
        RoomCommand::Join {
            transport_id: peer_id.to_string(),
            session_id: session_id.to_string(),
            name: username,
            password,
        },
    );
}

/// 방 범위 요청 전달. 없는 방이면 무시한다.
pub fn handle_room_intent(state: &Arc<AppState>, peer_id: &str, message: ClientMessage) {
    let Some((room_id, intent)) = into_intent(message) else {
        return;
    };

    let delivered = state.rooms.send(
        room_id.trim(),
        RoomCommand::Intent {
            transport_id: peer_id.to_string(),
            intent,
        },
    );
    if !delivered {
        tracing::debug!(peer_id = %peer_id, room_id = %room_id, "Intent for unknown room dropped");
    }
}

/// 방 범위 클라이언트 메시지를 `(room_id, RoomIntent)` 로 변환
pub fn into_intent(message: ClientMessage) -> Option<(String, RoomIntent)> {
    let routed = match message {
        ClientMessage::Heartbeat | ClientMessage::JoinRoom { .. } => return None,
        ClientMessage::UpdateName { room_id, name } => (room_id, RoomIntent::UpdateName(name)),
        ClientMessage::SyncAction { room_id, action } => (room_id, RoomIntent::Sync(action)),
        ClientMessage::RequestSync { room_id } => (room_id, RoomIntent::RequestSync),
        ClientMessage::GetState { room_id } => (room_id, RoomIntent::GetState),
        ClientMessage::QueueAdd { room_id, video } => (room_id, RoomIntent::QueueAdd(video)),
        ClientMessage::QueueRemove { room_id, index } => (room_id, RoomIntent::QueueRemove(index)),
        ClientMessage::QueueReorder {
            room_id,
            from_index,
            to_index,
        } => (
            room_id,
            RoomIntent::QueueReorder {
                from: from_index,
                to: to_index,
            },
        ),
        ClientMessage::RequestQueueAdd { room_id, video } => {
            (room_id, RoomIntent::RequestQueueAdd(video))
        }
        ClientMessage::ResolveQueueRequest {
            room_id,
            video,
            approved,
        } => (room_id, RoomIntent::ResolveQueueRequest { video, approved }),
        ClientMessage::PlayNext {
            room_id,
            ended_video_id,
        } => (room_id, RoomIntent::PlayNext { ended_video_id }),
        ClientMessage::ToggleAutoplay { room_id } => (room_id, RoomIntent::ToggleAutoplay),
        ClientMessage::SetPassword { room_id, password } => {
            (room_id, RoomIntent::SetPassword(password))
        }
        ClientMessage::GrantAdmin {
            room_id,
            target_user_id,
        } => (room_id, RoomIntent::GrantAdmin(target_user_id)),
        ClientMessage::KickUser {
            room_id,
            target_user_id,
        } => (room_id, RoomIntent::KickUser(target_user_id)),
        ClientMessage::MuteUser {
            room_id,
            target_user_id,
            seconds,
        } => (
            room_id,
            RoomIntent::MuteUser {
                target: target_user_id,
                seconds,
            },
        ),
        ClientMessage::ChatMessage {
            room_id,
            message,
            image,
        } => (room_id, RoomIntent::Chat { message, image }),
    };
    Some(routed)
}
