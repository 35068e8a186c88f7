//! 연결 핸들러

use crate::protocol::ServerMessage;
use crate::room::RoomCommand;
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// 새 연결 처리
pub fn handle_connection(state: &Arc<AppState>, sender: UnboundedSender<ServerMessage>) -> String {
    let peer_id = Uuid::new_v4().to_string();

    state.peers.insert(peer_id.clone(), sender.clone());

    let _ = sender.send(ServerMessage::Connected {
        socket_id: peer_id.clone(),
    });

    tracing::info!(peer_id = %peer_id, "New connection established");
    peer_id
}

/// 연결 해제 처리. 참여 중이던 모든 방에 알린다.
pub fn handle_disconnect(state: &Arc<AppState>, peer_id: &str) {
    let Some(session) = state.peers.remove(peer_id) else {
        return;
    };

    let rooms: Vec<String> = session.rooms.iter().map(|r| r.key().clone()).collect();
    for room_id in &rooms {
        state.rooms.send(
            room_id,
            RoomCommand::Disconnect {
                transport_id: peer_id.to_string(),
            },
        );
    }

    tracing::info!(
        peer_id = %session.id,
        rooms = rooms.len(),
        connected_secs = session.connected_at.elapsed().as_secs(),
        "Connection closed"
    );
}

/// Heartbeat 처리
pub fn handle_heartbeat(sender: &UnboundedSender<ServerMessage>) {
    let _ = sender.send(ServerMessage::HeartbeatAck);
}
