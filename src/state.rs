//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::protocol::ServerMessage;
use crate::provider::VideoProvider;
use crate::room::RoomRegistry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 방 레지스트리 (room_id -> 방 액터)
    pub rooms: Arc<RoomRegistry>,
    /// 피어 세션 (peer_id -> PeerSession)
    pub peers: Arc<PeerRegistry>,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn VideoProvider>) -> Self {
        let peers = Arc::new(PeerRegistry::new());
        let rooms = RoomRegistry::new(peers.clone(), provider, config.room.clone());
        Self {
            rooms,
            peers,
            config: Arc::new(config),
        }
    }
}

/// 피어 세션 정보
pub struct PeerSession {
    pub id: String,
    /// 이 연결이 참여 중인 방 목록
    pub rooms: DashSet<String>,
    pub sender: UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
}

/// 연결된 트랜스포트 목록. 방 액터는 이것을 통해서만 메시지를 내보낸다.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<String, PeerSession>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: String, sender: UnboundedSender<ServerMessage>) {
        self.peers.insert(
            id.clone(),
            PeerSession {
                id,
                rooms: DashSet::new(),
                sender,
                connected_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, peer_id: &str) -> Option<PeerSession> {
        self.peers.remove(peer_id).map(|(_, session)| session)
    }

    /// 특정 피어에게 메시지 전송
    pub fn send(&self, peer_id: &str, message: ServerMessage) -> bool {
        match self.peers.get(peer_id) {
            Some(session) => session.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// 트랜스포트가 아직 살아 있는지 확인
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.peers
            .get(peer_id)
            .map(|session| !session.sender.is_closed())
            .unwrap_or(false)
    }

    /// 피어가 참여한 방을 기록한다. 이미 끊긴 피어면 `false`.
    pub fn attach(&self, peer_id: &str, room_id: &str) -> bool {
        match self.peers.get(peer_id) {
            Some(session) => {
                session.rooms.insert(room_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn detach(&self, peer_id: &str, room_id: &str) {
        if let Some(session) = self.peers.get(peer_id) {
            session.rooms.remove(room_id);
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn closed_receiver_counts_as_disconnected() {
        let peers = PeerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert("p1".into(), tx);

        assert!(peers.is_connected("p1"));
        drop(rx);
        assert!(!peers.is_connected("p1"));
        assert!(!peers.is_connected("missing"));
    }

    #[test]
    fn attach_and_detach_track_rooms() {
        let peers = PeerRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        peers.insert("p1".into(), tx);

        assert!(peers.attach("p1", "lobby"));
        assert!(peers.attach("p1", "movies"));
        assert!(!peers.attach("missing", "lobby"));
        peers.detach("p1", "lobby");

        let session = peers.remove("p1").unwrap();
        let rooms: Vec<String> = session.rooms.into_iter().collect();
        assert_eq!(rooms, vec!["movies".to_string()]);
    }
}
