//! 방 레지스트리
//!
//! room_id 별 액터 채널을 보관한다. 방은 첫 참여 요청에서 생성되고, 빈 방
//! 삭제 타이머가 만료되면 액터가 스스로 레지스트리에서 빠진다.

use super::actor::RoomActor;
use super::RoomCommand;
use crate::config::RoomConfig;
use crate::protocol::RoomSummary;
use crate::provider::VideoProvider;
use crate::state::PeerRegistry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;

struct RoomHandle {
    /// 같은 이름으로 다시 만들어진 방과 구분하기 위한 번호
    instance: u64,
    tx: UnboundedSender<RoomCommand>,
}

pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    peers: Arc<PeerRegistry>,
    provider: Arc<dyn VideoProvider>,
    config: RoomConfig,
    instance_seq: AtomicU64,
}

impl RoomRegistry {
    pub fn new(
        peers: Arc<PeerRegistry>,
        provider: Arc<dyn VideoProvider>,
        config: RoomConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            peers,
            provider,
            config,
            instance_seq: AtomicU64::new(0),
        })
    }

    /// 참여 요청 전달. 방이 없으면 새로 만든다.
    pub fn join(self: &Arc<Self>, room_id: &str, command: RoomCommand) {
        let mut command = command;
        loop {
            let (instance, tx) = {
                let handle = self
                    .rooms
                    .entry(room_id.to_string())
                    .or_insert_with(|| self.spawn_room(room_id));
                (handle.instance, handle.tx.clone())
            };

            match tx.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // 삭제 중인 방: 항목을 지우고 새로 만든다
                    tracing::debug!(room_id = %room_id, instance, "Room closed during join, recreating");
                    self.remove(room_id, instance);
                    command = returned;
                }
            }
        }
    }

    fn spawn_room(self: &Arc<Self>, room_id: &str) -> RoomHandle {
        let instance = self.instance_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = RoomActor::new(
            room_id.to_string(),
            instance,
            self.config.clone(),
            self.peers.clone(),
            self.provider.clone(),
            tx.clone(),
            Arc::downgrade(self),
        );
        tokio::spawn(actor.run(rx));

        RoomHandle { instance, tx }
    }

    /// 기존 방에만 전달. 방이 없으면 `false`.
    pub fn send(&self, room_id: &str, command: RoomCommand) -> bool {
        let Some(tx) = self.rooms.get(room_id).map(|h| h.tx.clone()) else {
            return false;
        };
        tx.send(command).is_ok()
    }

    pub(crate) fn remove(&self, room_id: &str, instance: u64) {
        self.rooms.remove_if(room_id, |_, handle| handle.instance == instance);
    }

    /// 닫힌 방 채널에 남아 있던 명령을 다시 보낸다
    pub(crate) fn redispatch(self: &Arc<Self>, room_id: &str, command: RoomCommand) {
        match command {
            RoomCommand::Join { .. } => self.join(room_id, command),
            RoomCommand::Disconnect { .. } | RoomCommand::Intent { .. } => {
                self.send(room_id, command);
            }
            _ => {}
        }
    }

    /// 사용자가 있는 방 목록 (인원 많은 순)
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let pending: Vec<_> = self
            .rooms
            .iter()
            .filter_map(|entry| {
                let (tx, rx) = oneshot::channel();
                entry.tx.send(RoomCommand::Summary(tx)).ok().map(|_| rx)
            })
            .collect();

        let mut summaries: Vec<RoomSummary> = futures::future::join_all(pending)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .filter(|s| s.user_count > 0)
            .collect();

        summaries.sort_by(|a, b| b.user_count.cmp(&a.user_count));
        summaries
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub(crate) async fn inspect<T, F>(&self, room_id: &str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&super::Room) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command = RoomCommand::Inspect(Box::new(move |room| {
            let _ = tx.send(f(room));
        }));
        if !self.send(room_id, command) {
            return None;
        }
        rx.await.ok()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::provider::MockVideoProvider;
    use crate::room::{Room, RoomIntent};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// 가짜 트랜스포트 하나
    pub struct Client {
        pub id: String,
        rx: UnboundedReceiver<ServerMessage>,
    }

    impl Client {
        pub fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages
        }
    }

    pub struct Harness {
        pub registry: Arc<RoomRegistry>,
        pub peers: Arc<PeerRegistry>,
    }

    impl Harness {
        pub fn new(provider: MockVideoProvider) -> Self {
            let peers = Arc::new(PeerRegistry::new());
            let registry = RoomRegistry::new(peers.clone(), Arc::new(provider), RoomConfig::default());
            Self { registry, peers }
        }

        pub fn connect(&self, id: &str) -> Client {
            let (tx, rx) = mpsc::unbounded_channel();
            self.peers.insert(id.to_string(), tx);
            Client {
                id: id.to_string(),
                rx,
            }
        }

        pub fn join(
            &self,
            room_id: &str,
            client: &Client,
            session_id: &str,
            name: Option<&str>,
            password: Option<&str>,
        ) {
            self.registry.join(
                room_id,
                RoomCommand::Join {
                    transport_id: client.id.clone(),
                    session_id: session_id.to_string(),
                    name: name.map(str::to_string),
                    password: password.map(str::to_string),
                },
            );
        }

        pub fn intent(&self, room_id: &str, client: &Client, intent: RoomIntent) {
            self.registry.send(
                room_id,
                RoomCommand::Intent {
                    transport_id: client.id.clone(),
                    intent,
                },
            );
        }

        /// 트랜스포트 종료 (수신 채널도 닫힌다)
        pub fn disconnect(&self, room_id: &str, client: Client) {
            self.peers.remove(&client.id);
            self.registry.send(
                room_id,
                RoomCommand::Disconnect {
                    transport_id: client.id,
                },
            );
        }

        pub async fn inspect<T, F>(&self, room_id: &str, f: F) -> Option<T>
        where
            T: Send + 'static,
            F: FnOnce(&Room) -> T + Send + 'static,
        {
            self.registry.inspect(room_id, f).await
        }
    }

    /// 대기 중인 모든 방 명령이 처리될 때까지 기다린다 (일시정지된 시계 전용)
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
