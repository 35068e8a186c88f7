//! 방 액터: 방 상태를 단독 소유하고 명령을 순서대로 처리한다

use super::clock::sanitize_duration;
use super::registry::RoomRegistry;
use super::{RecommendationPurpose, Room, RoomCommand, RoomIntent};
use crate::config::RoomConfig;
use crate::protocol::{PlaybackAction, QueueItem, ServerMessage};
use crate::provider::VideoProvider;
use crate::recommend::{self, RecommendationSeed};
use crate::state::PeerRegistry;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub struct RoomActor {
    pub(crate) room: Room,
    pub(crate) config: RoomConfig,
    pub(crate) peers: Arc<PeerRegistry>,
    pub(crate) provider: Arc<dyn VideoProvider>,
    /// 자기 자신의 명령 채널 (예약 작업/비동기 결과 회신용)
    pub(crate) tx: UnboundedSender<RoomCommand>,
    registry: Weak<RoomRegistry>,
    instance: u64,
    task_seq: u64,
}

impl RoomActor {
    pub fn new(
        room_id: String,
        instance: u64,
        config: RoomConfig,
        peers: Arc<PeerRegistry>,
        provider: Arc<dyn VideoProvider>,
        tx: UnboundedSender<RoomCommand>,
        registry: Weak<RoomRegistry>,
    ) -> Self {
        Self {
            room: Room::new(room_id, config.default_duration),
            config,
            peers,
            provider,
            tx,
            registry,
            instance,
            task_seq: 0,
        }
    }

    /// 명령 루프. 빈 방 삭제가 확정되면 종료한다.
    pub async fn run(mut self, mut rx: UnboundedReceiver<RoomCommand>) {
        tracing::info!(room_id = %self.room.id, "Room created");

        while let Some(command) = rx.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }

        // 삭제와 경합한 명령은 새 방으로 넘긴다
        rx.close();
        let registry = self.registry.upgrade();
        let mut forwarded = 0;
        while let Ok(command) = rx.try_recv() {
            if let Some(registry) = &registry {
                registry.redispatch(&self.room.id, command);
                forwarded += 1;
            }
        }

        tracing::info!(room_id = %self.room.id, forwarded, "Room deleted");
    }

    pub(crate) fn handle(&mut self, command: RoomCommand) -> ControlFlow<()> {
        match command {
            RoomCommand::Join {
                transport_id,
                session_id,
                name,
                password,
            } => self.handle_join(&transport_id, &session_id, name, password),
            RoomCommand::Disconnect { transport_id } => self.handle_disconnect(&transport_id),
            RoomCommand::Intent {
                transport_id,
                intent,
            } => self.handle_intent(&transport_id, intent),
            RoomCommand::Summary(reply) => {
                let _ = reply.send(self.room.summary());
            }
            RoomCommand::EndTimerFired { task_id } => self.on_end_timer(task_id),
            RoomCommand::HeartbeatTick { task_id } => self.on_heartbeat(task_id),
            RoomCommand::RemovalDue {
                session_id,
                task_id,
            } => self.on_removal_due(&session_id, task_id),
            RoomCommand::DeletionDue { task_id } => return self.on_deletion_due(task_id),
            RoomCommand::MetadataResolved { video_id, info } => self.on_metadata(video_id, info),
            RoomCommand::QueueItemResolved { item } => self.push_queue_item(item),
            RoomCommand::QueueRequestResolved { item, requested_by } => {
                self.forward_queue_request(item, requested_by)
            }
            RoomCommand::RecommendationReady {
                seed_video_id,
                item,
                purpose,
            } => self.on_recommendation(seed_video_id, item, purpose),
            #[cfg(test)]
            RoomCommand::Inspect(inspect) => inspect(&self.room),
        }
        ControlFlow::Continue(())
    }

    fn handle_intent(&mut self, transport_id: &str, intent: RoomIntent) {
        match intent {
            RoomIntent::UpdateName(name) => self.update_name(transport_id, name),
            RoomIntent::Sync(action) => self.handle_sync_action(transport_id, action),
            RoomIntent::RequestSync => self.request_sync(transport_id),
            RoomIntent::GetState => self.get_state(transport_id),
            RoomIntent::QueueAdd(video) => self.queue_add(transport_id, video),
            RoomIntent::QueueRemove(index) => self.queue_remove(transport_id, index),
            RoomIntent::QueueReorder { from, to } => self.queue_reorder(transport_id, from, to),
            RoomIntent::RequestQueueAdd(video) => self.request_queue_add(transport_id, video),
            RoomIntent::ResolveQueueRequest { video, approved } => {
                self.resolve_queue_request(transport_id, video, approved)
            }
            RoomIntent::PlayNext { ended_video_id } => self.play_next(transport_id, ended_video_id),
            RoomIntent::ToggleAutoplay => self.toggle_autoplay(transport_id),
            RoomIntent::SetPassword(password) => self.set_password(transport_id, password),
            RoomIntent::GrantAdmin(target) => self.grant_admin(transport_id, &target),
            RoomIntent::KickUser(target) => self.kick_user(transport_id, &target),
            RoomIntent::MuteUser { target, seconds } => {
                self.mute_user(transport_id, &target, seconds)
            }
            RoomIntent::Chat { message, image } => self.chat(transport_id, message, image),
        }
    }

    fn on_deletion_due(&mut self, task_id: u64) -> ControlFlow<()> {
        if self.room.deletion.as_ref().map(|t| t.id()) != Some(task_id) {
            return ControlFlow::Continue(());
        }
        self.room.deletion = None;
        if !self.room.users.is_empty() {
            return ControlFlow::Continue(());
        }

        self.room.end_timer = None;
        self.room.heartbeat = None;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.room.id, self.instance);
        }
        ControlFlow::Break(())
    }

    pub(crate) fn next_task_id(&mut self) -> u64 {
        self.task_seq += 1;
        self.task_seq
    }

    /// 특정 연결에게 메시지 전송
    pub(crate) fn emit_to(&self, transport_id: &str, message: ServerMessage) {
        self.peers.send(transport_id, message);
    }

    /// 방의 모든 사용자에게 브로드캐스트 (요청자 포함)
    pub(crate) fn emit_to_room(&self, message: ServerMessage) {
        for user in &self.room.users {
            self.peers.send(&user.transport_id, message.clone());
        }
    }

    pub(crate) fn emit_state_to(&self, transport_id: &str) {
        let snapshot = self.room.snapshot(self.room.is_admin(transport_id));
        self.emit_to(transport_id, ServerMessage::SyncState(snapshot));
    }

    /// 관리자에게만 비밀번호가 포함되도록 사용자별 스냅샷 전송
    pub(crate) fn emit_state_to_room(&self) {
        for user in &self.room.users {
            self.emit_state_to(&user.transport_id);
        }
    }

    pub(crate) fn broadcast_action(&self, action: PlaybackAction, sender: &str) {
        self.emit_to_room(ServerMessage::SyncAction {
            action,
            sender: sender.to_string(),
            time: self.room.clock.timestamp,
            playing: self.room.clock.playing,
        });
    }

    /// 영상 메타데이터를 비동기로 조회하고 결과를 방 채널로 보낸다
    pub(crate) fn spawn_metadata(&self, video_id: String) {
        let provider = self.provider.clone();
        let tx = self.tx.clone();
        let room_id = self.room.id.clone();

        tokio::spawn(async move {
            let info = match provider.video_info(&video_id).await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(room_id = %room_id, video_id = %video_id, error = %e, "Metadata fetch failed");
                    None
                }
            };
            let _ = tx.send(RoomCommand::MetadataResolved { video_id, info });
        });
    }

    /// 제목/길이가 빠진 대기열 항목을 채운다. 실패하면 기본 길이를 쓴다.
    pub(crate) fn spawn_item_completion<F>(&self, item: QueueItem, reply: F)
    where
        F: FnOnce(QueueItem) -> RoomCommand + Send + 'static,
    {
        let provider = self.provider.clone();
        let tx = self.tx.clone();
        let default_duration = self.config.default_duration;

        tokio::spawn(async move {
            let mut item = item;
            match provider.video_info(&item.id).await {
                Ok(info) => {
                    if item.title.is_none() {
                        item.title = Some(info.title);
                    }
                    if item.author.is_none() {
                        item.author = info.author;
                    }
                    if info.duration_seconds.is_finite() && info.duration_seconds > 0.0 {
                        item.duration = Some(info.duration_seconds);
                    }
                }
                Err(e) => {
                    tracing::warn!(video_id = %item.id, error = %e, "Queue item metadata fetch failed");
                }
            }
            item.duration = Some(sanitize_duration(item.duration, default_duration));
            let _ = tx.send(reply(item));
        });
    }

    /// 현재 영상을 기준으로 추천 검색 시작
    pub(crate) fn spawn_recommendation(&self, purpose: RecommendationPurpose) {
        let Some(video_id) = self.room.video_id.clone() else {
            return;
        };
        let known_title = self.room.title.clone();
        let artist = self.room.artist.clone();
        let history = self.room.history.iter().cloned().collect();
        let provider = self.provider.clone();
        let tx = self.tx.clone();
        let limit = self.config.search_limit;

        tokio::spawn(async move {
            let source_title = match known_title {
                Some(title) => Some(title),
                None => match provider.video_info(&video_id).await {
                    Ok(info) => Some(info.title),
                    Err(e) => {
                        tracing::warn!(video_id = %video_id, error = %e, "Could not determine source title");
                        None
                    }
                },
            };

            let item = match source_title {
                Some(source_title) => {
                    let seed = RecommendationSeed {
                        source_title,
                        last_video_id: video_id.clone(),
                        artist,
                        history,
                    };
                    recommend::find_next(provider.as_ref(), &seed, limit).await
                }
                None => None,
            };

            let _ = tx.send(RoomCommand::RecommendationReady {
                seed_video_id: video_id,
                item,
                purpose,
            });
        });
    }
}
