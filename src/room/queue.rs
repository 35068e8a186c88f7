//! 대기열과 자동 재생
//!
//! 영상이 끝나면 `advance` 가 대기열 앞 항목을 재생하고, 대기열이 비어 있으면
//! 추천 엔진으로 다음 영상을 고른다. 추천은 비동기로 실행되며 결과가 도착했을
//! 때 방 상태를 다시 확인한다.

use super::actor::RoomActor;
use super::clock::{sanitize_duration, MAX_DURATION_SECS};
use super::{RecommendationPurpose, RoomCommand};
use crate::error::RoomError;
use crate::protocol::{PlaybackAction, QueueItem, ServerMessage};
use tokio::time::Instant;

impl RoomActor {
    pub(crate) fn queue_add(&mut self, transport_id: &str, video: QueueItem) {
        if !self.room.is_admin(transport_id) {
            tracing::debug!(room_id = %self.room.id, peer_id = %transport_id, "Non-admin queue_add dropped");
            return;
        }
        let Some(video) = self.prepare_item(transport_id, video) else {
            return;
        };

        if video.needs_metadata() {
            self.spawn_item_completion(video, |item| RoomCommand::QueueItemResolved { item });
        } else {
            self.push_queue_item(video);
        }
    }

    pub(crate) fn push_queue_item(&mut self, item: QueueItem) {
        let title = item.display_title().to_string();
        self.room.queue.push_back(item);

        tracing::info!(room_id = %self.room.id, title = %title, len = self.room.queue.len(), "Queue item added");

        self.emit_queue();
        self.emit_to_room(ServerMessage::system_chat(format!(
            "Admin added \"{title}\" to queue."
        )));
    }

    /// 일반 참여자의 추가 요청. 관리자에게만 전달된다.
    pub(crate) fn request_queue_add(&mut self, transport_id: &str, video: QueueItem) {
        let Some(requested_by) = self.room.user(transport_id).map(|u| u.name.clone()) else {
            return;
        };
        let Some(video) = self.prepare_item(transport_id, video) else {
            return;
        };

        if video.needs_metadata() {
            self.spawn_item_completion(video, move |item| RoomCommand::QueueRequestResolved {
                item,
                requested_by,
            });
        } else {
            self.forward_queue_request(video, requested_by);
        }
    }

    pub(crate) fn forward_queue_request(&mut self, item: QueueItem, requested_by: String) {
        let Some(admin) = self.room.admin.clone() else {
            return;
        };
        self.emit_to(
            &admin,
            ServerMessage::AdminQueueRequest {
                video: item,
                requested_by,
            },
        );
    }

    pub(crate) fn resolve_queue_request(
        &mut self,
        transport_id: &str,
        mut video: QueueItem,
        approved: bool,
    ) {
        if !self.room.is_admin(transport_id) || !approved {
            return;
        }
        video.duration = Some(sanitize_duration(video.duration, self.config.default_duration));
        let added_by = video.added_by.clone().unwrap_or_else(|| "User".to_string());
        let title = video.display_title().to_string();
        self.room.queue.push_back(video);

        self.emit_queue();
        self.emit_to_room(ServerMessage::system_chat(format!(
            "{added_by} added \"{title}\" to queue (Approved)."
        )));
    }

    pub(crate) fn queue_remove(&mut self, transport_id: &str, index: usize) {
        if !self.room.is_admin(transport_id) {
            return;
        }
        match self.remove_at(index) {
            Ok(removed) => {
                self.emit_queue();
                self.emit_to_room(ServerMessage::system_chat(format!(
                    "Admin removed \"{}\" from queue.",
                    removed.display_title()
                )));
            }
            Err(e) => self.emit_to(transport_id, ServerMessage::error(&e)),
        }
    }

    fn remove_at(&mut self, index: usize) -> Result<QueueItem, RoomError> {
        let len = self.room.queue.len();
        self.room
            .queue
            .remove(index)
            .ok_or(RoomError::QueueIndexOutOfRange { index, len })
    }

    pub(crate) fn queue_reorder(&mut self, transport_id: &str, from: usize, to: usize) {
        if !self.room.is_admin(transport_id) {
            return;
        }
        match self.move_item(from, to) {
            Ok(title) => {
                self.emit_queue();
                self.emit_to_room(ServerMessage::system_chat(format!(
                    "Admin moved \"{title}\" to #{}.",
                    to + 1
                )));
            }
            Err(e) => self.emit_to(transport_id, ServerMessage::error(&e)),
        }
    }

    fn move_item(&mut self, from: usize, to: usize) -> Result<String, RoomError> {
        let len = self.room.queue.len();
        if to >= len {
            return Err(RoomError::QueueIndexOutOfRange { index: to, len });
        }
        let item = self
            .room
            .queue
            .remove(from)
            .ok_or(RoomError::QueueIndexOutOfRange { index: from, len })?;
        let title = item.display_title().to_string();
        self.room.queue.insert(to, item);
        Ok(title)
    }

    /// 건너뛰기. 관리자이거나 현재 영상이 끝났다고 보고한 참여자만 허용한다.
    pub(crate) fn play_next(&mut self, transport_id: &str, ended_video_id: Option<String>) {
        let reports_current = ended_video_id.is_some() && ended_video_id == self.room.video_id;
        if !self.room.is_admin(transport_id) && !reports_current {
            tracing::debug!(
                room_id = %self.room.id,
                peer_id = %transport_id,
                ended = ?ended_video_id,
                current = ?self.room.video_id,
                "Unauthorized or stale play_next dropped"
            );
            return;
        }
        self.advance();
    }

    /// 다음 영상으로 진행: 대기열, 버퍼된 추천, 실시간 추천, 정지 순서
    pub(crate) fn advance(&mut self) {
        if let Some(item) = self.room.queue.pop_front() {
            self.play_item(item);
            return;
        }

        let Some(video_id) = self.room.video_id.clone().filter(|_| self.room.auto_play) else {
            self.halt();
            return;
        };

        if let Some(item) = self.room.next_recommendation.take() {
            tracing::info!(room_id = %self.room.id, title = %item.display_title(), "Using buffered recommendation");
            self.enqueue_auto_play(item);
            self.advance();
            return;
        }

        if self.room.recommendation_pending.as_deref() == Some(video_id.as_str()) {
            tracing::debug!(room_id = %self.room.id, video_id = %video_id, "Recommendation already in flight");
            return;
        }

        tracing::info!(room_id = %self.room.id, video_id = %video_id, "Queue empty, searching for auto-play pick");
        self.stop_timer();
        self.room.recommendation_pending = Some(video_id);
        self.spawn_recommendation(RecommendationPurpose::Advance);
    }

    /// 대기열 항목을 현재 영상으로 만든다
    fn play_item(&mut self, item: QueueItem) {
        self.stop_timer();

        let duration = sanitize_duration(item.duration, self.config.default_duration);
        let title = item.display_title().to_string();

        self.room.video_id = Some(item.id.clone());
        self.room.title = item.title.clone();
        self.room.artist = item.author.clone();
        self.room.next_recommendation = None;
        self.room.recommendation_pending = None;
        self.room.clock.restart(duration, Instant::now());
        self.room
            .push_history(item.id.clone(), title.clone(), self.config.history_limit);

        tracing::info!(room_id = %self.room.id, video_id = %item.id, title = %title, duration, "Playing next");

        self.start_timer();
        self.broadcast_action(
            PlaybackAction::ChangeVideo {
                video_id: item.id.clone(),
            },
            "Queue",
        );
        self.emit_queue();

        if item.title.is_none() {
            self.spawn_metadata(item.id);
        } else if self.room.auto_play {
            self.spawn_recommendation(RecommendationPurpose::Prefetch);
        }
    }

    fn enqueue_auto_play(&mut self, item: QueueItem) {
        let title = item.display_title().to_string();
        self.room.queue.push_back(item);
        tracing::info!(room_id = %self.room.id, title = %title, "Auto-play pick queued");
        self.emit_to_room(ServerMessage::system_chat(format!("Auto-playing: \"{title}\"")));
    }

    /// 재생 정지. 서버가 보낸 pause 로 방송된다.
    fn halt(&mut self) {
        self.stop_timer();
        self.room.recommendation_pending = None;
        self.room.clock.pause(Instant::now());

        tracing::info!(room_id = %self.room.id, "Playback stopped, nothing left to play");
        self.broadcast_action(PlaybackAction::Pause, "Server");
    }

    pub(crate) fn on_recommendation(
        &mut self,
        seed_video_id: String,
        item: Option<QueueItem>,
        purpose: RecommendationPurpose,
    ) {
        if self.room.video_id.as_deref() != Some(seed_video_id.as_str()) {
            tracing::debug!(room_id = %self.room.id, seed = %seed_video_id, "Stale recommendation ignored");
            return;
        }

        match purpose {
            RecommendationPurpose::Prefetch => {
                if let Some(item) = item {
                    tracing::info!(room_id = %self.room.id, title = %item.display_title(), "Recommendation buffered");
                    self.room.next_recommendation = Some(item);
                }
            }
            RecommendationPurpose::Advance => {
                if self.room.recommendation_pending.as_deref() != Some(seed_video_id.as_str()) {
                    return;
                }
                self.room.recommendation_pending = None;

                if !self.room.queue.is_empty() {
                    self.advance();
                    return;
                }
                if !self.room.auto_play {
                    self.halt();
                    return;
                }
                match item {
                    Some(item) => {
                        self.enqueue_auto_play(item);
                        self.advance();
                    }
                    None => {
                        tracing::warn!(room_id = %self.room.id, seed = %seed_video_id, "No recommendation found");
                        self.halt();
                    }
                }
            }
        }
    }

    fn prepare_item(&self, transport_id: &str, mut video: QueueItem) -> Option<QueueItem> {
        video.id = video.id.trim().to_string();
        if video.id.is_empty() {
            return None;
        }
        if video.added_by.is_none() {
            video.added_by = self.room.user(transport_id).map(|u| u.name.clone());
        }
        video.duration = video
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.min(MAX_DURATION_SECS));
        Some(video)
    }

    fn emit_queue(&self) {
        self.emit_to_room(ServerMessage::QueueUpdated {
            queue: self.room.queue_list(),
        });
    }
}
