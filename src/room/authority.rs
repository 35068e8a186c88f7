//! 단일 작성자(관리자) 재생 제어와 동기화 응답

use super::actor::RoomActor;
use super::clock::sanitize_duration;
use super::{is_valid_password, RecommendationPurpose};
use crate::error::RoomError;
use crate::protocol::{PlaybackAction, ServerMessage};
use crate::provider::VideoInfo;
use tokio::time::Instant;

impl RoomActor {
    /// 관리자가 아닌 연결의 재생 요청은 응답 없이 버린다
    pub(crate) fn handle_sync_action(&mut self, transport_id: &str, action: PlaybackAction) {
        if !self.room.is_admin(transport_id) {
            tracing::debug!(room_id = %self.room.id, peer_id = %transport_id, ?action, "Non-admin playback intent dropped");
            return;
        }

        let now = Instant::now();
        match action {
            PlaybackAction::Play => {
                if self.room.video_id.is_none() {
                    tracing::debug!(room_id = %self.room.id, "Play without a video ignored");
                    return;
                }
                self.room.clock.update(now);
                self.room.clock.play(now);
                self.start_timer();
                self.broadcast_action(PlaybackAction::Play, transport_id);
            }
            PlaybackAction::Pause => {
                self.stop_timer();
                self.room.clock.pause(now);
                self.broadcast_action(PlaybackAction::Pause, transport_id);
            }
            PlaybackAction::Seek { time } => {
                self.room.clock.seek(time, now);
                if self.room.clock.playing {
                    self.start_timer();
                }
                let time = self.room.clock.timestamp;
                self.broadcast_action(PlaybackAction::Seek { time }, transport_id);
            }
            PlaybackAction::ChangeVideo { video_id } => {
                let video_id = video_id.trim().to_string();
                if video_id.is_empty() {
                    return;
                }
                self.change_video(video_id, transport_id);
            }
        }
    }

    fn change_video(&mut self, video_id: String, sender: &str) {
        self.stop_timer();

        self.room.video_id = Some(video_id.clone());
        self.room.title = None;
        self.room.artist = None;
        self.room.next_recommendation = None;
        self.room.recommendation_pending = None;
        self.room
            .clock
            .restart(self.config.default_duration, Instant::now());
        self.room
            .push_history(video_id.clone(), video_id.clone(), self.config.history_limit);

        tracing::info!(room_id = %self.room.id, video_id = %video_id, "Video changed");

        self.start_timer();
        self.broadcast_action(
            PlaybackAction::ChangeVideo {
                video_id: video_id.clone(),
            },
            sender,
        );
        self.spawn_metadata(video_id);
    }

    /// 메타데이터 조회 완료. 그 사이 영상이 바뀌었으면 결과를 버린다.
    pub(crate) fn on_metadata(&mut self, video_id: String, info: Option<VideoInfo>) {
        if self.room.video_id.as_deref() != Some(video_id.as_str()) {
            tracing::debug!(room_id = %self.room.id, video_id = %video_id, "Stale metadata ignored");
            return;
        }

        let (title, artist, duration) = match info {
            Some(info) => {
                let duration =
                    sanitize_duration(Some(info.duration_seconds), self.config.default_duration);
                (info.title, info.author, duration)
            }
            None => (video_id.clone(), None, self.config.default_duration),
        };

        tracing::info!(room_id = %self.room.id, video_id = %video_id, title = %title, duration, "Metadata applied");

        if let Some(entry) = self.room.history.iter_mut().rev().find(|h| h.id == video_id) {
            entry.title = title.clone();
        }
        self.room.title = Some(title);
        self.room.artist = artist;
        self.room.clock.update(Instant::now());
        self.room.clock.duration = duration;

        if self.room.clock.playing && self.room.recommendation_pending.is_none() {
            self.start_timer();
        }
        self.emit_state_to_room();

        if self.room.auto_play {
            self.spawn_recommendation(RecommendationPurpose::Prefetch);
        }
    }

    /// 요청자에게만 서버 기준 현재 위치 전송
    pub(crate) fn request_sync(&mut self, transport_id: &str) {
        if self.room.user(transport_id).is_none() {
            return;
        }
        self.room.clock.update(Instant::now());
        self.emit_to(
            transport_id,
            ServerMessage::SyncExact {
                time: self.room.clock.timestamp,
                playing: self.room.clock.playing,
            },
        );
    }

    pub(crate) fn get_state(&mut self, transport_id: &str) {
        if self.room.user(transport_id).is_none() {
            return;
        }
        self.room.clock.update(Instant::now());
        self.emit_state_to(transport_id);
    }

    pub(crate) fn set_password(&mut self, transport_id: &str, password: Option<String>) {
        match self.apply_password(transport_id, password) {
            Ok(()) => {
                let content = if self.room.password.is_some() {
                    "Room is now password protected."
                } else {
                    "Room password removed."
                };
                tracing::info!(room_id = %self.room.id, protected = self.room.password.is_some(), "Room password updated");
                self.emit_to_room(ServerMessage::system_chat(content));
                self.emit_state_to_room();
            }
            Err(e) => {
                tracing::debug!(room_id = %self.room.id, peer_id = %transport_id, error = %e, "set_password rejected");
                self.emit_to(transport_id, ServerMessage::error(&e));
            }
        }
    }

    fn apply_password(
        &mut self,
        transport_id: &str,
        password: Option<String>,
    ) -> Result<(), RoomError> {
        if !self.room.is_admin(transport_id) {
            return Err(RoomError::AdminOnly);
        }
        let password = password.filter(|p| !p.is_empty());
        if let Some(p) = &password {
            if !is_valid_password(p) {
                return Err(RoomError::InvalidPasswordFormat);
            }
        }
        self.room.password = password;
        Ok(())
    }

    pub(crate) fn toggle_autoplay(&mut self, transport_id: &str) {
        if !self.room.is_admin(transport_id) {
            return;
        }

        self.room.auto_play = !self.room.auto_play;
        let state = if self.room.auto_play { "enabled" } else { "disabled" };
        tracing::info!(room_id = %self.room.id, auto_play = self.room.auto_play, "Auto-play toggled");
        self.emit_to_room(ServerMessage::system_chat(format!(
            "Admin {state} Auto-Play recommended mode."
        )));

        if self.room.auto_play && !self.room.clock.playing && self.room.video_id.is_some() {
            self.advance();
        }

        self.emit_state_to_room();
    }
}
