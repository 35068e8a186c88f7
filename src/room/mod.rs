//! 방 조정 엔진
//!
//! 방마다 하나의 액터 태스크가 `Room` 을 단독으로 소유하고, 모든 입력은
//! `RoomCommand` 로 직렬화되어 처리된다. 타이머와 외부 제공자 호출은 별도
//! 태스크에서 실행되고 결과를 다시 방 채널로 보낸다.

pub mod actor;
pub mod authority;
pub mod clock;
pub mod presence;
pub mod queue;
pub mod registry;
pub mod timer;

pub use registry::RoomRegistry;

use crate::protocol::{PlaybackAction, QueueItem, RoomSnapshot, RoomSummary, UserInfo};
use crate::provider::VideoInfo;
use crate::recommend::HistoryEntry;
use clock::PlaybackClock;
use std::collections::VecDeque;
use timer::ScheduledTask;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// 방 액터가 처리하는 명령
pub enum RoomCommand {
    // 클라이언트 입력
    Join {
        transport_id: String,
        session_id: String,
        name: Option<String>,
        password: Option<String>,
    },
    Disconnect {
        transport_id: String,
    },
    Intent {
        transport_id: String,
        intent: RoomIntent,
    },
    Summary(oneshot::Sender<RoomSummary>),

    // 예약 작업
    EndTimerFired {
        task_id: u64,
    },
    HeartbeatTick {
        task_id: u64,
    },
    RemovalDue {
        session_id: String,
        task_id: u64,
    },
    DeletionDue {
        task_id: u64,
    },

    // 비동기 제공자 호출 결과
    MetadataResolved {
        video_id: String,
        info: Option<VideoInfo>,
    },
    QueueItemResolved {
        item: QueueItem,
    },
    QueueRequestResolved {
        item: QueueItem,
        requested_by: String,
    },
    RecommendationReady {
        seed_video_id: String,
        item: Option<QueueItem>,
        purpose: RecommendationPurpose,
    },

    #[cfg(test)]
    Inspect(Box<dyn FnOnce(&Room) + Send>),
}

/// 방 범위의 클라이언트 요청
#[derive(Debug, Clone)]
pub enum RoomIntent {
    UpdateName(String),
    Sync(PlaybackAction),
    RequestSync,
    GetState,
    QueueAdd(QueueItem),
    QueueRemove(usize),
    QueueReorder { from: usize, to: usize },
    RequestQueueAdd(QueueItem),
    ResolveQueueRequest { video: QueueItem, approved: bool },
    PlayNext { ended_video_id: Option<String> },
    ToggleAutoplay,
    SetPassword(Option<String>),
    GrantAdmin(String),
    KickUser(String),
    MuteUser { target: String, seconds: u64 },
    Chat { message: String, image: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationPurpose {
    /// 다음 곡 미리 준비
    Prefetch,
    /// 대기열이 비어 지금 바로 필요
    Advance,
}

/// 방 참여자
#[derive(Debug)]
pub struct User {
    /// 재접속마다 바뀌는 연결 ID
    pub transport_id: String,
    /// 재접속해도 유지되는 세션 ID
    pub session_id: String,
    pub name: String,
    pub inactive: bool,
    pub removal: Option<ScheduledTask>,
    pub muted_until: Option<Instant>,
}

impl User {
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.transport_id.clone(),
            name: self.name.clone(),
            inactive: self.inactive,
        }
    }

    pub fn is_muted(&self, now: Instant) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }
}

/// 방 상태
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub clock: PlaybackClock,
    /// 관리자 연결 ID
    pub admin: Option<String>,
    /// 관리자 세션 ID (재접속 시 관리자 복원용)
    pub admin_session: Option<String>,
    pub password: Option<String>,
    pub users: Vec<User>,
    pub queue: VecDeque<QueueItem>,
    pub history: VecDeque<HistoryEntry>,
    pub next_recommendation: Option<QueueItem>,
    /// 진행 중인 자동 재생 검색의 기준 영상
    pub recommendation_pending: Option<String>,
    pub auto_play: bool,
    /// 첫 참여 처리 여부
    pub initialized: bool,
    pub end_timer: Option<ScheduledTask>,
    pub heartbeat: Option<ScheduledTask>,
    pub deletion: Option<ScheduledTask>,
}

impl Room {
    pub fn new(id: String, default_duration: f64) -> Self {
        Self {
            id,
            video_id: None,
            title: None,
            artist: None,
            clock: PlaybackClock::new(default_duration),
            admin: None,
            admin_session: None,
            password: None,
            users: Vec::new(),
            queue: VecDeque::new(),
            history: VecDeque::new(),
            next_recommendation: None,
            recommendation_pending: None,
            auto_play: true,
            initialized: false,
            end_timer: None,
            heartbeat: None,
            deletion: None,
        }
    }

    pub fn is_admin(&self, transport_id: &str) -> bool {
        self.admin.as_deref() == Some(transport_id)
    }

    pub fn user_index(&self, transport_id: &str) -> Option<usize> {
        self.users.iter().position(|u| u.transport_id == transport_id)
    }

    pub fn user(&self, transport_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.transport_id == transport_id)
    }

    /// 연결 ID 또는 세션 ID 로 대상 사용자 검색
    pub fn find_target(&self, target: &str) -> Option<usize> {
        self.users
            .iter()
            .position(|u| u.transport_id == target)
            .or_else(|| self.users.iter().position(|u| u.session_id == target))
    }

    pub fn push_history(&mut self, id: String, title: String, limit: usize) {
        self.history.push_back(HistoryEntry { id, title });
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    pub fn queue_list(&self) -> Vec<QueueItem> {
        self.queue.iter().cloned().collect()
    }

    pub fn snapshot(&self, for_admin: bool) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            video_id: self.video_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            playing: self.clock.playing,
            timestamp: self.clock.timestamp,
            duration: self.clock.duration,
            users: self.users.iter().map(User::info).collect(),
            admin: self.admin.clone(),
            has_password: self.password.is_some(),
            password: if for_admin { self.password.clone() } else { None },
            queue: self.queue_list(),
            auto_play_enabled: self.auto_play,
        }
    }

    pub fn summary(&self) -> RoomSummary {
        let admin_name = self
            .admin
            .as_deref()
            .and_then(|admin| self.user(admin))
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Unknown Host".to_string());

        RoomSummary {
            id: self.id.clone(),
            user_count: self.users.len(),
            admin_name,
            current_title: self.title.clone(),
            playing: self.clock.playing,
            is_private: self.password.is_some(),
        }
    }
}

/// 6자리 숫자 비밀번호 형식 확인
pub fn is_valid_password(password: &str) -> bool {
    password.len() == 6 && password.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded() {
        let mut room = Room::new("r".into(), 180.0);

        for i in 0..60 {
            room.push_history(format!("v{i}"), format!("Song {i}"), 50);
        }

        assert_eq!(room.history.len(), 50);
        assert_eq!(room.history.front().unwrap().id, "v10");
        assert_eq!(room.history.back().unwrap().id, "v59");
    }

    #[test]
    fn password_format() {
        assert!(is_valid_password("123456"));
        assert!(!is_valid_password("12345"));
        assert!(!is_valid_password("12345a"));
        assert!(!is_valid_password("１２３４５６"));
    }
}
