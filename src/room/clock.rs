//! 가상 플레이어 시계
//!
//! 클라이언트 보고값이 아닌 서버 시간 경과로 재생 위치를 계산한다.
//! 종료 타이머와 하트비트도 여기서 관리한다.

use super::actor::RoomActor;
use super::timer::ScheduledTask;
use super::RoomCommand;
use crate::protocol::ServerMessage;
use std::time::Duration;
use tokio::time::Instant;

/// 영상 길이 상한 (초)
pub const MAX_DURATION_SECS: f64 = 24.0 * 60.0 * 60.0;

/// 양수가 아닌 길이는 기본값으로, 상한을 넘는 길이는 상한으로 바꾼다
pub fn sanitize_duration(duration: Option<f64>, default: f64) -> f64 {
    match duration {
        Some(d) if d.is_finite() && d > 0.0 => d.min(MAX_DURATION_SECS),
        _ => default,
    }
}

/// 방의 재생 상태
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    pub playing: bool,
    /// 누적 재생 위치 (초)
    pub timestamp: f64,
    /// 영상 길이 (초)
    pub duration: f64,
    /// 재생 중일 때만 유효
    last_play_time: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(duration: f64) -> Self {
        Self {
            playing: false,
            timestamp: 0.0,
            duration,
            last_play_time: None,
        }
    }

    /// 마지막 기준 시각 이후 경과 시간을 누적한다. 정지 상태면 아무것도 하지 않는다.
    pub fn update(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        if let Some(last) = self.last_play_time {
            self.timestamp += now.saturating_duration_since(last).as_secs_f64();
        }
        self.last_play_time = Some(now);
    }

    pub fn play(&mut self, now: Instant) {
        self.playing = true;
        self.last_play_time = Some(now);
    }

    pub fn pause(&mut self, now: Instant) {
        self.update(now);
        self.playing = false;
        self.last_play_time = None;
    }

    pub fn seek(&mut self, time: f64, now: Instant) {
        self.update(now);
        self.timestamp = if time.is_finite() { time.max(0.0) } else { 0.0 };
        if self.playing {
            self.last_play_time = Some(now);
        }
    }

    /// 새 영상을 처음부터 재생
    pub fn restart(&mut self, duration: f64, now: Instant) {
        self.duration = duration;
        self.timestamp = 0.0;
        self.play(now);
    }

    /// 종료 타이머 지연: `max(남은 시간 + buffer, floor)`
    pub fn end_delay(&self, buffer: Duration, floor: Duration) -> Duration {
        let remaining = self.duration - self.timestamp + buffer.as_secs_f64();
        if remaining.is_finite() && remaining > floor.as_secs_f64() {
            let capped = remaining.min(MAX_DURATION_SECS + buffer.as_secs_f64());
            Duration::try_from_secs_f64(capped).unwrap_or(floor)
        } else {
            floor
        }
    }
}

impl RoomActor {
    /// 종료 타이머 재시작. 기존 타이머는 항상 먼저 취소된다.
    pub(crate) fn start_timer(&mut self) {
        self.room.end_timer = None;
        let now = Instant::now();
        self.room.clock.update(now);

        if !self.room.clock.playing {
            self.stop_heartbeat();
            return;
        }

        let delay = self
            .room
            .clock
            .end_delay(self.config.end_buffer, self.config.timer_floor);
        let task_id = self.next_task_id();
        self.room.end_timer = Some(ScheduledTask::once(
            task_id,
            delay,
            self.tx.clone(),
            RoomCommand::EndTimerFired { task_id },
        ));

        tracing::debug!(room_id = %self.room.id, delay_secs = delay.as_secs_f64(), "End timer scheduled");

        self.start_heartbeat();
    }

    /// 종료 타이머와 하트비트를 멈추고 현재 위치를 확정한다
    pub(crate) fn stop_timer(&mut self) {
        self.room.end_timer = None;
        self.stop_heartbeat();
        self.room.clock.update(Instant::now());
    }

    fn start_heartbeat(&mut self) {
        let task_id = self.next_task_id();
        self.room.heartbeat = Some(ScheduledTask::every(
            task_id,
            self.config.heartbeat_interval,
            self.tx.clone(),
            move || RoomCommand::HeartbeatTick { task_id },
        ));
    }

    fn stop_heartbeat(&mut self) {
        self.room.heartbeat = None;
    }

    pub(crate) fn on_heartbeat(&mut self, task_id: u64) {
        if self.room.heartbeat.as_ref().map(ScheduledTask::id) != Some(task_id) {
            return;
        }
        if !self.room.clock.playing {
            self.stop_heartbeat();
            return;
        }

        self.room.clock.update(Instant::now());
        self.emit_to_room(ServerMessage::SyncExact {
            time: self.room.clock.timestamp,
            playing: true,
        });
    }

    pub(crate) fn on_end_timer(&mut self, task_id: u64) {
        if self.room.end_timer.as_ref().map(ScheduledTask::id) != Some(task_id) {
            tracing::debug!(room_id = %self.room.id, task_id, "Stale end timer ignored");
            return;
        }
        self.room.end_timer = None;

        tracing::info!(room_id = %self.room.id, video_id = ?self.room.video_id, "End timer fired");
        self.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_noop_while_paused() {
        let start = Instant::now();
        let mut clock = PlaybackClock::new(200.0);

        clock.update(start + Duration::from_secs(30));

        assert_eq!(clock.timestamp, 0.0);
    }

    #[test]
    fn update_accumulates_and_never_decreases() {
        let start = Instant::now();
        let mut clock = PlaybackClock::new(200.0);
        clock.play(start);

        let mut last = 0.0;
        for secs in [1, 3, 3, 7, 12] {
            clock.update(start + Duration::from_secs(secs));
            assert!(clock.timestamp >= last);
            last = clock.timestamp;
        }

        assert!((clock.timestamp - 12.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_update_at_same_instant_is_idempotent() {
        let start = Instant::now();
        let mut clock = PlaybackClock::new(200.0);
        clock.play(start);
        let now = start + Duration::from_secs(5);

        clock.update(now);
        let first = clock.timestamp;
        clock.update(now);
        clock.update(now);

        assert_eq!(clock.timestamp, first);
    }

    #[test]
    fn pause_commits_elapsed_time() {
        let start = Instant::now();
        let mut clock = PlaybackClock::new(200.0);
        clock.play(start);

        clock.pause(start + Duration::from_secs(8));
        clock.update(start + Duration::from_secs(60));

        assert!(!clock.playing);
        assert!((clock.timestamp - 8.0).abs() < 1e-9);
    }

    #[test]
    fn seek_resets_interval_start_when_playing() {
        let start = Instant::now();
        let mut clock = PlaybackClock::new(200.0);
        clock.play(start);

        clock.seek(100.0, start + Duration::from_secs(10));
        clock.update(start + Duration::from_secs(15));

        assert!((clock.timestamp - 105.0).abs() < 1e-9);
    }

    #[test]
    fn negative_seek_clamps_to_zero() {
        let mut clock = PlaybackClock::new(200.0);
        clock.seek(-5.0, Instant::now());
        assert_eq!(clock.timestamp, 0.0);
    }

    #[test]
    fn end_delay_adds_buffer_and_respects_floor() {
        let buffer = Duration::from_secs(2);
        let floor = Duration::from_millis(100);
        let mut clock = PlaybackClock::new(200.0);
        clock.timestamp = 50.0;

        assert_eq!(clock.end_delay(buffer, floor), Duration::from_secs(152));

        clock.timestamp = 500.0;
        assert_eq!(clock.end_delay(buffer, floor), floor);
    }

    #[test]
    fn end_delay_is_capped_for_huge_durations() {
        let buffer = Duration::from_secs(2);
        let floor = Duration::from_millis(100);
        let clock = PlaybackClock::new(1e20);

        let delay = clock.end_delay(buffer, floor);

        assert_eq!(delay, Duration::from_secs(MAX_DURATION_SECS as u64 + 2));
    }

    #[test]
    fn sanitize_duration_defaults_and_caps() {
        assert_eq!(sanitize_duration(Some(240.0), 180.0), 240.0);
        assert_eq!(sanitize_duration(Some(0.0), 180.0), 180.0);
        assert_eq!(sanitize_duration(Some(f64::NAN), 180.0), 180.0);
        assert_eq!(sanitize_duration(None, 180.0), 180.0);
        assert_eq!(sanitize_duration(Some(1e20), 180.0), MAX_DURATION_SECS);
    }
}
