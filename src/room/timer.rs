//! 방 전용 예약 작업 핸들

use super::RoomCommand;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// 방이 소유하는 예약 작업. drop 되면 작업도 취소된다.
///
/// 작업은 만료 시 자신의 `id` 를 담은 명령을 방 채널로 보낸다. 방은 저장된
/// 핸들의 `id` 와 비교해서 이미 교체된 작업의 명령을 버린다.
#[derive(Debug)]
pub struct ScheduledTask {
    id: u64,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// `delay` 후 한 번 실행
    pub fn once(
        id: u64,
        delay: Duration,
        tx: UnboundedSender<RoomCommand>,
        command: RoomCommand,
    ) -> Self {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(command);
        });
        Self { id, handle }
    }

    /// `period` 마다 반복 실행 (첫 실행은 한 주기 뒤)
    pub fn every<F>(id: u64, period: Duration, tx: UnboundedSender<RoomCommand>, make: F) -> Self
    where
        F: Fn() -> RoomCommand + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        });
        Self { id, handle }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn dropped_task_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = ScheduledTask::once(1, Duration::from_secs(5), tx, RoomCommand::DeletionDue { task_id: 1 });

        drop(task);
        time::sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_task_ticks_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _task = ScheduledTask::every(7, Duration::from_secs(10), tx, || {
            RoomCommand::HeartbeatTick { task_id: 7 }
        });

        time::sleep(Duration::from_secs(35)).await;

        let mut ticks = 0;
        while let Ok(cmd) = rx.try_recv() {
            assert!(matches!(cmd, RoomCommand::HeartbeatTick { task_id: 7 }));
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
