//! 에러 타입 정의

use thiserror::Error;

/// 방 참여 실패 사유
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("room requires a password")]
    PasswordRequired,

    #[error("Incorrect Room PIN")]
    InvalidPassword,

    /// 같은 세션이 이미 다른 탭에서 연결 중
    #[error("session is already connected from another tab")]
    DuplicateSession,
}

/// 요청자에게만 보고되는 검증 에러
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Only admin can set password")]
    AdminOnly,

    #[error("Password must be exactly 6 digits")]
    InvalidPasswordFormat,

    #[error("Queue index {index} is out of range (queue length {len})")]
    QueueIndexOutOfRange { index: usize, len: usize },

    #[error("You are currently muted.")]
    Muted,
}

impl RoomError {
    /// 클라이언트로 전달되는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::AdminOnly => "admin_only",
            RoomError::InvalidPasswordFormat => "invalid_password_format",
            RoomError::QueueIndexOutOfRange { .. } => "queue_index_out_of_range",
            RoomError::Muted => "muted",
        }
    }
}

/// 외부 영상 검색/메타데이터 제공자 에러
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("video not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_error_codes_are_stable() {
        assert_eq!(RoomError::AdminOnly.code(), "admin_only");
        assert_eq!(
            RoomError::QueueIndexOutOfRange { index: 4, len: 2 }.to_string(),
            "Queue index 4 is out of range (queue length 2)"
        );
    }
}
