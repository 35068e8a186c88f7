//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub provider: ProviderConfig,
    pub log_level: String,
}

/// 방 설정 (타이머 및 재생 관련 상수)
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// 연결 끊긴 사용자의 좌석 유지 시간
    pub grace_period: Duration,
    /// 빈 방 삭제 대기 시간
    pub empty_timeout: Duration,
    /// 드리프트 보정 하트비트 주기
    pub heartbeat_interval: Duration,
    /// 영상 종료 타이머 여유 시간
    pub end_buffer: Duration,
    /// 종료 타이머 최소 지연
    pub timer_floor: Duration,
    pub history_limit: usize,
    /// 길이를 모를 때 사용하는 기본 영상 길이 (초)
    pub default_duration: f64,
    /// 자동 재생 검색 결과 최대 개수
    pub search_limit: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(2000),
            empty_timeout: Duration::from_millis(60_000),
            heartbeat_interval: Duration::from_millis(10_000),
            end_buffer: Duration::from_millis(2000),
            timer_floor: Duration::from_millis(100),
            history_limit: 50,
            default_duration: 180.0,
            search_limit: 25,
        }
    }
}

/// 영상 검색/메타데이터 제공자 설정
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://yewtu.be".to_string(),
            timeout: Duration::from_millis(8000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
            room: RoomConfig::default(),
            provider: ProviderConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base = Config::default();
        let defaults = base.room;

        Self {
            port: parse_var("PORT", base.port),
            host: env::var("HOST").unwrap_or(base.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(base.cors_origins),
            room: RoomConfig {
                grace_period: millis_var("ROOM_GRACE_PERIOD_MS", defaults.grace_period),
                empty_timeout: millis_var("ROOM_EMPTY_TIMEOUT_MS", defaults.empty_timeout),
                heartbeat_interval: millis_var(
                    "HEARTBEAT_INTERVAL_MS",
                    defaults.heartbeat_interval,
                ),
                end_buffer: millis_var("END_BUFFER_MS", defaults.end_buffer),
                timer_floor: millis_var("TIMER_FLOOR_MS", defaults.timer_floor),
                history_limit: parse_var("HISTORY_LIMIT", defaults.history_limit),
                default_duration: parse_var("DEFAULT_DURATION_SECS", defaults.default_duration),
                search_limit: parse_var("SEARCH_LIMIT", defaults.search_limit),
            },
            provider: ProviderConfig {
                base_url: env::var("VIDEO_API_URL")
                    .unwrap_or(base.provider.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                timeout: millis_var("VIDEO_API_TIMEOUT_MS", base.provider.timeout),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(base.log_level),
        }
    }

    /// `*` 가 포함되면 모든 origin 허용
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn millis_var(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
