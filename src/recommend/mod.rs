//! 자동 재생 추천 엔진
//!
//! 현재 곡 제목과 재생 기록을 바탕으로 검색어를 만들고, 검색 결과에서
//! 중복/저품질/같은 아티스트 항목을 걸러낸 뒤 상위 후보 중 하나를 무작위로 고른다.
//! 제공자 에러는 모두 로그로 남기고 "추천 없음" 으로 처리한다.

pub mod text;

use crate::protocol::QueueItem;
use crate::provider::{SearchResult, VideoProvider};
use rand::seq::SliceRandom;
use rand::Rng;

/// 쇼츠/클립 제거용 최소 길이 (초)
const MIN_DURATION_SECS: f64 = 120.0;
/// 이 비율을 넘는 제목 토큰 겹침은 같은 곡으로 본다
const DUPLICATE_OVERLAP: f64 = 0.6;
/// 무작위 선택 대상 상위 후보 수
const PICK_POOL: usize = 5;

const GARBAGE_KEYWORDS: &[&str] = &[
    "hack",
    "crackle",
    "prank",
    "react",
    "tutorial",
    "gameplay",
    "trailer",
    "teaser",
    "remix contest",
    "shorts",
    "tiktok",
    "reel",
];

pub const AUTO_PLAY_ADDED_BY: &str = "Auto-Play";

/// 재생 기록 항목
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
}

/// 추천 요청 입력
#[derive(Debug, Clone)]
pub struct RecommendationSeed {
    pub source_title: String,
    pub last_video_id: String,
    pub artist: Option<String>,
    pub history: Vec<HistoryEntry>,
}

/// 제목 분석 결과
#[derive(Debug, Clone)]
struct SeedAnalysis {
    artist: Option<String>,
    artist_extracted: bool,
    clean_title: String,
    clean_tokens: Vec<String>,
    is_mix: bool,
}

impl SeedAnalysis {
    fn new(seed: &RecommendationSeed) -> Self {
        let extracted = text::extract_artist(&seed.source_title);
        let artist_extracted = extracted.is_some();
        let clean_title = text::clean_title(&seed.source_title);
        let is_mix = text::looks_like_mix(&seed.source_title, &clean_title);

        Self {
            artist: extracted.or_else(|| seed.artist.clone()),
            artist_extracted,
            clean_tokens: text::tokens(&clean_title),
            clean_title,
            is_mix,
        }
    }

    /// 업로더 채널명이 믹스를 올린 경우 아티스트로 믿지 않는다
    fn trusted_artist(&self) -> Option<&str> {
        if self.artist_extracted || !self.is_mix {
            self.artist.as_deref().filter(|a| !a.trim().is_empty())
        } else {
            None
        }
    }
}

/// 다음 곡 추천. 후보가 없거나 검색이 실패하면 `None`.
pub async fn find_next(
    provider: &dyn VideoProvider,
    seed: &RecommendationSeed,
    limit: usize,
) -> Option<QueueItem> {
    let analysis = SeedAnalysis::new(seed);
    let mut results = Vec::new();

    if let Some(artist) = analysis.trusted_artist() {
        let query = artist_query(artist, &analysis.clean_title);
        tracing::info!(query = %query, source = %seed.source_title, "Recommendation search (artist)");
        match provider.search(&query, limit).await {
            Ok(found) => results = found,
            Err(e) => tracing::warn!(error = %e, query = %query, "Recommendation search failed"),
        }
    }

    if results.is_empty() {
        tracing::info!(query = %analysis.clean_title, "Recommendation search (title)");
        match provider.search(&analysis.clean_title, limit).await {
            Ok(found) => results = found,
            Err(e) => {
                tracing::warn!(error = %e, query = %analysis.clean_title, "Recommendation search failed");
                return None;
            }
        }
    }

    let candidates = filter_candidates(&results, seed, &analysis);
    let picked = pick(&candidates)?;

    tracing::info!(video_id = %picked.id, title = %picked.title, "Recommendation selected");

    Some(QueueItem {
        id: picked.id.clone(),
        title: Some(picked.title.clone()),
        duration: Some(picked.duration_seconds),
        thumbnail: picked.thumbnail.clone(),
        author: Some(picked.author.clone().unwrap_or_else(|| "Unknown".to_string())),
        added_by: Some(AUTO_PLAY_ADDED_BY.to_string()),
    })
}

fn artist_query(artist: &str, clean_title: &str) -> String {
    let templates = [
        format!("{artist} mix"),
        format!("{artist} radio"),
        format!("songs like {clean_title} by {artist}"),
        clean_title.to_string(),
    ];
    templates
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| clean_title.to_string())
}

/// 엄격한 필터를 먼저 적용하고, 비어 있으면 같은 아티스트 규칙만 완화한다
fn filter_candidates<'a>(
    results: &'a [SearchResult],
    seed: &RecommendationSeed,
    analysis: &SeedAnalysis,
) -> Vec<&'a SearchResult> {
    let history_tokens: Vec<Vec<String>> =
        seed.history.iter().map(|h| text::tokens(&h.title)).collect();
    let artist_tokens = seed.artist.as_deref().map(text::tokens).unwrap_or_default();

    let strict: Vec<&SearchResult> = results
        .iter()
        .filter(|v| passes_mandatory(v, seed, analysis, &history_tokens))
        .filter(|v| analysis.is_mix || !same_artist(v, &artist_tokens))
        .collect();

    if !strict.is_empty() {
        return strict;
    }

    tracing::debug!("Strict filters removed all candidates, relaxing artist check");
    results
        .iter()
        .filter(|v| passes_mandatory(v, seed, analysis, &history_tokens))
        .collect()
}

/// 완화 단계에서도 유지되는 필터 (ID, 길이, 키워드, 중복)
fn passes_mandatory(
    video: &SearchResult,
    seed: &RecommendationSeed,
    analysis: &SeedAnalysis,
    history_tokens: &[Vec<String>],
) -> bool {
    if video.id == seed.last_video_id || seed.history.iter().any(|h| h.id == video.id) {
        return false;
    }
    if video.duration_seconds < MIN_DURATION_SECS {
        return false;
    }

    let title = video.title.to_lowercase();
    if GARBAGE_KEYWORDS.iter().any(|w| title.contains(w)) {
        return false;
    }

    let tokens = text::tokens(&video.title);
    if history_tokens
        .iter()
        .any(|h| text::overlap(&tokens, h) > DUPLICATE_OVERLAP)
    {
        return false;
    }

    text::overlap(&tokens, &analysis.clean_tokens) <= DUPLICATE_OVERLAP
}

fn same_artist(video: &SearchResult, artist_tokens: &[String]) -> bool {
    let Some(channel) = video.author.as_deref() else {
        return false;
    };
    if artist_tokens.is_empty() {
        return false;
    }
    let channel_tokens = text::tokens(channel);
    artist_tokens.iter().any(|t| channel_tokens.contains(t))
}

fn pick<'a>(candidates: &[&'a SearchResult]) -> Option<&'a SearchResult> {
    let pool = candidates.len().min(PICK_POOL);
    if pool == 0 {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..pool);
    Some(candidates[index])
}
