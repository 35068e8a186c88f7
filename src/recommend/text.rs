//! 제목 분석 (아티스트 추출, 제목 정리, 토큰화)

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static ARTIST_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^-]+)\s+-\s+(.+)").expect("valid artist regex"));
static ARTIST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+-\s+").expect("valid prefix regex"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[].*[\)\]]").expect("valid bracket regex"));
static OFFICIAL_VIDEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)official\s+video").expect("valid official regex"));
static LYRICS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)lyrics").expect("valid lyrics regex"));
static FEATURING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(ft|feat)\..*").expect("valid featuring regex"));
static MIX_JOINER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+x\s+").expect("valid mix regex"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid token regex"));

const MAX_ARTIST_LEN: usize = 30;

/// 아티스트 이름으로 보기 어려운 단어
const QUALITY_TAGS: &[&str] = &["video", "official", "lyric", "audio"];

/// "아티스트 - 제목" 형식에서 아티스트 추출
pub fn extract_artist(title: &str) -> Option<String> {
    let captures = ARTIST_TITLE.captures(title)?;
    let raw = captures.get(1)?.as_str();
    if raw.chars().count() <= 1 {
        return None;
    }

    let artist = raw.trim();
    let lower = artist.to_lowercase();
    if artist.is_empty()
        || artist.chars().count() >= MAX_ARTIST_LEN
        || QUALITY_TAGS.iter().any(|tag| lower.contains(tag))
    {
        return None;
    }

    Some(artist.to_string())
}

/// 검색용 제목 정리. 결과가 너무 짧으면 원래 제목을 돌려준다.
pub fn clean_title(title: &str) -> String {
    let cleaned = ARTIST_PREFIX.replace(title, "");
    let cleaned = BRACKETED.replace_all(&cleaned, "");
    let cleaned = OFFICIAL_VIDEO.replace_all(&cleaned, "");
    let cleaned = LYRICS.replace_all(&cleaned, "");
    let cleaned = FEATURING.replace(&cleaned, "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() < 2 {
        title.to_string()
    } else {
        cleaned.to_string()
    }
}

/// DJ 믹스/컴필레이션 여부
pub fn looks_like_mix(source_title: &str, cleaned: &str) -> bool {
    let source = source_title.to_lowercase();
    cleaned.to_lowercase().contains("mix")
        || source.contains("mix")
        || source.contains("transition")
        || MIX_JOINER.is_match(source_title)
}

/// 소문자 변환, 특수문자 제거 후 3글자 이상 단어만 남긴다
pub fn tokens(text: &str) -> Vec<String> {
    NON_WORD
        .replace_all(&text.to_lowercase(), "")
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// `a` 중 `b` 에도 있는 토큰의 비율 (분모는 둘 중 짧은 쪽)
pub fn overlap(a: &[String], b: &[String]) -> f64 {
    let denominator = a.len().min(b.len());
    if denominator == 0 {
        return 0.0;
    }
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let shared = a.iter().filter(|t| b.contains(t.as_str())).count();
    shared as f64 / denominator as f64
}
