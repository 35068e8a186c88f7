//! 외부 영상 검색/메타데이터 제공자

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;

/// 검색 결과 항목
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_seconds: f64,
}

/// 단일 영상 메타데이터
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub title: String,
    pub author: Option<String>,
    pub duration_seconds: f64,
}

/// 영상 검색 및 메타데이터 조회. 모든 호출은 실패할 수 있으며 호출자가 기본값으로 대체한다.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError>;

    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, ProviderError>;
}

/// Invidious REST API 클라이언트
pub struct InvidiousProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvidiousVideo {
    video_id: Option<String>,
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    length_seconds: f64,
    #[serde(default)]
    video_thumbnails: Vec<InvidiousThumbnail>,
}

#[derive(Debug, Deserialize)]
struct InvidiousThumbnail {
    url: String,
}

impl InvidiousProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl VideoProvider for InvidiousProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!("{}/api/v1/search", self.base_url);
        let request = self
            .client
            .get(url)
            .query(&[("q", query), ("type", "video")]);
        let videos: Vec<InvidiousVideo> = self.get_json(request).await?;

        tracing::debug!(query = %query, results = videos.len(), "Provider search completed");

        Ok(videos
            .into_iter()
            .filter_map(|v| {
                let id = v.video_id?;
                Some(SearchResult {
                    id,
                    title: v.title,
                    author: v.author,
                    thumbnail: v.video_thumbnails.into_iter().next().map(|t| t.url),
                    duration_seconds: v.length_seconds,
                })
            })
            .take(limit)
            .collect())
    }

    async fn video_info(&self, video_id: &str) -> Result<VideoInfo, ProviderError> {
        let url = format!("{}/api/v1/videos/{}", self.base_url, video_id);
        let request = self.client.get(url).query(&[("fields", "title,author,lengthSeconds")]);

        match self.get_json::<InvidiousVideo>(request).await {
            Ok(video) => Ok(VideoInfo {
                title: video.title,
                author: video.author,
                duration_seconds: video.length_seconds,
            }),
            Err(ProviderError::Status(404)) => Err(ProviderError::NotFound(video_id.to_string())),
            Err(e) => Err(e),
        }
    }
}
