//! Published artifact records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of artifact sent to remote storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Image,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Image => "image",
        }
    }

    /// MIME type sent with the upload.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video/mp4",
            ResourceKind::Image => "image/jpeg",
        }
    }

    /// Default file extension used in object keys.
    pub fn extension(&self) -> &'static str {
        match self {
            ResourceKind::Video => "mp4",
            ResourceKind::Image => "jpg",
        }
    }

    /// Videos are large enough to warrant chunked transfer; images go in one request.
    pub fn is_chunked(&self) -> bool {
        matches!(self, ResourceKind::Video)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One successfully published artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublicationRecord {
    pub kind: ResourceKind,
    /// Object key in the bucket
    pub key: String,
    /// Retrieval URL
    pub url: String,
    /// Uploaded size in bytes
    pub size: u64,
    /// Number of attempts the upload needed
    pub attempts: u32,
    pub published_at: DateTime<Utc>,
}

/// Combined results file written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublicationSummary {
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl PublicationSummary {
    /// Build a summary from the run's records. `None` until the video is published.
    pub fn from_records(records: &[PublicationRecord], completed_at: DateTime<Utc>) -> Option<Self> {
        let video = records.iter().find(|r| r.kind == ResourceKind::Video)?;
        let thumbnail = records.iter().find(|r| r.kind == ResourceKind::Image);

        Some(Self {
            video_url: video.url.clone(),
            thumbnail_url: thumbnail.map(|r| r.url.clone()),
            completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ResourceKind, url: &str) -> PublicationRecord {
        PublicationRecord {
            kind,
            key: format!("shorts/{}", kind),
            url: url.to_string(),
            size: 10,
            attempts: 1,
            published_at: Utc::now(),
        }
    }

    #[test]
    fn test_resource_kind_properties() {
        assert!(ResourceKind::Video.is_chunked());
        assert!(!ResourceKind::Image.is_chunked());
        assert_eq!(ResourceKind::Image.content_type(), "image/jpeg");
        assert_eq!(ResourceKind::Video.to_string(), "video");
    }

    #[test]
    fn test_summary_requires_video() {
        let now = Utc::now();
        assert!(PublicationSummary::from_records(&[], now).is_none());
        assert!(PublicationSummary::from_records(
            &[record(ResourceKind::Image, "https://cdn/t.jpg")],
            now
        )
        .is_none());

        let summary = PublicationSummary::from_records(
            &[
                record(ResourceKind::Video, "https://cdn/v.mp4"),
                record(ResourceKind::Image, "https://cdn/t.jpg"),
            ],
            now,
        )
        .unwrap();
        assert_eq!(summary.video_url, "https://cdn/v.mp4");
        assert_eq!(summary.thumbnail_url.as_deref(), Some("https://cdn/t.jpg"));
    }

    #[test]
    fn test_summary_serializes_snake_case() {
        let summary = PublicationSummary {
            video_url: "https://cdn/v.mp4".to_string(),
            thumbnail_url: None,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("video_url").is_some());
        assert!(json.get("completed_at").is_some());
    }
}
