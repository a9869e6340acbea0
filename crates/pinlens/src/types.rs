//! Core data types for pin engagement records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown when a creation timestamp is absent or unparsable.
pub const AGE_PLACEHOLDER: &str = "—";

/// A normalized engagement record mined from the pin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    pub id: String,
    pub engagement: Engagement,
    pub details: PinDetails,
    #[serde(default)]
    pub external: ExternalMeta,
}

/// Engagement counters. Feed responses only carry reactions; saves and
/// comments require a targeted detail fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub repins: u64,
    pub comments: u64,
    pub shares: u64,
    pub reactions: u64,
}

/// Descriptive fields derived from the network payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinDetails {
    pub title: String,
    pub description: String,
    pub link: String,
    pub created_at: String,
    pub age: String,
    pub image_url: String,
    pub video_url: String,
    pub is_video: bool,
    pub kind: PinKind,
}

/// Media type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    #[default]
    Image,
    Video,
    Carousel,
}

/// Locally-owned annotations, never sourced from the network. Merged
/// independently of network-derived fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMeta {
    pub bookmarked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl PinRecord {
    /// A record is complete once it carries saves or comments. Reactions
    /// alone come from passive feed traffic and do not count.
    pub fn is_complete(&self) -> bool {
        self.engagement.repins > 0 || self.engagement.comments > 0
    }
}

/// Partial update to a record; each group merges shallowly on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalPatch>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngagementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repins: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_video: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PinKind>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExternalPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl Engagement {
    pub fn apply(&mut self, patch: &EngagementPatch) {
        if let Some(repins) = patch.repins {
            self.repins = repins;
        }
        if let Some(comments) = patch.comments {
            self.comments = comments;
        }
        if let Some(shares) = patch.shares {
            self.shares = shares;
        }
        if let Some(reactions) = patch.reactions {
            self.reactions = reactions;
        }
    }
}

impl PinDetails {
    pub fn apply(&mut self, patch: &DetailsPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(link) = &patch.link {
            self.link = link.clone();
        }
        if let Some(created_at) = &patch.created_at {
            self.created_at = created_at.clone();
        }
        if let Some(age) = &patch.age {
            self.age = age.clone();
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = image_url.clone();
        }
        if let Some(video_url) = &patch.video_url {
            self.video_url = video_url.clone();
        }
        if let Some(is_video) = patch.is_video {
            self.is_video = is_video;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
    }
}

impl ExternalMeta {
    pub fn apply(&mut self, patch: &ExternalPatch) {
        if let Some(bookmarked) = patch.bookmarked {
            self.bookmarked = bookmarked;
        }
        if let Some(saved_at) = patch.saved_at {
            self.saved_at = Some(saved_at);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = Some(updated_at);
        }
    }
}

/// True for non-empty, all-ASCII-digit id strings.
pub fn is_valid_pin_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Unix time in milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Derive the human age bucket for a creation timestamp.
pub fn derive_age(created_at: &str) -> String {
    derive_age_at(created_at, Utc::now())
}

/// Age bucket relative to an explicit reference time: `"<n>Y"`, `"<n>M"`,
/// `"<n>D"` or `"0D"`, with a placeholder for unparsable input. Timestamps
/// arrive in RFC 2822 from the pin API, but RFC 3339 is accepted too.
pub fn derive_age_at(created_at: &str, now: DateTime<Utc>) -> String {
    let parsed = DateTime::parse_from_rfc2822(created_at)
        .or_else(|_| DateTime::parse_from_rfc3339(created_at));

    let created = match parsed {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => return AGE_PLACEHOLDER.to_string(),
    };

    let days = (now - created).num_days();
    if days >= 365 {
        format!("{}Y", days / 365)
    } else if days >= 30 {
        format!("{}M", days / 30)
    } else if days >= 1 {
        format!("{days}D")
    } else {
        "0D".to_string()
    }
}

/// Errors that can occur in the core library.
#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type StatsResult<T> = Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_valid_pin_ids() {
        assert!(is_valid_pin_id("123456789"));
        assert!(is_valid_pin_id("0"));
        assert!(!is_valid_pin_id(""));
        assert!(!is_valid_pin_id("12a34"));
        assert!(!is_valid_pin_id("abc"));
        assert!(!is_valid_pin_id("12 34"));
    }

    #[test]
    fn test_age_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(derive_age_at("Sat, 15 Jun 2019 12:00:00 +0000", now), "5Y");
        assert_eq!(derive_age_at("Mon, 15 Apr 2024 12:00:00 +0000", now), "2M");
        assert_eq!(derive_age_at("Thu, 13 Jun 2024 12:00:00 +0000", now), "2D");
        assert_eq!(derive_age_at("Sat, 15 Jun 2024 09:00:00 +0000", now), "0D");
    }

    #[test]
    fn test_age_accepts_rfc3339() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(derive_age_at("2023-06-15T12:00:00Z", now), "1Y");
    }

    #[test]
    fn test_age_placeholder_for_garbage() {
        let now = Utc::now();
        assert_eq!(derive_age_at("", now), AGE_PLACEHOLDER);
        assert_eq!(derive_age_at("not a date", now), AGE_PLACEHOLDER);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(derive_age_at("2024-06-16T12:00:00Z", now), "0D");
    }

    #[test]
    fn test_completeness() {
        let mut record = PinRecord {
            id: "1".to_string(),
            engagement: Engagement::default(),
            details: PinDetails::default(),
            external: ExternalMeta::default(),
        };
        assert!(!record.is_complete());

        record.engagement.reactions = 40;
        assert!(!record.is_complete());

        record.engagement.repins = 1;
        assert!(record.is_complete());

        record.engagement = Engagement {
            comments: 3,
            ..Engagement::default()
        };
        assert!(record.is_complete());
    }

    #[test]
    fn test_patch_groups_merge_independently() {
        let mut record = PinRecord {
            id: "1".to_string(),
            engagement: Engagement {
                repins: 10,
                comments: 2,
                shares: 1,
                reactions: 5,
            },
            details: PinDetails {
                title: "old".to_string(),
                ..PinDetails::default()
            },
            external: ExternalMeta::default(),
        };

        record.engagement.apply(&EngagementPatch {
            repins: Some(11),
            ..EngagementPatch::default()
        });
        assert_eq!(record.engagement.repins, 11);
        assert_eq!(record.engagement.comments, 2);

        record.external.apply(&ExternalPatch {
            bookmarked: Some(true),
            saved_at: Some(1_700_000_000_000),
            ..ExternalPatch::default()
        });
        assert!(record.external.bookmarked);
        assert_eq!(record.details.title, "old");
    }
}
