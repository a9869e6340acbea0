//! Channel message types exchanged between the two page contexts.

use serde::{Deserialize, Serialize};

use pinlens::PinRecord;

/// Source tag of the injected (interception) side.
pub const SOURCE_INJECTED: &str = "pinlens-injected";

/// Source tag of the content (cache-owning) side.
pub const SOURCE_CONTENT: &str = "pinlens-content";

/// A complete channel message: source tag plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub source: String,
    #[serde(flatten)]
    pub payload: ChannelPayload,
}

/// Message kinds carried over the channel. On the wire these serialize as
/// `{"type": "pin-stats", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ChannelPayload {
    /// A mined or fetched record headed for the cache.
    PinStats(PinStatsPayload),
    /// One-shot readiness signal from the injected side.
    InjectorReady,
    /// A batched request for record ids the consumer is missing.
    FetchStats(FetchStatsPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinStatsPayload {
    pub id: String,
    pub record: PinRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchStatsPayload {
    pub ids: Vec<String>,
}

impl ChannelMessage {
    pub fn from_injected(payload: ChannelPayload) -> Self {
        Self {
            source: SOURCE_INJECTED.to_string(),
            payload,
        }
    }

    pub fn from_content(payload: ChannelPayload) -> Self {
        Self {
            source: SOURCE_CONTENT.to_string(),
            payload,
        }
    }
}
