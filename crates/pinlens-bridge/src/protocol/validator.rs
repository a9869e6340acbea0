//! Trust checks applied to every inbound delivery.

use crate::transport::Delivery;
use crate::types::ChannelMessage;

/// Decode and validate a delivery.
///
/// Three checks gate every message: it must come from this half's own
/// window, its transport origin must equal the page origin exactly, and its
/// source tag must be the peer's. Anything that fails is dropped silently —
/// foreign frames and unrelated scripts post to the same channel all the
/// time, and none of that is an error.
pub fn validate_delivery(
    delivery: &Delivery,
    own_window: u64,
    page_origin: &str,
    peer_source: &str,
) -> Option<ChannelMessage> {
    if delivery.window != own_window {
        tracing::debug!(window = delivery.window, "ignoring foreign-window delivery");
        return None;
    }

    if delivery.origin != page_origin {
        tracing::debug!(origin = %delivery.origin, "ignoring cross-origin delivery");
        return None;
    }

    let message: ChannelMessage = match serde_json::from_value(delivery.payload.clone()) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("ignoring undecodable delivery: {e}");
            return None;
        }
    };

    if message.source != peer_source {
        tracing::debug!(source = %message.source, "ignoring unrecognized source tag");
        return None;
    }

    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelPayload, SOURCE_CONTENT, SOURCE_INJECTED};
    use serde_json::json;

    const ORIGIN: &str = "https://www.pinterest.com";

    fn ready_delivery() -> Delivery {
        Delivery {
            origin: ORIGIN.to_string(),
            window: 7,
            payload: serde_json::to_value(ChannelMessage::from_injected(
                ChannelPayload::InjectorReady,
            ))
            .unwrap(),
        }
    }

    #[test]
    fn test_valid_delivery_passes() {
        let message = validate_delivery(&ready_delivery(), 7, ORIGIN, SOURCE_INJECTED).unwrap();
        assert_eq!(message.payload, ChannelPayload::InjectorReady);
    }

    #[test]
    fn test_foreign_window_is_dropped() {
        assert!(validate_delivery(&ready_delivery(), 8, ORIGIN, SOURCE_INJECTED).is_none());
    }

    #[test]
    fn test_mismatched_origin_is_dropped() {
        let mut delivery = ready_delivery();
        delivery.origin = "https://evil.example".to_string();
        assert!(validate_delivery(&delivery, 7, ORIGIN, SOURCE_INJECTED).is_none());
    }

    #[test]
    fn test_wrong_source_tag_is_dropped() {
        // A message tagged with our own side's source must not loop back in.
        assert!(validate_delivery(&ready_delivery(), 7, ORIGIN, SOURCE_CONTENT).is_none());
    }

    #[test]
    fn test_undecodable_payload_is_dropped() {
        let delivery = Delivery {
            origin: ORIGIN.to_string(),
            window: 7,
            payload: json!({ "totally": "unrelated" }),
        };
        assert!(validate_delivery(&delivery, 7, ORIGIN, SOURCE_INJECTED).is_none());
    }
}
