//! Relevance classification and envelope handling for intercepted responses.

use std::collections::HashSet;

use serde_json::Value;

use crate::extract::extract_all;
use crate::types::PinRecord;

/// URL fragments of the API surface worth mining.
const RELEVANT_FRAGMENTS: [&str; 6] = [
    "/resource/PinResource/get",
    "/resource/BoardFeedResource/get",
    "/resource/UserHomefeedResource/get",
    "/resource/RelatedModulesResource/get",
    "/resource/SearchResource/get",
    "/resource/VisualLiveSearchResource/get",
];

/// Whether a request URL belongs to the mined API surface.
pub fn is_relevant(url: &str) -> bool {
    RELEVANT_FRAGMENTS
        .iter()
        .any(|fragment| url.contains(fragment))
}

/// Apply one level of known envelope unwrapping: the nested resource
/// response wrapper first, then the generic data wrapper.
pub fn unwrap_envelope(body: &Value) -> Option<&Value> {
    body.pointer("/resource_response/data")
        .or_else(|| body.get("data"))
}

/// Mine a response body, extracting from both the unwrapped value and the
/// raw body and unioning the results by id.
///
/// Endpoints disagree on which side of the envelope carries the records, so
/// both passes are required; collapsing them loses records on one shape or
/// the other.
pub fn mine_payload(body: &Value) -> Vec<(String, PinRecord)> {
    let mut records = match unwrap_envelope(body) {
        Some(inner) => extract_all(inner),
        None => Vec::new(),
    };

    let mut ids: HashSet<String> = records.iter().map(|(id, _)| id.clone()).collect();
    for (id, record) in extract_all(body) {
        if ids.insert(id.clone()) {
            records.push((id, record));
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relevance_allow_list() {
        assert!(is_relevant(
            "https://www.pinterest.com/resource/PinResource/get/?data=%7B%7D"
        ));
        assert!(is_relevant(
            "https://www.pinterest.com/resource/UserHomefeedResource/get/"
        ));
        assert!(!is_relevant("https://www.pinterest.com/resource/PinResource/create/"));
        assert!(!is_relevant("https://www.pinterest.com/pin/123/"));
        assert!(!is_relevant("https://example.com/api/v1/items"));
    }

    #[test]
    fn test_unwrap_prefers_resource_response() {
        let body = json!({
            "resource_response": { "data": { "inner": true } },
            "data": { "outer": true }
        });
        assert_eq!(unwrap_envelope(&body), Some(&json!({ "inner": true })));

        let body = json!({ "data": { "outer": true } });
        assert_eq!(unwrap_envelope(&body), Some(&json!({ "outer": true })));

        assert_eq!(unwrap_envelope(&json!({ "items": [] })), None);
    }

    #[test]
    fn test_dual_pass_unions_both_layers() {
        // One record only reachable through the envelope, a second only at
        // the outer layer; a single pass over either value misses one.
        let body = json!({
            "resource_response": {
                "data": {
                    "id": "100",
                    "repin_count": 5,
                    "images": { "orig": { "url": "https://i.example/100.jpg" } }
                }
            },
            "aux_data": {
                "id": "200",
                "repin_count": 2,
                "images": { "orig": { "url": "https://i.example/200.jpg" } }
            }
        });

        let records = mine_payload(&body);
        let ids: Vec<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["100", "200"]);
    }

    #[test]
    fn test_dual_pass_keeps_first_seen_duplicate() {
        let body = json!({
            "resource_response": {
                "data": {
                    "id": "100",
                    "repin_count": 5,
                    "title": "enveloped",
                    "images": { "orig": { "url": "https://i.example/a.jpg" } }
                }
            }
        });

        // The raw pass revisits the same record through the outer body; the
        // enveloped copy must win.
        let records = mine_payload(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.details.title, "enveloped");
    }

    #[test]
    fn test_mine_payload_without_envelope() {
        let body = json!([
            { "id": "300", "repin_count": 1,
              "images": { "orig": { "url": "https://i.example/300.jpg" } } }
        ]);
        let records = mine_payload(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "300");
    }
}
