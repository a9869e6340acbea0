//! Schema-less extraction of pin records from arbitrarily nested JSON.

use std::collections::HashSet;

use serde_json::Value;

use crate::types::{
    derive_age, is_valid_pin_id, Engagement, ExternalMeta, PinDetails, PinKind, PinRecord,
};

/// Recursion bound for [`extract_all`]; the walk stops descending past this
/// depth instead of erroring on pathological structures.
const MAX_WALK_DEPTH: usize = 20;

/// Image resolution buckets, best first.
const IMAGE_BUCKETS: [&str; 6] = ["orig", "736x", "564x", "474x", "236x", "170x"];

/// Video variants, best first.
const VIDEO_VARIANTS: [&str; 7] = [
    "V_720P", "V_480P", "V_EXP7", "V_EXP6", "V_EXP5", "V_EXP4", "V_EXP3",
];

fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

fn u64_field(raw: &Value, key: &str) -> Option<u64> {
    raw.get(key).and_then(Value::as_u64)
}

fn repin_total(raw: &Value) -> u64 {
    u64_field(raw, "repin_count")
        .or_else(|| {
            raw.pointer("/aggregated_pin_data/aggregated_stats/saves")
                .and_then(Value::as_u64)
        })
        .unwrap_or(0)
}

fn comment_total(raw: &Value) -> u64 {
    u64_field(raw, "comment_count")
        .or_else(|| {
            raw.pointer("/aggregated_pin_data/comment_count")
                .and_then(Value::as_u64)
        })
        .unwrap_or(0)
}

/// Sum of the sparse reaction-kind → count mapping; missing values count
/// as zero.
fn reaction_total(raw: &Value) -> u64 {
    raw.get("reaction_counts")
        .and_then(Value::as_object)
        .map(|counts| counts.values().filter_map(Value::as_u64).sum())
        .unwrap_or(0)
}

fn best_image_url(raw: &Value) -> String {
    if let Some(images) = raw.get("images").and_then(Value::as_object) {
        for bucket in IMAGE_BUCKETS {
            if let Some(url) = images
                .get(bucket)
                .and_then(|entry| entry.get("url"))
                .and_then(Value::as_str)
            {
                if !url.is_empty() {
                    return url.to_string();
                }
            }
        }
    }

    for key in ["image_large_url", "image_medium_url", "image_square_url"] {
        if let Some(url) = str_field(raw, key) {
            if !url.is_empty() {
                return url.to_string();
            }
        }
    }

    String::new()
}

fn best_video_url(raw: &Value) -> String {
    let Some(variants) = raw
        .pointer("/videos/video_list")
        .and_then(Value::as_object)
    else {
        return String::new();
    };

    for variant in VIDEO_VARIANTS {
        if let Some(url) = variants
            .get(variant)
            .and_then(|entry| entry.get("url"))
            .and_then(Value::as_str)
        {
            if !url.is_empty() {
                return url.to_string();
            }
        }
    }

    // Unknown variant names still beat no video at all.
    for entry in variants.values() {
        if let Some(url) = entry.get("url").and_then(Value::as_str) {
            if !url.is_empty() {
                return url.to_string();
            }
        }
    }

    String::new()
}

/// Normalize a single flat object into a [`PinRecord`].
///
/// Returns `None` only when the id is missing or fails the digit-string
/// pattern; every other absent field degrades to zero/empty/false.
pub fn extract_record(raw: &Value) -> Option<PinRecord> {
    let id = str_field(raw, "id")?;
    if !is_valid_pin_id(id) {
        return None;
    }

    let engagement = Engagement {
        repins: repin_total(raw),
        comments: comment_total(raw),
        shares: u64_field(raw, "share_count").unwrap_or(0),
        reactions: reaction_total(raw),
    };

    let image_url = best_image_url(raw);
    let video_url = best_video_url(raw);
    let is_video =
        raw.get("is_video").and_then(Value::as_bool).unwrap_or(false) || !video_url.is_empty();

    let kind = if raw
        .get("carousel_data")
        .map(Value::is_object)
        .unwrap_or(false)
    {
        PinKind::Carousel
    } else if is_video {
        PinKind::Video
    } else {
        PinKind::Image
    };

    let created_at = str_field(raw, "created_at").unwrap_or_default().to_string();
    let title = match str_field(raw, "title") {
        Some(title) if !title.trim().is_empty() => title,
        _ => str_field(raw, "grid_title").unwrap_or_default(),
    };

    let details = PinDetails {
        title: title.trim().to_string(),
        description: str_field(raw, "description")
            .unwrap_or_default()
            .trim()
            .to_string(),
        link: str_field(raw, "link").unwrap_or_default().to_string(),
        age: derive_age(&created_at),
        created_at,
        image_url,
        video_url,
        is_video,
        kind,
    };

    Some(PinRecord {
        id: id.to_string(),
        engagement,
        details,
        external: ExternalMeta::default(),
    })
}

/// A same-shaped object with no image and zero saves is almost certainly
/// not a real pin; caching it would only pollute the store.
fn is_semantically_empty(record: &PinRecord) -> bool {
    record.details.image_url.is_empty() && record.engagement.repins == 0
}

/// Walk an arbitrary JSON value and collect every extractable record.
///
/// Records are deduplicated by id, first occurrence wins, and results keep
/// first-encounter order.
pub fn extract_all(value: &Value) -> Vec<(String, PinRecord)> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    walk(value, 0, &mut seen, &mut found);
    found
}

fn walk(
    value: &Value,
    depth: usize,
    seen: &mut HashSet<String>,
    out: &mut Vec<(String, PinRecord)>,
) {
    if depth > MAX_WALK_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            let candidate = map
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| is_valid_pin_id(id));
            if let Some(id) = candidate {
                if !seen.contains(id) {
                    if let Some(record) = extract_record(value) {
                        if !is_semantically_empty(&record) {
                            seen.insert(id.to_string());
                            out.push((id.to_string(), record));
                        }
                    }
                }
            }
            for child in map.values() {
                walk(child, depth + 1, seen, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk(child, depth + 1, seen, out);
            }
        }
        _ => {}
    }
}
