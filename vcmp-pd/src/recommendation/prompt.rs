//! Prompt building and reply validation shared by every provider

use super::{ProviderError, RecommendationDescriptor};
use crate::text::normalize;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use vcmp_common::CanonicalTrackDescriptor;

/// History entries sent to the model
pub const PROMPT_HISTORY_ENTRIES: usize = 5;

const INSTRUCTION: &str = "You are a music recommendation engine. Given the current track and the \
listener's recent history, recommend songs that would play well next. Do not recommend the \
current track or anything in the history. Respond ONLY with a JSON object of the form \
{\"recommendations\": [{\"title\": string, \"artist\": string, \"reason\": string, \
\"similarity\": number between 0 and 1}]} and no other text.";

/// Full prompt text for one request
pub fn build_prompt(
    seed: &CanonicalTrackDescriptor,
    history: &[CanonicalTrackDescriptor],
    count: usize,
) -> String {
    let skip = history.len().saturating_sub(PROMPT_HISTORY_ENTRIES);
    let recent: Vec<Value> = history[skip..]
        .iter()
        .map(|h| json!({ "title": h.title, "artist": h.artist }))
        .collect();

    let input = json!({
        "current_track": {
            "title": seed.title,
            "artist": seed.artist,
            "duration_ms": seed.duration_ms,
        },
        "recent_history": recent,
        "count": count,
    });

    format!("{}\n\nInput:\n{}", INSTRUCTION, input)
}

/// First balanced `{ ... }` object in `text`
///
/// Tolerates markdown code fences and prose around the object; braces
/// inside JSON strings are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct RecommendationEnvelope {
    recommendations: Vec<Value>,
}

/// Parse and validate a provider reply
///
/// Entries missing a title or artist are dropped, duplicates collapsed and
/// the list truncated to `count`. A reply with no surviving entry is an
/// `InvalidResponse`.
pub fn parse_recommendations(
    text: &str,
    count: usize,
) -> Result<Vec<RecommendationDescriptor>, ProviderError> {
    let object = extract_json_object(text)
        .ok_or_else(|| ProviderError::InvalidResponse("no JSON object in reply".to_string()))?;

    let envelope: RecommendationEnvelope = serde_json::from_str(object)
        .map_err(|e| ProviderError::InvalidResponse(format!("unexpected shape: {}", e)))?;

    let mut seen = HashSet::new();
    let recommendations: Vec<RecommendationDescriptor> = envelope
        .recommendations
        .iter()
        .filter_map(validate_entry)
        .filter(|r| seen.insert((normalize(&r.artist), normalize(&r.title))))
        .take(count)
        .collect();

    if recommendations.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "no valid recommendations in reply".to_string(),
        ));
    }

    Ok(recommendations)
}

fn validate_entry(entry: &Value) -> Option<RecommendationDescriptor> {
    let text_field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let title = text_field("title")?;
    let artist = text_field("artist")?;
    let similarity = entry
        .get("similarity")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0) as f32);

    Some(RecommendationDescriptor {
        title,
        artist,
        reason: text_field("reason"),
        similarity,
    })
}
