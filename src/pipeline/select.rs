//! Image selection: one model call per record, ranking that record's page
//! candidates.
//!
//! The selector never fails. No candidates means no call and no image, as
//! does a candidate that cannot be attached. A reply without a usable
//! `index` (malformed JSON, out of range, or the call itself erroring after
//! its retries) leaves the record without an image and logs an
//! [`ImageIssue::SelectionAmbiguous`].

use super::encode::data_uri_to_image_data;
use super::llm::{generate, GenerativeModel, ModelRequest, RequestKind};
use crate::config::PipelineConfig;
use crate::error::ImageIssue;
use crate::prompts::selection_prompt;
use crate::records::ExtractedMediaRecord;
use edgequake_llm::ImageData;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct IndexReply {
    index: Value,
}

/// Read `{ "index": n }` out of a reply and check it against `len`.
///
/// Accepts a fenced object, an integral float (`1.0`) or a numeric string;
/// returns the reason when the reply cannot be used.
pub fn resolve_index(raw: &str, len: usize) -> Result<usize, String> {
    let body = raw.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .and_then(|b| b.trim_end().strip_suffix("```"))
        .unwrap_or(body)
        .trim();

    let reply: IndexReply =
        serde_json::from_str(body).map_err(|e| format!("reply is not an index object: {e}"))?;
    let index = match &reply.index {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.fract() == 0.0)
    .ok_or_else(|| format!("index {} is not an integer", reply.index))?;

    if index < 0.0 || index >= len as f64 {
        return Err(format!("index {index} outside 0..{len}"));
    }
    Ok(index as usize)
}

/// Pick the best of `candidates` for `record`, or `None`.
pub async fn select_best_image(
    model: &dyn GenerativeModel,
    candidates: &[String],
    record: &ExtractedMediaRecord,
    config: &PipelineConfig,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    // Every candidate must be attached, or the reply's index would not line up.
    let images: Option<Vec<_>> = candidates.iter().map(|c| data_uri_to_image_data(c)).collect();
    let outcome = match images {
        None => Err("a candidate is not a base64 data URI".to_string()),
        Some(images) => request_index(model, images, candidates.len(), record, config).await,
    };

    match outcome {
        Ok(index) => Some(candidates[index].clone()),
        Err(detail) => {
            warn!(
                "{}",
                ImageIssue::SelectionAmbiguous {
                    page: record.page,
                    detail,
                }
            );
            None
        }
    }
}

async fn request_index(
    model: &dyn GenerativeModel,
    images: Vec<ImageData>,
    len: usize,
    record: &ExtractedMediaRecord,
    config: &PipelineConfig,
) -> Result<usize, String> {
    let request = ModelRequest {
        kind: RequestKind::SelectImage,
        system: None,
        text: selection_prompt(record, len),
        images,
        temperature: config.temperature,
        max_tokens: 256,
    };

    match generate(model, &request, &config.retry).await {
        Ok(reply) => {
            debug!(
                "Selection for page {} used {} tokens",
                record.page,
                reply.prompt_tokens + reply.completion_tokens
            );
            resolve_index(&reply.content, len)
        }
        Err(e) => Err(format!("selection call failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_fenced_indices() {
        assert_eq!(resolve_index(r#"{"index": 2}"#, 3), Ok(2));
        assert_eq!(resolve_index("```json\n{\"index\": 0}\n```", 1), Ok(0));
        assert_eq!(resolve_index(r#"{"index": 1.0}"#, 2), Ok(1));
        assert_eq!(resolve_index(r#"{"index": "1"}"#, 2), Ok(1));
    }

    #[test]
    fn rejects_out_of_range_and_malformed() {
        assert!(resolve_index(r#"{"index": 3}"#, 3).is_err());
        assert!(resolve_index(r#"{"index": -1}"#, 3).is_err());
        assert!(resolve_index(r#"{"index": 0.5}"#, 3).is_err());
        assert!(resolve_index(r#"{"best": 0}"#, 3).is_err());
        assert!(resolve_index("the second one", 3).is_err());
        assert!(resolve_index(r#"{"index": null}"#, 3).is_err());
    }
}
