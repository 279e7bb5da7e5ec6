//! Recover one [`FeedbackDocument`] from whatever the AI service returned.
//!
//! The service is a third party and its response shape is not stable. A
//! response is reduced to a *candidate message* (first element of an array,
//! else the value; a `message` envelope is unwrapped), then matched against
//! a closed set of [`ResponseShape`]s in fixed priority order. The first
//! shape that yields text wins.
//!
//! ```text
//! Text            {"content": "…"}
//! Parts           {"content": ["…", {"text": "…"}, {"text": {"content": "…"}}, {"content": "…"}]}
//! ChatCompletion  {"choices": [{"message": {"content": "…"}}]}
//! Bare            "…"
//! ```
//!
//! The JSON candidate is the slice from the first `{` to the last `}`,
//! which strips prose and code fences models like to add around it.

use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

use crate::error::NormalizeError;
use crate::feedback::FeedbackDocument;

/// The response shapes understood by [`normalize`], in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape<'a> {
    /// `content` is a string.
    Text(&'a str),
    /// `content` is a list of parts.
    Parts(&'a [Value]),
    /// OpenAI chat-completion body.
    ChatCompletion(&'a str),
    /// The candidate message is itself a string.
    Bare(&'a str),
}

impl<'a> ResponseShape<'a> {
    /// Every shape `candidate` matches, highest priority first.
    pub fn detect(candidate: &'a Value) -> Vec<ResponseShape<'a>> {
        let message = match candidate.get("message") {
            Some(m) if m.is_object() || m.is_string() => m,
            _ => candidate,
        };
        let content = message
            .get("content")
            .or_else(|| candidate.get("content"));

        let mut shapes = Vec::with_capacity(2);
        match content {
            Some(Value::String(text)) => shapes.push(ResponseShape::Text(text)),
            Some(Value::Array(parts)) => shapes.push(ResponseShape::Parts(parts)),
            _ => {}
        }
        if let Some(text) = candidate
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        {
            shapes.push(ResponseShape::ChatCompletion(text));
        }
        if let Some(text) = message.as_str() {
            shapes.push(ResponseShape::Bare(text));
        }
        shapes
    }

    /// The textual payload, or `None` when the shape carries no text
    /// (an empty string, or a part list with no text in it).
    pub fn text(&self) -> Option<Cow<'a, str>> {
        let text = match *self {
            ResponseShape::Text(text)
            | ResponseShape::ChatCompletion(text)
            | ResponseShape::Bare(text) => Cow::Borrowed(text),
            ResponseShape::Parts(parts) => {
                let fragments: Vec<&str> = parts.iter().filter_map(part_text).collect();
                Cow::Owned(fragments.join("\n"))
            }
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Text of one part: the part itself, `text`, `text.content`, then
/// `content`, each tried independently.
fn part_text(part: &Value) -> Option<&str> {
    part.as_str()
        .or_else(|| part.get("text").and_then(Value::as_str))
        .or_else(|| part.pointer("/text/content").and_then(Value::as_str))
        .or_else(|| part.get("content").and_then(Value::as_str))
}

/// First element of an array response, else the response itself.
pub fn candidate_message(raw: &Value) -> &Value {
    match raw {
        Value::Array(items) => items.first().unwrap_or(raw),
        other => other,
    }
}

/// Textual payload of a raw response under the first matching shape.
pub fn extract_text(raw: &Value) -> Option<Cow<'_, str>> {
    ResponseShape::detect(candidate_message(raw))
        .iter()
        .find_map(ResponseShape::text)
}

/// Slice from the first `{` to the last `}`, or the whole text when there
/// is no such pair.
pub fn json_candidate(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Normalize a raw AI response into a feedback document.
///
/// # Errors
/// * [`NormalizeError::UnrecognizedShape`] — no shape yielded any text.
/// * [`NormalizeError::MalformedJson`] — text was found but the candidate
///   slice does not parse; the slice is carried in the error.
pub fn normalize(raw: &Value) -> Result<FeedbackDocument, NormalizeError> {
    let Some(text) = extract_text(raw) else {
        debug!("Unrecognised AI response: {}", raw);
        return Err(NormalizeError::UnrecognizedShape);
    };

    let candidate = json_candidate(&text);
    serde_json::from_str::<FeedbackDocument>(candidate).map_err(|e| {
        debug!("Feedback JSON did not parse ({e}); candidate: {candidate}");
        NormalizeError::MalformedJson {
            candidate: candidate.to_string(),
            detail: e.to_string(),
        }
    })
}
