//! The persisted analysis record and its key scheme.
//!
//! A record is written twice: once right after both uploads with
//! [`RecordFeedback::Pending`], and again once the feedback has been
//! normalised. The pending form serialises `feedback` as an empty string,
//! which is what readers of the key-value store treat as "analysis not
//! finished".

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::feedback::FeedbackDocument;

/// Default key prefix: records live at `resume:<uuid>`.
pub const DEFAULT_KEY_PREFIX: &str = "resume";

/// Key-value key for a record id.
pub fn record_key(prefix: &str, id: &Uuid) -> String {
    format!("{prefix}:{id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub resume_ref: String,
    pub image_ref: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    pub feedback: RecordFeedback,
}

impl AnalysisRecord {
    pub fn is_pending(&self) -> bool {
        matches!(self.feedback, RecordFeedback::Pending)
    }

    pub fn feedback(&self) -> Option<&FeedbackDocument> {
        match &self.feedback {
            RecordFeedback::Pending => None,
            RecordFeedback::Ready(doc) => Some(doc),
        }
    }
}

/// Either the empty sentinel or a parsed feedback document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordFeedback {
    #[default]
    Pending,
    Ready(FeedbackDocument),
}

impl Serialize for RecordFeedback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordFeedback::Pending => serializer.serialize_str(""),
            RecordFeedback::Ready(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RecordFeedback {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(RecordFeedback::Pending),
            Value::String(s) if s.is_empty() => Ok(RecordFeedback::Pending),
            other @ Value::Object(_) => serde_json::from_value(other)
                .map(RecordFeedback::Ready)
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected feedback object or empty string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(feedback: RecordFeedback) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::nil(),
            resume_ref: "/uploads/cv.pdf".into(),
            image_ref: "/uploads/cv.png".into(),
            company_name: "Acme".into(),
            job_title: "Engineer".into(),
            job_description: "Build things".into(),
            feedback,
        }
    }

    #[test]
    fn key_scheme() {
        let id = Uuid::nil();
        assert_eq!(
            record_key(DEFAULT_KEY_PREFIX, &id),
            "resume:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn pending_feedback_serialises_as_empty_string() {
        let value = serde_json::to_value(record(RecordFeedback::Pending)).unwrap();
        assert_eq!(value["feedback"], json!(""));
        assert_eq!(value["resumeRef"], "/uploads/cv.pdf");
        assert_eq!(value["companyName"], "Acme");
    }

    #[test]
    fn pending_and_ready_parse_back() {
        let pending = record(RecordFeedback::Pending);
        let json = serde_json::to_string(&pending).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert!(back.is_pending());

        let doc: FeedbackDocument =
            serde_json::from_value(json!({"overallScore": 60, "content": {"score": 60, "tips": []}})).unwrap();
        let ready = record(RecordFeedback::Ready(doc.clone()));
        let json = serde_json::to_string(&ready).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.feedback(), Some(&doc));
    }

    #[test]
    fn non_empty_string_feedback_is_rejected() {
        let mut value = serde_json::to_value(record(RecordFeedback::Pending)).unwrap();
        value["feedback"] = json!("oops");
        assert!(serde_json::from_value::<AnalysisRecord>(value).is_err());
    }
}
