//! The structured feedback document produced by the AI service.
//!
//! Field names follow the JSON the service is instructed to emit
//! (`toneAndStyle`, `content`, `structure`, `skills`, `ATS`,
//! `overallScore`). Parsing is deliberately lenient: every field is
//! optional, scores keep their original JSON number, unknown tip types are
//! kept by name, and unknown fields at any level are carried through in an
//! `extra` map. Whatever parses is persisted unchanged; completeness is
//! judged separately by [`FeedbackDocument::is_complete`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Upper bound of the closed score domain `[0, 100]`.
pub const MAX_SCORE: f64 = 100.0;

/// A score exactly as the service wrote it (`80`, `82.5`, `-5` …).
pub type Score = Number;

/// `true` when `score` is present and within `[0, 100]`.
pub fn score_in_range(score: Option<&Score>) -> bool {
    score
        .and_then(Number::as_f64)
        .is_some_and(|s| (0.0..=MAX_SCORE).contains(&s))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<Score>,

    #[serde(rename = "ATS", default, skip_serializing_if = "Option::is_none")]
    pub ats: Option<AtsSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_and_style: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Category>,

    /// Top-level fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One scored category with its ordered tips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default)]
    pub tips: Vec<Tip>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TipKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `good` and `improve` are the two kinds the service is asked for; any
/// other tag is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TipKind {
    Good,
    Improve,
    Other(String),
}

impl TipKind {
    pub fn as_str(&self) -> &str {
        match self {
            TipKind::Good => "good",
            TipKind::Improve => "improve",
            TipKind::Other(tag) => tag,
        }
    }
}

impl Serialize for TipKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TipKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "good" => TipKind::Good,
            "improve" => TipKind::Improve,
            _ => TipKind::Other(tag),
        })
    }
}

/// Applicant-tracking-system compatibility section. Its tips carry no
/// explanation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AtsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default)]
    pub tips: Vec<AtsTip>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AtsTip {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TipKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The four fixed categories every complete document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    ToneAndStyle,
    Content,
    Structure,
    Skills,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 4] = [
        CategoryKind::ToneAndStyle,
        CategoryKind::Content,
        CategoryKind::Structure,
        CategoryKind::Skills,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CategoryKind::ToneAndStyle => "Tone & Style",
            CategoryKind::Content => "Content",
            CategoryKind::Structure => "Structure",
            CategoryKind::Skills => "Skills",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse band used when presenting a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score > 69.0 {
            ScoreBand::Strong
        } else if score > 49.0 {
            ScoreBand::Fair
        } else {
            ScoreBand::Weak
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            ScoreBand::Strong => "Great Job!",
            ScoreBand::Fair => "Good Start",
            ScoreBand::Weak => "Needs Improvement",
        }
    }
}

impl FeedbackDocument {
    pub fn category(&self, kind: CategoryKind) -> Option<&Category> {
        match kind {
            CategoryKind::ToneAndStyle => self.tone_and_style.as_ref(),
            CategoryKind::Content => self.content.as_ref(),
            CategoryKind::Structure => self.structure.as_ref(),
            CategoryKind::Skills => self.skills.as_ref(),
        }
    }

    /// Categories present in the document, in their fixed order.
    pub fn categories(&self) -> impl Iterator<Item = (CategoryKind, &Category)> {
        CategoryKind::ALL
            .into_iter()
            .filter_map(|kind| self.category(kind).map(|c| (kind, c)))
    }

    /// All four categories present, each scored within `[0, 100]`; the
    /// optional overall and ATS scores must be in range when present.
    pub fn is_complete(&self) -> bool {
        let categories_ok = CategoryKind::ALL
            .iter()
            .all(|&kind| self.category(kind).is_some_and(|c| score_in_range(c.score.as_ref())));
        let overall_ok = self
            .overall_score
            .as_ref()
            .is_none_or(|s| score_in_range(Some(s)));
        let ats_ok = self
            .ats
            .as_ref()
            .and_then(|a| a.score.as_ref())
            .is_none_or(|s| score_in_range(Some(s)));
        categories_ok && overall_ok && ats_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn category(score: u8) -> Value {
        json!({
            "score": score,
            "tips": [
                {"type": "good", "tip": "Clear headings", "explanation": "Sections are easy to scan."},
                {"type": "improve", "tip": "Quantify impact", "explanation": "Add metrics to bullet points."}
            ]
        })
    }

    fn full_document() -> Value {
        json!({
            "overallScore": 78,
            "ATS": {"score": 80, "tips": [{"type": "good", "tip": "Standard section names"}]},
            "toneAndStyle": category(75),
            "content": category(70),
            "structure": category(82),
            "skills": category(64)
        })
    }

    #[test]
    fn parses_full_document_and_round_trips_exactly() {
        let value = full_document();
        let doc: FeedbackDocument = serde_json::from_value(value.clone()).unwrap();
        assert!(doc.is_complete());
        assert_eq!(doc.categories().count(), 4);
        assert_eq!(doc.skills.as_ref().unwrap().tips[1].kind, Some(TipKind::Improve));
        assert_eq!(serde_json::to_value(&doc).unwrap(), value);
    }

    #[test]
    fn missing_category_parses_but_is_incomplete() {
        let mut value = full_document();
        value.as_object_mut().unwrap().remove("skills");
        let doc: FeedbackDocument = serde_json::from_value(value).unwrap();
        assert!(!doc.is_complete());
        assert_eq!(doc.categories().count(), 3);
    }

    #[test]
    fn out_of_range_score_is_incomplete() {
        let mut value = full_document();
        value["content"]["score"] = json!(140);
        let doc: FeedbackDocument = serde_json::from_value(value).unwrap();
        assert!(!doc.is_complete());
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let mut value = full_document();
        value["summary"] = json!("Solid backend profile");
        let doc: FeedbackDocument = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(doc.extra["summary"], "Solid backend profile");
        assert_eq!(serde_json::to_value(&doc).unwrap(), value);
    }

    #[test]
    fn fractional_scores_and_nested_extras_round_trip() {
        let value = json!({
            "overallScore": 77.5,
            "ATS": {"score": 81, "keywords": ["rust"], "tips": [{"type": "good", "tip": "Plain layout", "weight": 2}]},
            "toneAndStyle": {
                "score": 82.5,
                "summary": "nice",
                "tips": [
                    {"type": "neutral", "tip": "Formal register", "explanation": "Fine for banking.", "priority": 1},
                    {"type": "improve", "tip": "Fewer adverbs"}
                ]
            },
            "content": {"score": -5, "tips": []},
            "structure": {"tips": []},
            "skills": category(64)
        });
        let doc: FeedbackDocument = serde_json::from_value(value.clone()).unwrap();

        assert_eq!(serde_json::to_value(&doc).unwrap(), value);
        let tone = doc.tone_and_style.as_ref().unwrap();
        assert_eq!(tone.extra["summary"], "nice");
        assert_eq!(tone.tips[0].kind, Some(TipKind::Other("neutral".into())));
        assert_eq!(tone.tips[0].extra["priority"], 1);
        assert_eq!(tone.tips[1].explanation, None);
        assert_eq!(doc.ats.as_ref().unwrap().tips[0].extra["weight"], 2);
        // Negative and missing scores parse but do not make a complete document.
        assert!(!doc.is_complete());
    }

    #[test]
    fn fractional_scores_in_range_are_complete() {
        let mut value = full_document();
        value["toneAndStyle"]["score"] = json!(82.5);
        value["overallScore"] = json!(99.9);
        let doc: FeedbackDocument = serde_json::from_value(value).unwrap();
        assert!(doc.is_complete());
    }

    #[test]
    fn tip_kind_tags() {
        let kinds: Vec<TipKind> = serde_json::from_value(json!(["good", "improve", "neutral"])).unwrap();
        assert_eq!(
            kinds,
            vec![TipKind::Good, TipKind::Improve, TipKind::Other("neutral".into())]
        );
        assert_eq!(serde_json::to_value(&kinds).unwrap(), json!(["good", "improve", "neutral"]));
    }

    #[test]
    fn score_range() {
        assert!(score_in_range(Some(&Number::from(0))));
        assert!(score_in_range(Some(&Number::from(100))));
        assert!(!score_in_range(Some(&Number::from(-5))));
        assert!(!score_in_range(Number::from_f64(100.5).as_ref()));
        assert!(!score_in_range(None));
    }

    #[test]
    fn score_bands() {
        assert_eq!(ScoreBand::of(70.0), ScoreBand::Strong);
        assert_eq!(ScoreBand::of(69.5), ScoreBand::Strong);
        assert_eq!(ScoreBand::of(69.0), ScoreBand::Fair);
        assert_eq!(ScoreBand::of(50.0), ScoreBand::Fair);
        assert_eq!(ScoreBand::of(49.0), ScoreBand::Weak);
        assert_eq!(ScoreBand::Weak.headline(), "Needs Improvement");
    }
}
