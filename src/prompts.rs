//! Instructions sent to the vision model alongside the resume image.
//!
//! The template and the response-format description live here so prompt
//! changes never touch the pipeline or the normaliser, and so tests can
//! inspect them without a model.
//!
//! Templates use four placeholders, replaced verbatim in a single pass:
//! `{company_name}`, `{job_title}`, `{job_description}`, `{response_format}`.
//! Substituted text is never scanned again, so a job description that
//! itself contains `{job_title}` stays as written.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(company_name|job_title|job_description|response_format)\}").unwrap()
});

/// Shape of the JSON the model must return. Mirrors
/// [`crate::feedback::FeedbackDocument`].
pub const AI_RESPONSE_FORMAT: &str = r#"interface Feedback {
  overallScore: number; // max 100
  ATS: {
    score: number; // rate based on ATS suitability
    tips: {
      type: "good" | "improve";
      tip: string; // give 3-4 tips
    }[];
  };
  toneAndStyle: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string; // make it a short "title" for the actual explanation
      explanation: string; // explain in detail here
    }[]; // give 3-4 tips
  };
  content: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string; // make it a short "title" for the actual explanation
      explanation: string; // explain in detail here
    }[]; // give 3-4 tips
  };
  structure: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string; // make it a short "title" for the actual explanation
      explanation: string; // explain in detail here
    }[]; // give 3-4 tips
  };
  skills: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string; // make it a short "title" for the actual explanation
      explanation: string; // explain in detail here
    }[]; // give 3-4 tips
  };
}"#;

/// Default instruction template.
pub const DEFAULT_INSTRUCTIONS_TEMPLATE: &str = r#"You are an expert in ATS (Applicant Tracking System) and resume analysis.
Analyse and rate the attached resume image and suggest how to improve it.

Rules:
1. Be thorough and detailed. Do not hesitate to point out mistakes or areas for improvement.
2. If there is a lot to improve, give low scores. The rating can be low if the resume is bad.
3. Every score is an integer between 0 and 100.
4. Use the job description, when provided, to judge relevance of content and skills.

Company: {company_name}
Job title: {job_title}
Job description:
"""
{job_description}
"""

Provide the feedback using the following format:
{response_format}

Return the analysis as a single JSON object, without any other text and without code fences."#;

/// Fill a template with the job context.
///
/// Empty fields are rendered as `(not provided)` so the model does not read
/// a blank line as part of the surrounding instructions.
pub fn render_instructions(
    template: &str,
    company_name: &str,
    job_title: &str,
    job_description: &str,
) -> String {
    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "company_name" => or_placeholder(company_name),
            "job_title" => or_placeholder(job_title),
            "job_description" => or_placeholder(job_description),
            _ => AI_RESPONSE_FORMAT,
        })
        .into_owned()
}

fn or_placeholder(s: &str) -> &str {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        "(not provided)"
    } else {
        trimmed
    }
}
