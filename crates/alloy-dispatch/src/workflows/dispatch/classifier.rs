use serde::Serialize;

const ACCEPT_KEYWORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "yea", "yup", "sure", "ok", "okay", "accept",
];
const DECLINE_KEYWORDS: &[&str] = &["no", "n", "nope", "nah", "decline", "pass"];
const JOB_REFERENCE_PREFIX: &str = "job-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    Accept,
    Decline,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedReply {
    pub intent: ReplyIntent,
    /// Job id named in the reply, e.g. `YES job-000042`.
    pub job_reference: Option<String>,
}

/// Classify a contractor's SMS reply by its leading keyword.
pub fn classify(text: &str) -> ClassifiedReply {
    let normalized = text.trim().to_ascii_lowercase();
    let mut tokens = normalized
        .split_whitespace()
        .map(|token| token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric() && ch != '-'))
        .filter(|token| !token.is_empty());

    let intent = match tokens.next() {
        Some(first) if ACCEPT_KEYWORDS.contains(&first) => ReplyIntent::Accept,
        Some(first) if DECLINE_KEYWORDS.contains(&first) => ReplyIntent::Decline,
        _ => ReplyIntent::Ambiguous,
    };

    let job_reference = tokens
        .find(|token| token.starts_with(JOB_REFERENCE_PREFIX) && token.len() > JOB_REFERENCE_PREFIX.len())
        .map(str::to_string);

    ClassifiedReply {
        intent,
        job_reference,
    }
}
