//! Keyword classifier for the coarse sensitivity tag.
//!
//! The tag is informational metadata carried on every resolved request;
//! nothing in this core enforces policy on it.

use crate::types::SensitivityTag;

const SACRED_KEYWORDS: [&str; 5] = ["sacred", "ceremonial", "burial", "ancestral", "heritage"];

const SENSITIVE_KEYWORDS: [&str; 6] = [
    "sensitive",
    "endangered",
    "habitat",
    "private",
    "restricted",
    "confidential",
];

pub fn classify_prompt(prompt: &str) -> SensitivityTag {
    let lowered = prompt.to_lowercase();
    if SACRED_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        SensitivityTag::Sacred
    } else if SENSITIVE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        SensitivityTag::Sensitive
    } else {
        SensitivityTag::Public
    }
}
