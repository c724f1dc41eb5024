//! Requirement interpretation.
//!
//! Turns raw text into an [`Understanding`]: domain hints from a keyword
//! lexicon and explicit context, ordered key questions, and a complexity
//! estimate. Pure and deterministic for a given lexicon.
//!
//! Failures are returned as [`InterpretError`]; the pipeline recovers from
//! them locally with [`Understanding::degraded`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{Complexity, Requirement, Understanding};
use crate::registry::ComponentRegistry;

const INTERROGATIVES: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "should", "can", "could", "would",
    "is", "are", "does", "do", "will",
];

/// Context keys whose comma-separated values are taken as explicit hints.
const CONTEXT_HINT_KEYS: &[&str] = &["domain", "domains"];

static BULLET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("hardcoded regex pattern is valid")
});

static SENTENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.?!]+[.?!]*").expect("hardcoded regex pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error("requirement text is empty")]
    EmptyText,
}

/// Keyword -> capability tags mapping used to derive domain hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainLexicon {
    keywords: BTreeMap<String, BTreeSet<String>>,
}

impl DomainLexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability tag in the registry is its own keyword; `extra`
    /// adds synonyms per tag. The fallback's tags are skipped.
    pub fn from_registry(
        registry: &ComponentRegistry,
        extra: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut lexicon = Self::new();
        for descriptor in registry
            .descriptors()
            .filter(|d| d.id != registry.fallback_id())
        {
            for tag in &descriptor.capability_tags {
                lexicon.add(tag, tag);
            }
        }
        for (tag, words) in extra {
            for word in words {
                lexicon.add(tag, word);
            }
        }
        lexicon
    }

    pub fn add(&mut self, tag: &str, keyword: &str) {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return;
        }
        self.keywords
            .entry(keyword)
            .or_default()
            .insert(tag.to_string());
    }

    pub fn with(mut self, tag: &str, keyword: &str) -> Self {
        self.add(tag, keyword);
        self
    }

    /// Tags whose keywords appear as whole words in `normalized_text`.
    fn matches(&self, normalized_text: &str) -> BTreeSet<String> {
        let padded = format!(" {normalized_text} ");
        self.keywords
            .iter()
            .filter(|(keyword, _)| padded.contains(&format!(" {keyword} ")))
            .flat_map(|(_, tags)| tags.iter().cloned())
            .collect()
    }
}

/// Stateless interpreter over a fixed lexicon.
#[derive(Debug, Clone, Default)]
pub struct RequirementInterpreter {
    lexicon: DomainLexicon,
}

impl RequirementInterpreter {
    pub fn new(lexicon: DomainLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &DomainLexicon {
        &self.lexicon
    }

    /// Interpret a requirement.
    ///
    /// Returns [`InterpretError::EmptyText`] for blank input.
    pub fn interpret(&self, requirement: &Requirement) -> Result<Understanding, InterpretError> {
        let text = requirement.raw_text.trim();
        if text.is_empty() {
            return Err(InterpretError::EmptyText);
        }

        let mut domain_hints = self.lexicon.matches(&normalize(text));
        for key in CONTEXT_HINT_KEYS {
            if let Some(value) = requirement.context.get(*key) {
                domain_hints.extend(
                    value
                        .split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty()),
                );
            }
        }

        let extracted = extract_questions(text);
        let complexity = estimate_complexity(text, extracted.len());
        let key_questions = if extracted.is_empty() {
            vec![collapse_whitespace(text)]
        } else {
            extracted
        };

        debug!(
            hints = ?domain_hints,
            questions = key_questions.len(),
            complexity = %complexity,
            "requirement interpreted"
        );

        Ok(Understanding {
            domain_hints,
            key_questions,
            complexity,
            preferred_components: requirement.preferred_components.clone(),
            degraded: false,
        })
    }
}

/// Lowercase, punctuation to spaces, single-spaced.
pub(crate) fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&mapped)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bullet items and interrogative sentences, in order, deduplicated.
fn extract_questions(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut questions = Vec::new();
    let mut push = |q: String| {
        if q.len() >= 3 && seen.insert(q.to_lowercase()) {
            questions.push(q);
        }
    };

    for line in text.lines() {
        if let Some(item) = BULLET_REGEX.captures(line).and_then(|c| c.get(1)) {
            push(collapse_whitespace(item.as_str()));
            continue;
        }
        for m in SENTENCE_REGEX.find_iter(line) {
            let s = collapse_whitespace(m.as_str());
            if is_question(&s) {
                push(s);
            }
        }
    }
    questions
}

fn is_question(sentence: &str) -> bool {
    if sentence.ends_with('?') {
        return true;
    }
    sentence
        .split_whitespace()
        .next()
        .map(|w| w.to_lowercase())
        .is_some_and(|w| INTERROGATIVES.contains(&w.as_str()))
}

/// Words, questions and line structure folded into three buckets.
fn estimate_complexity(text: &str, question_count: usize) -> Complexity {
    let words = text.split_whitespace().count();
    let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    let score = words / 40 + question_count + lines.saturating_sub(1) / 2;
    match score {
        0..=1 => Complexity::Low,
        2..=4 => Complexity::Medium,
        _ => Complexity::High,
    }
}
