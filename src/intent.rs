//! Heuristic text strategies: scheduling intent and identity capture.
//!
//! Both are plain `(text) -> Option<match>` strategies behind traits so the
//! conversation core can swap them for a real classifier. Closures with the
//! right signature implement the traits directly.

use regex::Regex;
use std::sync::LazyLock;

/// A scheduling phrase found in an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingMatch {
    pub phrase: String,
}

/// Decides whether an assistant reply should open the booking surface.
pub trait SchedulingDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<SchedulingMatch>;
}

impl<F> SchedulingDetector for F
where
    F: Fn(&str) -> Option<SchedulingMatch> + Send + Sync,
{
    fn detect(&self, text: &str) -> Option<SchedulingMatch> {
        self(text)
    }
}

/// Case-insensitive substring scan over a phrase list.
///
/// False positives and negatives are accepted.
#[derive(Debug, Clone)]
pub struct PhraseDetector {
    phrases: Vec<String>,
}

impl PhraseDetector {
    #[must_use]
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SCHEDULING_PHRASES)
    }
}

impl SchedulingDetector for PhraseDetector {
    fn detect(&self, text: &str) -> Option<SchedulingMatch> {
        let haystack = normalize(text);
        self.phrases
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(|p| SchedulingMatch { phrase: p.clone() })
    }
}

/// Lowercase and collapse whitespace; curly apostrophes become straight ones.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contact details found in one piece of user text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl IdentityMatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// Pulls a name and/or email out of free text.
pub trait IdentityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Option<IdentityMatch>;
}

impl<F> IdentityExtractor for F
where
    F: Fn(&str) -> Option<IdentityMatch> + Send + Sync,
{
    fn extract(&self, text: &str) -> Option<IdentityMatch> {
        self(text)
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("email pattern is valid")
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\bmy name is|\bi am|\bi'm|\bim|\bthis is|\bcall me|\bname's)\s+([A-Za-z][A-Za-z'\-]*)(?:\s+([A-Z][a-z'\-]+))?",
    )
    .expect("name pattern is valid")
});

/// Regex heuristics: emails anywhere, names after introductions.
///
/// Last match wins within one text. No validation, no confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexIdentityExtractor;

impl IdentityExtractor for RegexIdentityExtractor {
    fn extract(&self, text: &str) -> Option<IdentityMatch> {
        let email = EMAIL_RE
            .find_iter(text)
            .last()
            .map(|m| m.as_str().trim_end_matches('.').to_owned());

        let name = NAME_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let first = caps.get(1)?.as_str();
                if is_non_name(first) {
                    return None;
                }
                let mut name = capitalize_first(first);
                if let Some(last) = caps.get(2) {
                    if !is_non_name(last.as_str()) {
                        name.push(' ');
                        name.push_str(last.as_str());
                    }
                }
                Some(name)
            })
            .last();

        let found = IdentityMatch { name, email };
        (!found.is_empty()).then_some(found)
    }
}

/// Words that follow "I'm" / "this is" far more often than a name does.
fn is_non_name(token: &str) -> bool {
    matches!(
        token.to_ascii_lowercase().as_str(),
        "a" | "an"
            | "the"
            | "not"
            | "just"
            | "so"
            | "very"
            | "really"
            | "also"
            | "still"
            | "here"
            | "there"
            | "interested"
            | "looking"
            | "trying"
            | "wondering"
            | "hoping"
            | "planning"
            | "thinking"
            | "calling"
            | "going"
            | "getting"
            | "working"
            | "ready"
            | "free"
            | "available"
            | "busy"
            | "good"
            | "great"
            | "fine"
            | "ok"
            | "okay"
            | "sure"
            | "glad"
            | "happy"
            | "new"
            | "from"
            | "with"
            | "in"
            | "at"
            | "on"
            | "for"
            | "about"
            | "and"
            | "it"
            | "that"
            | "what"
            | "urgent"
            | "sorry"
            | "afraid"
    )
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => {
            let mut out = c.to_uppercase().to_string();
            out.push_str(chars.as_str());
            out
        }
        None => String::new(),
    }
}
