//! Rule-engine tier: per-intent phrase/keyword patterns plus audience and
//! complexity cue detection. Grounded on `agent/loop/intent.rs`'s
//! `LazyLock<Regex>` static-pattern style.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Child,
    Beginner,
    Intermediate,
    Expert,
    General,
}

#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub intent: String,
    pub score: f64,
    pub complexity: Complexity,
    pub audience: Audience,
    pub matched_patterns: Vec<String>,
}

struct IntentPatterns {
    intent: &'static str,
    phrases: LazyLock<Vec<Regex>>,
    keywords: &'static [&'static str],
}

macro_rules! intent_patterns {
    ($intent:expr, $phrases:expr, $keywords:expr) => {
        IntentPatterns {
            intent: $intent,
            phrases: LazyLock::new(|| {
                $phrases
                    .iter()
                    .map(|p: &&str| Regex::new(p).expect("static pattern is valid"))
                    .collect()
            }),
            keywords: $keywords,
        }
    };
}

static QUESTION_ANSWERING: IntentPatterns = intent_patterns!(
    "question_answering",
    [r"(?i)^(what|who|when|where|why|how)\b", r"(?i)\bcan you (tell|explain)\b"],
    &["what is", "define", "meaning of", "explain"]
);
static CREATIVE_WRITING: IntentPatterns = intent_patterns!(
    "creative_writing",
    [r"(?i)\bwrite a (story|poem|song|novel)\b"],
    &["story", "poem", "fiction", "creative", "narrative", "character"]
);
static CODE_GENERATION: IntentPatterns = intent_patterns!(
    "code_generation",
    [r"(?i)\bwrite (a|the)\b.*\b(function|program|script|code)\b", r"(?i)\bimplement\b.*\b(function|algorithm|class)\b"],
    &["function", "code", "program", "script", "implement", "python", "rust", "javascript"]
);
static DATA_ANALYSIS: IntentPatterns = intent_patterns!(
    "data_analysis",
    [r"(?i)\banalyz(e|ing)\b.*\bdata\b"],
    &["dataset", "statistics", "correlation", "trend", "visualize", "csv"]
);
static REASONING: IntentPatterns = intent_patterns!(
    "reasoning",
    [r"(?i)\b(why|how come)\b.*\bwould\b"],
    &["reasoning", "logic", "deduce", "infer", "because"]
);
static SUMMARIZATION: IntentPatterns = intent_patterns!(
    "summarization",
    [r"(?i)\bsummariz(e|ing)\b", r"(?i)\btl;?dr\b"],
    &["summary", "summarize", "shorten", "condense", "tldr"]
);
static TRANSLATION: IntentPatterns = intent_patterns!(
    "translation",
    [r"(?i)\btranslate\b.*\bto\b"],
    &["translate", "translation", "in spanish", "in french", "in german"]
);
static CONVERSATION: IntentPatterns = intent_patterns!(
    "conversation",
    [r"(?i)^(hi|hello|hey)\b"],
    &["chat", "talk", "conversation", "how are you"]
);
static TASK_PLANNING: IntentPatterns = intent_patterns!(
    "task_planning",
    [r"(?i)\bplan\b.*\b(trip|project|schedule)\b"],
    &["plan", "schedule", "itinerary", "roadmap", "timeline"]
);
static PROBLEM_SOLVING: IntentPatterns = intent_patterns!(
    "problem_solving",
    [r"(?i)\bhelp me (solve|fix|figure out)\b"],
    &["solve", "fix", "troubleshoot", "debug", "problem"]
);

static ALL_INTENTS: LazyLock<Vec<&'static IntentPatterns>> = LazyLock::new(|| {
    vec![
        &QUESTION_ANSWERING,
        &CREATIVE_WRITING,
        &CODE_GENERATION,
        &DATA_ANALYSIS,
        &REASONING,
        &SUMMARIZATION,
        &TRANSLATION,
        &CONVERSATION,
        &TASK_PLANNING,
        &PROBLEM_SOLVING,
    ]
});

static CHILD_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*[- ]?year[- ]?old\b|\bfor a child\b|\bfor kids\b").unwrap());
static EXPERT_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(expert|advanced|professional|phd|researcher)\b").unwrap());
static BEGINNER_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(beginner|new to|just starting|never (done|tried))\b").unwrap());

const PHRASE_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.25;
const AUDIENCE_WEIGHT: f64 = 0.15;

/// Runs the full rule inventory against `text`, returning the single
/// best-scoring intent and the detected audience/complexity.
pub fn classify(text: &str) -> RuleMatch {
    let lower = text.to_lowercase();
    let mut best: Option<(&'static str, f64, Vec<String>)> = None;

    for patterns in ALL_INTENTS.iter() {
        let mut score = 0.0;
        let mut matched = Vec::new();

        for phrase in patterns.phrases.iter() {
            if phrase.is_match(text) {
                score += PHRASE_WEIGHT;
                matched.push(format!("phrase:{}", phrase.as_str()));
                break;
            }
        }
        let keyword_hits = patterns.keywords.iter().filter(|k| lower.contains(**k)).count();
        if keyword_hits > 0 {
            score += KEYWORD_WEIGHT * (keyword_hits.min(2) as f64 / 2.0);
            matched.push(format!("keywords:{keyword_hits}"));
        }

        let audience = detect_audience(&lower);
        if audience != Audience::General {
            score += AUDIENCE_WEIGHT;
        }

        score = score.min(1.0);

        if best.as_ref().map(|(_, s, _)| score > *s).unwrap_or(true) {
            best = Some((patterns.intent, score, matched));
        }
    }

    let (intent, score, matched_patterns) = best.unwrap_or(("conversation", 0.0, Vec::new()));
    let audience = detect_audience(&lower);
    let complexity = detect_complexity(text, audience);

    RuleMatch {
        intent: intent.to_string(),
        score,
        complexity,
        audience,
        matched_patterns,
    }
}

fn detect_audience(lower_text: &str) -> Audience {
    if let Some(caps) = CHILD_CUE.captures(lower_text) {
        if let Some(age) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
            if age <= 12 {
                return Audience::Child;
            }
        } else {
            return Audience::Child;
        }
    }
    if BEGINNER_CUE.is_match(lower_text) {
        return Audience::Beginner;
    }
    if EXPERT_CUE.is_match(lower_text) {
        return Audience::Expert;
    }
    Audience::General
}

/// Complexity from length, clause count (comma/conjunction count), and
/// explicit cues. A detected child audience always forces `Simple`,
/// matching the "5 year old -> child -> force simple" cue named in the spec.
fn detect_complexity(text: &str, audience: Audience) -> Complexity {
    if audience == Audience::Child {
        return Complexity::Simple;
    }
    let len = text.chars().count();
    let clauses = text.matches(',').count()
        + text.matches(" and ").count()
        + text.matches(" then ").count()
        + text.matches(" but ").count();

    match (len, clauses) {
        (l, c) if l > 280 || c >= 4 => Complexity::Complex,
        (l, c) if l > 100 || c >= 2 => Complexity::Moderate,
        _ => Complexity::Simple,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_generation_phrase_scores_high() {
        let m = classify("Write a Python function to sort a list");
        assert_eq!(m.intent, "code_generation");
        assert!(m.score >= 0.8);
    }

    #[test]
    fn vague_text_scores_low() {
        let m = classify("Help me with this");
        assert!(m.score < 0.5);
    }

    #[test]
    fn child_cue_forces_simple_complexity() {
        let m = classify("Explain photosynthesis for a 7 year old");
        assert_eq!(m.audience, Audience::Child);
        assert_eq!(m.complexity, Complexity::Simple);
    }

    #[test]
    fn long_multiclause_text_is_complex() {
        let text = "Analyze the dataset, then build a model, and evaluate it, but also consider bias, and document findings across every stage of the pipeline in detail with full citations";
        let m = classify(text);
        assert_eq!(m.complexity, Complexity::Complex);
    }

    #[test]
    fn expert_cue_detected() {
        let m = classify("As an expert researcher, analyze this dataset");
        assert_eq!(m.audience, Audience::Expert);
    }
}
