//! Keyword classifier that picks a backend for a prompt.
//!
//! Pure and stateless: the same text always yields the same [`Backend`].
//! Patterns are case-insensitive regexes bounded by `\b`, so `what time`
//! matches `"What time is it?"` but not `"somewhat timely"`.
//!
//! Rules, in order:
//! 1. Empty text → local.
//! 2. Five words or fewer → remote only if a remote pattern matches.
//! 3. Any local pattern → local.
//! 4. Any remote pattern → remote.
//! 5. 25 words or more → remote.
//! 6. Otherwise → local.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Which generator should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Local,
    Remote,
}

impl Backend {
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// Phrases that suggest reasoning, writing or multi-step work.
pub const REMOTE_PATTERNS: &[&str] = &[
    // reasoning
    r"\bwhy\b",
    r"\bexplain\b",
    r"\bcompare\b",
    r"\banalyz[es]?\b",
    r"\bdifference between\b",
    r"\bpros and cons\b",
    // writing
    r"\bwrite\b",
    r"\bcreate\b",
    r"\bcompose\b",
    r"\bdraft\b",
    r"\bsummariz[es]?\b",
    // planning
    r"\bhow would\b",
    r"\bwhat if\b",
    r"\bhelp me\b",
    r"\bstep by step\b",
    r"\bwalk me through\b",
    // code
    r"\bdebug\b",
    r"\brefactor\b",
    r"\bimplement\b",
    r"\barchitect\b",
];

/// Phrases that suggest a quick fact, command or small talk.
pub const LOCAL_PATTERNS: &[&str] = &[
    r"\bwhat time\b",
    r"\bwhat day\b",
    r"\bwhat date\b",
    r"\bwhat is\b",
    r"\bwho is\b",
    r"\bwhere is\b",
    r"\bdefine\b",
    r"\btimer\b",
    r"\bremind\b",
    r"\balarm\b",
    r"\bplay\b",
    r"\bstop\b",
    r"\bpause\b",
    r"\bvolume\b",
    r"\b(hello|hi|hey|thanks|thank you|good morning|good night)\b",
    // whole-utterance acknowledgements
    r"^(yes|no|yeah|nah|sure|okay|ok)[\s.!?]*$",
];

static REMOTE_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile(REMOTE_PATTERNS));
static LOCAL_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile(LOCAL_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("skipping routing pattern {p:?}: {e}");
                None
            }
        })
        .collect()
}

const SHORT_QUERY_WORDS: usize = 5;
const LONG_QUERY_WORDS: usize = 25;

fn signals(rules: &[Regex], text: &str) -> Vec<String> {
    rules
        .iter()
        .filter_map(|re| re.find(text))
        .map(|m| m.as_str().trim().to_lowercase())
        .collect()
}

/// Remote phrases found in `text`, lowercased, in pattern order.
pub fn remote_signals(text: &str) -> Vec<String> {
    signals(&REMOTE_RE, text)
}

/// Local phrases found in `text`, lowercased, in pattern order.
pub fn local_signals(text: &str) -> Vec<String> {
    signals(&LOCAL_RE, text.trim())
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Pick a backend for `text`.
pub fn classify(text: &str) -> Backend {
    let text = text.trim();
    if text.is_empty() {
        return Backend::Local;
    }

    let count = word_count(text);
    let remote = REMOTE_RE.iter().any(|re| re.is_match(text));

    if count <= SHORT_QUERY_WORDS {
        return if remote { Backend::Remote } else { Backend::Local };
    }
    if LOCAL_RE.iter().any(|re| re.is_match(text)) {
        return Backend::Local;
    }
    if remote || count >= LONG_QUERY_WORDS {
        return Backend::Remote;
    }
    Backend::Local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_questions_stay_local() {
        assert_eq!(classify("what time is it"), Backend::Local);
        assert_eq!(classify("Set a timer for ten minutes please"), Backend::Local);
        assert_eq!(classify("Okay."), Backend::Local);
        assert_eq!(classify(""), Backend::Local);
    }

    #[test]
    fn short_query_with_remote_pattern_goes_remote() {
        assert_eq!(classify("Why is the sky blue?"), Backend::Remote);
        assert_eq!(classify("explain recursion"), Backend::Remote);
    }

    #[test]
    fn local_pattern_wins_over_remote_in_longer_queries() {
        assert_eq!(
            classify("Hey can you explain what the weather will be like"),
            Backend::Local
        );
    }

    #[test]
    fn remote_pattern_in_longer_query() {
        assert_eq!(
            classify("Could you write a short poem about autumn leaves falling"),
            Backend::Remote
        );
    }

    #[test]
    fn long_query_without_signals_goes_remote() {
        let text = "tell me a long story about a dragon and a knight who become \
                    friends after a long journey across the sea and mountains together forever";
        assert!(word_count(text) >= 25);
        assert!(remote_signals(text).is_empty());
        assert!(local_signals(text).is_empty());
        assert_eq!(classify(text), Backend::Remote);
    }

    #[test]
    fn medium_query_without_signals_stays_local() {
        assert_eq!(classify("tell me a fun fact about octopuses today"), Backend::Local);
    }

    #[test]
    fn patterns_match_whole_words_only() {
        assert!(remote_signals("somewhat whywhy").is_empty());
        assert!(local_signals("this is chill").is_empty());
        assert_eq!(local_signals("What's the volume"), vec!["volume"]);
    }

    #[test]
    fn phrases_need_adjacent_words() {
        assert!(local_signals("so what, time flies").is_empty());
        assert_eq!(local_signals("Tell me what time it is"), vec!["what time"]);
    }

    #[test]
    fn stem_patterns_accept_their_variants() {
        assert_eq!(remote_signals("analyze this"), vec!["analyze"]);
        assert_eq!(remote_signals("Analyz the logs"), vec!["analyz"]);
        assert_eq!(remote_signals("please summarize"), vec!["summarize"]);
        assert!(remote_signals("analysis only").is_empty());
    }

    #[test]
    fn affirmation_must_be_the_whole_utterance() {
        assert_eq!(local_signals("Yeah!"), vec!["yeah!"]);
        assert_eq!(classify("  OK.  "), Backend::Local);
        assert!(local_signals("yes please do it").is_empty());
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(REMOTE_RE.len(), REMOTE_PATTERNS.len());
        assert_eq!(LOCAL_RE.len(), LOCAL_PATTERNS.len());
    }
}
