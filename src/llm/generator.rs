//! Response generator trait and the shared streaming plumbing.
//!
//! A [`ResponseGenerator`] turns a prompt into a lazy [`TokenStream`].  The
//! caller pulls fragments one at a time, so a slow consumer (the speech
//! synthesizer) simply reads the HTTP body more slowly.
//!
//! Both HTTP backends deliver one JSON document per line.  [`LineTokens`]
//! owns the reader and delegates each line to a backend-specific parser.

use std::io::BufRead;

use thiserror::Error;

// ---------------------------------------------------------------------------
// GenerationError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP transport or connection error.
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation request timed out")]
    Timeout,

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A line of the stream could not be parsed.
    #[error("malformed stream line: {0}")]
    Malformed(String),

    /// The backend reported an error inside the stream.
    #[error("backend error: {0}")]
    Backend(String),

    /// The body ended before the backend's end-of-stream marker.
    #[error("stream ended without an end-of-stream marker")]
    Truncated,

    #[error("failed to read stream: {0}")]
    Io(#[from] std::io::Error),

    /// Neither backend is configured.
    #[error("no response backend is available")]
    NoBackend,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseGenerator trait
// ---------------------------------------------------------------------------

/// Lazy, ordered sequence of text fragments.  `None` means the backend
/// signalled the end of its reply.
pub type TokenStream = Box<dyn Iterator<Item = Result<String, GenerationError>> + Send>;

pub trait ResponseGenerator: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Whether this backend is configured well enough to be tried.
    fn is_available(&self) -> bool {
        true
    }

    /// Start generating a reply to `prompt`.
    fn stream(&self, prompt: &str) -> Result<TokenStream, GenerationError>;
}

// Compile-time assertion: Box<dyn ResponseGenerator> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ResponseGenerator>) {}
};

// ---------------------------------------------------------------------------
// LineTokens
// ---------------------------------------------------------------------------

/// What one line of a streamed body means.
#[derive(Debug)]
pub enum LineEvent {
    Token(String),
    /// Token that is also the last one.
    FinalToken(String),
    Skip,
    Done,
    Error(GenerationError),
}

/// Iterator over a line-delimited streaming body.
pub struct LineTokens<R, F> {
    reader: R,
    parse: F,
    line: String,
    finished: bool,
}

impl<R, F> LineTokens<R, F>
where
    R: BufRead,
    F: FnMut(&str) -> LineEvent,
{
    pub fn new(reader: R, parse: F) -> Self {
        Self {
            reader,
            parse,
            line: String::new(),
            finished: false,
        }
    }
}

impl<R, F> Iterator for LineTokens<R, F>
where
    R: BufRead,
    F: FnMut(&str) -> LineEvent,
{
    type Item = Result<String, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    return Some(Err(GenerationError::Truncated));
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            match (self.parse)(line) {
                LineEvent::Token(t) => return Some(Ok(t)),
                LineEvent::FinalToken(t) => {
                    self.finished = true;
                    return Some(Ok(t));
                }
                LineEvent::Skip => continue,
                LineEvent::Done => self.finished = true,
                LineEvent::Error(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator  (test-only)
// ---------------------------------------------------------------------------

/// Test double yielding a fixed list of fragments, optionally failing after
/// a given number of them.
#[cfg(test)]
pub struct ScriptedGenerator {
    pub name: String,
    pub available: bool,
    pub fragments: Vec<String>,
    pub fail_after: Option<usize>,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedGenerator {
    pub fn new(name: &str, fragments: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ResponseGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn stream(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut items: Vec<Result<String, GenerationError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(GenerationError::Backend("scripted failure".into())));
        }
        Ok(Box::new(items.into_iter()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(line: &str) -> LineEvent {
        match line {
            "END" => LineEvent::Done,
            "BAD" => LineEvent::Error(GenerationError::Malformed(line.into())),
            "#" => LineEvent::Skip,
            l if l.starts_with('!') => LineEvent::FinalToken(l[1..].to_string()),
            l => LineEvent::Token(l.to_string()),
        }
    }

    fn collect(body: &str) -> Vec<Result<String, GenerationError>> {
        LineTokens::new(Cursor::new(body.to_string()), parse).collect()
    }

    #[test]
    fn yields_tokens_until_done() {
        let out = collect("a\n\n#\nb\nEND\nc\n");
        let tokens: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[test]
    fn final_token_ends_the_stream() {
        let out = collect("a\n!b\nc\n");
        let tokens: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[test]
    fn missing_end_marker_is_truncated() {
        let out = collect("a\nb\n");
        assert_eq!(out.len(), 3);
        assert!(matches!(out[2], Err(GenerationError::Truncated)));
    }

    #[test]
    fn error_line_stops_iteration() {
        let out = collect("a\nBAD\nb\nEND\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn scripted_generator_fails_after_n() {
        let g = ScriptedGenerator::new("local", &["x", "y", "z"]).failing_after(1);
        let out: Vec<_> = g.stream("hi").unwrap().collect();
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
        assert_eq!(g.prompts(), vec!["hi".to_string()]);
    }
}
