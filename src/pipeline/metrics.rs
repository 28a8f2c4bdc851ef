//! Per-interaction timing record.

use std::fmt;
use std::time::Duration;

use crate::llm::Backend;

/// Longest response excerpt printed in the report.
const RESPONSE_PREVIEW_CHARS: usize = 120;

/// Timings and text for one wake-to-silence interaction.
///
/// Created when `Processing` begins, filled in as stages finish, logged when
/// playback ends, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMetrics {
    /// Audio in → transcript out.
    pub transcription: Duration,
    /// Generation start → first fragment.
    pub first_token: Duration,
    /// Generation start → last fragment.
    pub generation_total: Duration,
    /// First fragment → first synthesized buffer.
    pub first_audio: Duration,
    /// Sum of all synthesis calls.
    pub synthesis_total: Duration,
    /// Sum of all playback.
    pub playback: Duration,
    /// `Processing` entered → playback drained.
    pub end_to_end: Duration,
    pub token_count: usize,
    pub transcript: String,
    pub response: String,
    pub backend: Option<Backend>,
}

impl InteractionMetrics {
    pub fn new(transcript: impl Into<String>, transcription: Duration) -> Self {
        Self {
            transcription,
            first_token: Duration::ZERO,
            generation_total: Duration::ZERO,
            first_audio: Duration::ZERO,
            synthesis_total: Duration::ZERO,
            playback: Duration::ZERO,
            end_to_end: Duration::ZERO,
            token_count: 0,
            transcript: transcript.into(),
            response: String::new(),
            backend: None,
        }
    }

    /// Time from the first fragment to the first audio buffer, given both
    /// measured from generation start.  Falls back to the raw first-audio
    /// time when audio somehow came first.
    pub fn first_audio_after_token(first_token: Duration, first_audio: Duration) -> Duration {
        if first_audio > first_token {
            first_audio - first_token
        } else {
            first_audio
        }
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl fmt::Display for InteractionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = self.backend.map_or("-".to_string(), |b| b.to_string());
        let preview: String = self.response.chars().take(RESPONSE_PREVIEW_CHARS).collect();
        let ellipsis = if self.response.chars().count() > RESPONSE_PREVIEW_CHARS {
            "..."
        } else {
            ""
        };

        writeln!(f, "--- interaction ---")?;
        writeln!(f, "  backend:        {backend}")?;
        writeln!(f, "  transcription:  {:>6.0} ms", ms(self.transcription))?;
        writeln!(f, "  first token:    {:>6.0} ms", ms(self.first_token))?;
        writeln!(
            f,
            "  generation:     {:>6.0} ms  ({} tokens)",
            ms(self.generation_total),
            self.token_count
        )?;
        writeln!(f, "  first audio:    {:>6.0} ms", ms(self.first_audio))?;
        writeln!(f, "  synthesis:      {:>6.0} ms", ms(self.synthesis_total))?;
        writeln!(f, "  playback:       {:>6.0} ms", ms(self.playback))?;
        writeln!(f, "  end to end:     {:>6.0} ms", ms(self.end_to_end))?;
        writeln!(f, "  user:      \"{}\"", self.transcript)?;
        write!(f, "  assistant: \"{preview}{ellipsis}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_audio_is_relative_to_first_token() {
        let d = InteractionMetrics::first_audio_after_token(
            Duration::from_millis(200),
            Duration::from_millis(450),
        );
        assert_eq!(d, Duration::from_millis(250));

        let d = InteractionMetrics::first_audio_after_token(
            Duration::from_millis(300),
            Duration::from_millis(100),
        );
        assert_eq!(d, Duration::from_millis(100));
    }

    #[test]
    fn report_contains_text_and_truncates_long_responses() {
        let mut m = InteractionMetrics::new("what time is it", Duration::from_millis(120));
        m.backend = Some(Backend::Local);
        m.token_count = 4;
        m.response = "x".repeat(200);

        let report = m.to_string();
        assert!(report.contains("backend:        local"));
        assert!(report.contains("(4 tokens)"));
        assert!(report.contains("\"what time is it\""));
        assert!(report.contains(&format!("{}...", "x".repeat(120))));
        assert!(!report.contains(&"x".repeat(121)));
    }
}
