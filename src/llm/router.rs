//! Per-request backend selection with fallback.

use std::sync::Arc;

use crate::config::RouterMode;
use crate::llm::classify::{classify, local_signals, remote_signals, word_count, Backend};
use crate::llm::generator::{GenerationError, ResponseGenerator, TokenStream};

/// A started reply and the backend that produced it.
pub struct Routed {
    pub backend: Backend,
    pub tokens: TokenStream,
}

impl std::fmt::Debug for Routed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routed")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// Routing decision plus the evidence behind it, for debug logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteExplanation {
    pub decision: Backend,
    pub mode: RouterMode,
    pub word_count: usize,
    pub remote_signals: Vec<String>,
    pub local_signals: Vec<String>,
}

pub struct QueryRouter {
    mode: RouterMode,
    local: Option<Arc<dyn ResponseGenerator>>,
    remote: Option<Arc<dyn ResponseGenerator>>,
}

impl QueryRouter {
    pub fn new(
        mode: RouterMode,
        local: Option<Arc<dyn ResponseGenerator>>,
        remote: Option<Arc<dyn ResponseGenerator>>,
    ) -> Self {
        Self {
            mode,
            local,
            remote,
        }
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    /// Backend the mode (and, in hybrid mode, the classifier) asks for.
    pub fn decide(&self, prompt: &str) -> Backend {
        match self.mode {
            RouterMode::Local => Backend::Local,
            RouterMode::Remote => Backend::Remote,
            RouterMode::Hybrid => classify(prompt),
        }
    }

    pub fn explain(&self, prompt: &str) -> RouteExplanation {
        RouteExplanation {
            decision: self.decide(prompt),
            mode: self.mode,
            word_count: word_count(prompt),
            remote_signals: remote_signals(prompt),
            local_signals: local_signals(prompt),
        }
    }

    fn generator(&self, backend: Backend) -> Option<&Arc<dyn ResponseGenerator>> {
        match backend {
            Backend::Local => self.local.as_ref(),
            Backend::Remote => self.remote.as_ref(),
        }
        .filter(|g| g.is_available())
    }

    /// Start a reply on the chosen backend, or on the other one when the
    /// chosen backend is not available.
    pub fn route(&self, prompt: &str) -> Result<Routed, GenerationError> {
        let wanted = self.decide(prompt);

        let (backend, generator) = match self.generator(wanted) {
            Some(g) => (wanted, g),
            None => {
                let other = wanted.other();
                let g = self.generator(other).ok_or(GenerationError::NoBackend)?;
                log::info!("{wanted} backend unavailable; falling back to {other}");
                (other, g)
            }
        };

        log::debug!("routing to {backend} ({})", generator.name());
        let tokens = generator.stream(prompt)?;
        Ok(Routed { backend, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::generator::ScriptedGenerator;

    fn router(mode: RouterMode, remote_available: bool) -> (QueryRouter, Arc<ScriptedGenerator>, Arc<ScriptedGenerator>) {
        let local = Arc::new(ScriptedGenerator::new("local", &["L"]));
        let mut remote = ScriptedGenerator::new("remote", &["R"]);
        if !remote_available {
            remote = remote.unavailable();
        }
        let remote = Arc::new(remote);
        let r = QueryRouter::new(
            mode,
            Some(local.clone() as Arc<dyn ResponseGenerator>),
            Some(remote.clone() as Arc<dyn ResponseGenerator>),
        );
        (r, local, remote)
    }

    fn first_token(routed: Routed) -> String {
        routed.tokens.map(Result::unwrap).collect()
    }

    #[test]
    fn hybrid_routes_by_classification() {
        let (r, local, remote) = router(RouterMode::Hybrid, true);

        let routed = r.route("what time is it").unwrap();
        assert_eq!(routed.backend, Backend::Local);
        assert_eq!(first_token(routed), "L");

        let routed = r.route("why is the sky blue").unwrap();
        assert_eq!(routed.backend, Backend::Remote);
        assert_eq!(first_token(routed), "R");

        assert_eq!(local.prompts(), vec!["what time is it".to_string()]);
        assert_eq!(remote.prompts(), vec!["why is the sky blue".to_string()]);
    }

    #[test]
    fn unavailable_remote_falls_back_to_local() {
        let (r, local, remote) = router(RouterMode::Remote, false);
        let routed = r.route("explain quantum tunnelling").unwrap();
        assert_eq!(routed.backend, Backend::Local);
        assert_eq!(local.prompts().len(), 1);
        assert!(remote.prompts().is_empty());
    }

    #[test]
    fn missing_local_falls_back_to_remote() {
        let remote: Arc<dyn ResponseGenerator> = Arc::new(ScriptedGenerator::new("remote", &["R"]));
        let r = QueryRouter::new(RouterMode::Local, None, Some(remote));
        assert_eq!(r.route("hi").unwrap().backend, Backend::Remote);
    }

    #[test]
    fn no_backend_at_all_is_an_error() {
        let remote: Arc<dyn ResponseGenerator> =
            Arc::new(ScriptedGenerator::new("remote", &[]).unavailable());
        let r = QueryRouter::new(RouterMode::Hybrid, None, Some(remote));
        assert!(matches!(r.route("hi"), Err(GenerationError::NoBackend)));
    }

    #[test]
    fn fixed_modes_ignore_the_classifier() {
        let (r, _, _) = router(RouterMode::Local, true);
        assert_eq!(r.decide("why would you explain that"), Backend::Local);
        let (r, _, _) = router(RouterMode::Remote, true);
        assert_eq!(r.decide("what time is it"), Backend::Remote);
    }

    #[test]
    fn explain_lists_signals() {
        let (r, _, _) = router(RouterMode::Hybrid, true);
        let e = r.explain("hey, help me write a toast");
        assert_eq!(e.word_count, 6);
        assert_eq!(e.decision, Backend::Local);
        assert_eq!(e.local_signals, vec!["hey"]);
        assert_eq!(e.remote_signals, vec!["write", "help me"]);
    }
}
