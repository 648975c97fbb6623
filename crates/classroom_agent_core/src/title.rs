//! crates/classroom_agent_core/src/title.rs
//!
//! Thread auto-titling as an ordered list of strategies. The chain asks each strategy in
//! turn and keeps the first title produced.

use crate::ports::{AgentPlatform, EndpointTier, TitleRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_TITLE_CHARS: usize = 80;

#[async_trait]
pub trait TitleStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn propose(&self, request: &TitleRequest, bearer: Option<&str>) -> Option<String>;
}

/// Asks one of the platform's summarization endpoints for a title.
pub struct PlatformTitle {
    platform: Arc<dyn AgentPlatform>,
    tier: EndpointTier,
}

impl PlatformTitle {
    pub fn new(platform: Arc<dyn AgentPlatform>, tier: EndpointTier) -> Self {
        Self { platform, tier }
    }
}

#[async_trait]
impl TitleStrategy for PlatformTitle {
    fn name(&self) -> &'static str {
        match self.tier {
            EndpointTier::Primary => "platform",
            EndpointTier::Test => "platform-test",
        }
    }

    async fn propose(&self, request: &TitleRequest, bearer: Option<&str>) -> Option<String> {
        match self.platform.generate_title(self.tier, bearer, request).await {
            Ok(reply) if reply.success => reply.title.and_then(|t| clean_title(&t)),
            Ok(_) => {
                debug!(strategy = self.name(), "Title endpoint reported failure.");
                None
            }
            Err(e) => {
                warn!(strategy = self.name(), error = %e, "Title endpoint call failed.");
                None
            }
        }
    }
}

/// Local heuristic: the first few words of the user's message.
pub struct FirstWordsTitle {
    words: usize,
}

impl FirstWordsTitle {
    pub fn new(words: usize) -> Self {
        Self { words }
    }
}

#[async_trait]
impl TitleStrategy for FirstWordsTitle {
    fn name(&self) -> &'static str {
        "first-words"
    }

    async fn propose(&self, request: &TitleRequest, _bearer: Option<&str>) -> Option<String> {
        let title = request
            .first_message
            .split_whitespace()
            .take(self.words)
            .collect::<Vec<_>>()
            .join(" ");
        clean_title(&title)
    }
}

pub struct TitleChain {
    strategies: Vec<Box<dyn TitleStrategy>>,
}

impl TitleChain {
    pub fn new(strategies: Vec<Box<dyn TitleStrategy>>) -> Self {
        Self { strategies }
    }

    /// Platform summarizer, then the test summarizer, then the first three words.
    pub fn standard(platform: Arc<dyn AgentPlatform>) -> Self {
        Self::new(vec![
            Box::new(PlatformTitle::new(platform.clone(), EndpointTier::Primary)),
            Box::new(PlatformTitle::new(platform, EndpointTier::Test)),
            Box::new(FirstWordsTitle::new(3)),
        ])
    }

    pub async fn generate(&self, request: &TitleRequest, bearer: Option<&str>) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(title) = strategy.propose(request, bearer).await {
                debug!(strategy = strategy.name(), title = %title, "Generated thread title.");
                return Some(title);
            }
        }
        None
    }
}

/// Trims whitespace and surrounding quotes; rejects empty titles.
fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl TitleStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn propose(&self, _request: &TitleRequest, _bearer: Option<&str>) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn request(message: &str) -> TitleRequest {
        TitleRequest {
            first_message: message.to_string(),
            first_response: "Done.".to_string(),
        }
    }

    #[tokio::test]
    async fn chain_stops_at_first_title() {
        let chain = TitleChain::new(vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some("Quiz Setup"))),
            Box::new(Fixed(Some("never reached"))),
        ]);
        let title = chain.generate(&request("anything"), None).await;
        assert_eq!(title.as_deref(), Some("Quiz Setup"));
    }

    #[tokio::test]
    async fn first_words_uses_three_words() {
        let title = FirstWordsTitle::new(3)
            .propose(&request("Create assignment 'Quiz 1' for CS101"), None)
            .await;
        assert_eq!(title.as_deref(), Some("Create assignment 'Quiz"));
    }

    #[tokio::test]
    async fn blank_message_yields_no_title() {
        let chain = TitleChain::new(vec![Box::new(FirstWordsTitle::new(3))]);
        assert_eq!(chain.generate(&request("   "), None).await, None);
    }

    #[test]
    fn quotes_are_stripped_from_titles() {
        assert_eq!(clean_title("  \"Grading Help\" ").as_deref(), Some("Grading Help"));
        assert_eq!(clean_title("\"\""), None);
    }
}
