//! A deterministic stand-in for a real inference engine. Tokenizes on
//! whitespace and echoes the user's own words back, word-reversed, with a
//! uniform attention tensor — just enough to drive the Session Controller
//! end-to-end over stdio without a model dependency.

use async_trait::async_trait;
use futures::stream;
use luminal_core::{AttentionStep, GenerationRequest, GenerationStream, GeneratedToken, Generator, GeneratorError, TokenSpec};

pub struct EchoGenerator {
    context_limit: usize,
}

impl EchoGenerator {
    pub fn new(context_limit: usize) -> Self {
        Self { context_limit }
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpec>, GeneratorError> {
        Ok(text
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| TokenSpec { token_id: i as u32, text: format!("{} ", word) })
            .collect())
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream, GeneratorError> {
        let mut reply_words: Vec<String> = request
            .context_tokens
            .iter()
            .rev()
            .take(12)
            .map(|t| t.text.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        reply_words.reverse();
        if reply_words.is_empty() {
            reply_words.push("(nothing to echo)".to_string());
        }

        let items: Vec<Result<GeneratedToken, GeneratorError>> = reply_words
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                Ok(GeneratedToken {
                    token_id: i as u32,
                    text: format!("{} ", word),
                    attention: AttentionStep::new(vec![vec![vec![1.0; request.context_tokens.len().max(1)]]]),
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }

    fn get_context_limit(&self) -> usize {
        self.context_limit
    }
}
