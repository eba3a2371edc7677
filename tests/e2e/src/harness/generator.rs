//! A scripted `Generator` test double: each call to `generate_stream` pops
//! one pre-loaded reply off a queue (repeating the last one once the queue
//! is empty), so scenario tests can pin exactly how many tokens come back
//! and with what attention, instead of depending on real model output.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use luminal_core::{AttentionStep, GenerationRequest, GenerationStream, GeneratedToken, Generator, GeneratorError, TokenSpec};

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Vec<String>>>,
    last_reply: Mutex<Vec<String>>,
    context_limit: usize,
    attention_value: f32,
}

impl ScriptedGenerator {
    pub fn new(context_limit: usize) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            last_reply: Mutex::new(vec!["ok".to_string(), ".".to_string()]),
            context_limit,
            attention_value: 0.05,
        }
    }

    pub fn with_attention_value(mut self, value: f32) -> Self {
        self.attention_value = value;
        self
    }

    /// Queue a reply (given as whitespace-split words) to be returned by
    /// the next `generate_stream` call.
    pub fn with_script(self, words: &[&str]) -> Self {
        self.replies.lock().unwrap().push_back(words.iter().map(|w| w.to_string()).collect());
        self
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenSpec>, GeneratorError> {
        Ok(text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| TokenSpec { token_id: i as u32, text: format!("{} ", w) })
            .collect())
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream, GeneratorError> {
        let words = {
            let mut queue = self.replies.lock().unwrap();
            match queue.pop_front() {
                Some(reply) => {
                    *self.last_reply.lock().unwrap() = reply.clone();
                    reply
                }
                None => self.last_reply.lock().unwrap().clone(),
            }
        };

        let context_len = request.context_tokens.len().max(1);
        let attention_value = self.attention_value;
        let items: Vec<Result<GeneratedToken, GeneratorError>> = words
            .into_iter()
            .enumerate()
            .map(move |(i, word)| {
                Ok(GeneratedToken {
                    token_id: i as u32,
                    text: format!("{} ", word),
                    attention: AttentionStep::new(vec![vec![vec![attention_value; context_len]]]),
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }

    fn get_context_limit(&self) -> usize {
        self.context_limit
    }
}
