//! Scripted oracle for tests and offline runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{JudgmentOracle, PromptContext, PromptPurpose};
use crate::domain::{AutodeployError, Result};

/// What the stub answers for one prompt purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubReply {
    Text(String),
    Fail(String),
    /// Never answers within any sane timeout.
    Hang,
}

/// Deterministic [`JudgmentOracle`] returning scripted replies per purpose.
/// Purposes without a scripted reply fail.
#[derive(Debug, Default)]
pub struct StubOracle {
    replies: HashMap<PromptPurpose, StubReply>,
    calls: Mutex<Vec<PromptContext>>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, purpose: PromptPurpose, reply: StubReply) -> Self {
        self.replies.insert(purpose, reply);
        self
    }

    /// Shorthand for a text reply.
    pub fn answering(self, purpose: PromptPurpose, text: &str) -> Self {
        self.reply(purpose, StubReply::Text(text.to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<PromptContext> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JudgmentOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    async fn judge(&self, prompt: &PromptContext) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.clone());
        match self.replies.get(&prompt.purpose) {
            Some(StubReply::Text(text)) => Ok(text.clone()),
            Some(StubReply::Fail(reason)) => Err(AutodeployError::Oracle(reason.clone())),
            Some(StubReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(AutodeployError::Oracle("stub hang elapsed".to_string()))
            }
            None => Err(AutodeployError::Oracle(format!(
                "no scripted reply for {:?}",
                prompt.purpose
            ))),
        }
    }
}
