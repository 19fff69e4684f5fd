//! Reply generation through the language model.

use std::sync::Arc;

use earshot_provider::{LlmProvider, LlmRequest};
use earshot_schema::{AgentReply, KnowledgeEntry, WorkflowTrigger, DEFAULT_CONFIDENCE_THRESHOLD};
use serde::Deserialize;

use crate::ListenError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum ReplyParseError {
    #[error("no JSON object found in model response")]
    NoJson,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    content: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    requires_approval: bool,
}

pub struct ResponseGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    knowledge_hits: usize,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
            knowledge_hits: 3,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_knowledge_hits(mut self, hits: usize) -> Self {
        self.knowledge_hits = hits;
        self
    }

    /// Asks the model for a reply. Unparseable output degrades to a
    /// low-confidence candidate instead of an error; only a failed model call
    /// is reported.
    pub async fn generate(
        &self,
        trigger: &WorkflowTrigger,
        system_prompt: &str,
        knowledge: &[KnowledgeEntry],
    ) -> Result<AgentReply, ListenError> {
        let prompt = self.user_prompt(trigger, knowledge);
        let request = LlmRequest::simple(
            self.model.clone(),
            Some(system_prompt.to_string()),
            prompt,
        )
        .with_max_tokens(self.max_tokens);

        let response = self
            .provider
            .chat(request)
            .await
            .map_err(|e| ListenError::Generation(format!("{e:#}")))?;

        let limit = trigger.post.platform.reply_char_limit();
        let reply = parse_reply(&response.text, limit);
        tracing::debug!(
            trigger_id = %trigger.id,
            confidence = reply.confidence,
            requires_approval = reply.requires_approval,
            "reply generated"
        );
        Ok(reply)
    }

    fn user_prompt(&self, trigger: &WorkflowTrigger, knowledge: &[KnowledgeEntry]) -> String {
        let post = &trigger.post;
        let ctx = &trigger.context;
        let mut prompt = format!(
            "A social media user posted the following:\n\n\
             Author: @{handle}\n\
             Platform: {platform}\n\
             Content: \"{text}\"\n\n\
             Context:\n\
             - Matched keywords: {keywords}\n\
             - Relevance score: {relevance}/100\n\
             - Sentiment: {sentiment}\n\
             - Engagement on post: {likes} likes, {shares} shares",
            handle = post.author.handle,
            platform = post.platform,
            text = post.text,
            keywords = ctx.matched_keywords.join(", "),
            relevance = ctx.relevance_score,
            sentiment = ctx.sentiment,
            likes = post.metrics.likes,
            shares = post.metrics.shares,
        );

        let hits: Vec<&KnowledgeEntry> = knowledge.iter().take(self.knowledge_hits).collect();
        if !hits.is_empty() {
            prompt.push_str("\n\nRelevant Knowledge Base Entries:");
            for entry in hits {
                prompt.push_str(&format!("\nQ: {}\nA: {}", entry.question, entry.answer));
            }
        }

        prompt.push_str(&format!(
            "\n\nTask: Generate an appropriate {action} response based on your role.\n\n\
             Requirements:\n\
             1. Be concise (max {limit} characters for {platform})\n\
             2. Be authentic and conversational\n\
             3. Stay on-brand\n\
             4. Address the specific context\n\
             5. Include a call-to-action if appropriate\n\n\
             Respond in JSON format:\n\
             {{\n  \"content\": \"your response here\",\n  \"confidence\": 0-100,\n  \
             \"reasoning\": \"why this response is appropriate\",\n  \
             \"requiresApproval\": true/false\n}}",
            action = trigger.action,
            limit = post.platform.reply_char_limit(),
            platform = post.platform,
        ));
        prompt
    }
}

/// Turns raw model text into a reply. Confidence below the floor always
/// requires approval, whatever the model claimed.
pub fn parse_reply(raw: &str, char_limit: usize) -> AgentReply {
    match extract_reply(raw) {
        Ok(parsed) => {
            let confidence = parsed.confidence.round().clamp(0.0, 100.0) as u8;
            AgentReply {
                content: parsed.content,
                confidence,
                reasoning: parsed.reasoning,
                requires_approval: parsed.requires_approval
                    || confidence < DEFAULT_CONFIDENCE_THRESHOLD,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "falling back to raw model text");
            AgentReply {
                content: raw.trim().chars().take(char_limit).collect(),
                confidence: 50,
                reasoning: format!("Failed to parse structured response: {err}"),
                requires_approval: true,
            }
        }
    }
}

fn extract_reply(raw: &str) -> Result<RawReply, ReplyParseError> {
    json_objects(raw)
        .find_map(|candidate| serde_json::from_str::<RawReply>(candidate).ok())
        .ok_or(ReplyParseError::NoJson)
}

/// Balanced-brace spans of `text`, in order of their opening brace. Braces
/// inside JSON strings are skipped. Quotes only open strings inside a brace,
/// so stray quotes in surrounding prose are ignored.
fn json_objects(text: &str) -> impl Iterator<Item = &str> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(idx),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, idx + 1));
                }
            }
            _ => {}
        }
    }
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans.into_iter().map(move |(start, end)| &text[start..end])
}
