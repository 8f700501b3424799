//! Prompt assembly: the one place that decides what the model gets to see.
//!
//! Layout of the user turn, in order:
//! 1. `Relevant memories:` block (only when memories were retrieved)
//! 2. `Web findings:` block (only when web augmentation was triggered and
//!    search returned something)
//! 3. a note asking the model to use and cite the findings (only with 2)
//! 4. the user text between turn markers, ending on the assistant marker
//!
//! Everything here is pure: same inputs, same prompt.

use std::fmt::Write as _;

use crate::types::{ChatRequest, MemoryItem, SearchResult, truncate_chars};

/// Reply budget never drops below this many tokens.
pub const MIN_REPLY_TOKENS: u32 = 20;

const WEB_INSTRUCTIONS: &str = "\nNote: The assistant has access to the Web findings above. \
Use those sources to produce a thorough, self-contained answer that cites or references the sources when useful. \
If sources disagree, summarize the differences and indicate uncertainty. \
Prefer to give a complete, clear explanation rather than a short or partial reply.\n\n";

/// Persona used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Astral, an assistant specialized in addiction support and emotional guidance.

Primary role:
1) Addiction support and recovery guidance (substances, porn, gaming, social media and similar habits)
2) Emotional support and mental well-being

Secondary role:
3) Practical problem-solving for everyday life: math, coding, tech, school, work and relationships

Always combine compassion with clear, correct solutions.

## Personality and tone
- Be warm, calm, empathetic and respectful.
- Never judge, shame, pressure or belittle the user.
- Speak like a trusted guide or mentor. Be honest but gentle.
- Encourage hope, growth and self-awareness.
- Do not sound robotic, clinical or scripted, and do not rush the user.
- Silently infer the user's emotional state (calm, stressed, sad, anxious, angry, \
confused, overwhelmed) and adapt tone, sentence length and detail to it. \
Acknowledge emotion briefly and naturally; never dramatize it.

## Formatting
Keep replies clear, calm and mobile-friendly:
- Never reply as one long paragraph. Use short paragraphs with blank lines between ideas.
- Use bullet points for lists and numbered steps for instructions.
- Use headings when helpful, and tables only when comparing things.
- Break complex answers into sections.

## Addiction support
- Never give instructions on using, hiding or obtaining addictive substances.
- Focus on recovery, harm reduction, self-control, motivation and long-term healing.
- Help identify triggers and patterns, and suggest healthier alternatives.
- Encourage professional or real-world support when appropriate, without pressure.
- Celebrate progress, even small wins.
- If relapse comes up, respond with compassion and without disappointment or shame.

## Emotional support
- Listen actively and validate feelings without judgment.
- Help the user understand what they are feeling.
- Offer grounding techniques, coping strategies and small positive steps.
- When emotions are intense, slow down and focus on calm, breathing and grounding.

## Problem-solving
- Be accurate and logical. Explain step by step when it helps.
- Simplify if the user seems confused, and keep a supportive tone.
- Ask at most one clarifying question, and only when truly necessary.

## Boundaries and safety
- Do not encourage self-harm, suicide, illegal acts or dangerous behavior.
- Do not claim to replace doctors, therapists or other professionals.
- If the user expresses extreme distress, prioritize their safety, encourage grounding \
and suggest reaching out to trusted real-world support.

## Default response flow
When appropriate:
1) Acknowledge the user's feelings or situation.
2) Address the problem or question clearly.
3) Give practical advice or steps.
4) Close with encouragement or a calming line.

After every reply the user should feel heard, supported, calmer, more capable and more hopeful.";

/// Size limits applied while assembling.
#[derive(Debug, Clone)]
pub struct ContextLimits {
    /// Total tokens the model accepts (prompt + reply).
    pub max_context_tokens: u32,
    /// Reply budget when web findings are included.
    pub web_reply_tokens: u32,
    /// Reply budget otherwise.
    pub default_reply_tokens: u32,
    /// Per-result excerpt cap inside the web findings block.
    pub max_excerpt_chars: usize,
    /// Cap on the user text itself.
    pub max_user_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            web_reply_tokens: 512,
            default_reply_tokens: 200,
            max_excerpt_chars: 800,
            max_user_chars: 8000,
        }
    }
}

/// A prompt ready to hand to a completion client.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub system_instructions: String,
    pub user_content: String,
    pub reply_token_budget: u32,
    pub stop_sequences: Vec<String>,
    /// Whether a web findings block made it into the prompt.
    pub web_augmented: bool,
    pub memory_count: usize,
    pub web_count: usize,
    pub estimated_prompt_tokens: u32,
}

/// Builds bounded prompts from a request and its retrieved context.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_instructions: String,
    assistant_name: String,
    limits: ContextLimits,
}

impl ContextAssembler {
    pub fn new(system_instructions: impl Into<String>, limits: ContextLimits) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            assistant_name: "Astral".to_string(),
            limits,
        }
    }

    /// Name used in the assistant turn marker.
    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }

    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    pub fn system_instructions(&self) -> &str {
        &self.system_instructions
    }

    /// Turn markers the model should stop at.
    pub fn stop_sequences(&self) -> Vec<String> {
        vec!["User:".to_string(), format!("{}:", self.assistant_name)]
    }

    /// Assemble the prompt for one request.
    ///
    /// `results` are ignored unless `web_triggered` is set, so results fetched
    /// speculatively never leak into the prompt. If the estimate exceeds the
    /// context window, the least relevant memories go first (the tail of
    /// `memories`), then trailing web results.
    pub fn assemble(
        &self,
        request: &ChatRequest,
        memories: &[MemoryItem],
        results: &[SearchResult],
        web_triggered: bool,
    ) -> AssembledPrompt {
        let user_text = truncate_chars(&request.text, self.limits.max_user_chars);
        let results = if web_triggered { results } else { &[] };
        let system_tokens = estimate_tokens(&self.system_instructions);

        let mut memory_count = memories.len();
        let mut web_count = results.len();

        let (user_content, prompt_tokens) = loop {
            let content =
                self.render(&memories[..memory_count], &results[..web_count], user_text);
            let tokens = system_tokens.saturating_add(estimate_tokens(&content));

            let fits = tokens.saturating_add(MIN_REPLY_TOKENS) <= self.limits.max_context_tokens;
            if fits || (memory_count == 0 && web_count == 0) {
                break (content, tokens);
            }
            if memory_count > 0 {
                memory_count -= 1;
            } else {
                web_count -= 1;
            }
        };

        let web_augmented = web_count > 0;
        let requested = if web_augmented {
            self.limits.web_reply_tokens
        } else {
            self.limits.default_reply_tokens
        };
        let available = self.limits.max_context_tokens.saturating_sub(prompt_tokens);
        let reply_token_budget = requested.min(available).max(MIN_REPLY_TOKENS);

        AssembledPrompt {
            system_instructions: self.system_instructions.clone(),
            user_content,
            reply_token_budget,
            stop_sequences: self.stop_sequences(),
            web_augmented,
            memory_count,
            web_count,
            estimated_prompt_tokens: prompt_tokens,
        }
    }

    fn render(&self, memories: &[MemoryItem], results: &[SearchResult], user_text: &str) -> String {
        let mut out = String::new();

        if !memories.is_empty() {
            out.push_str("Relevant memories:\n");
            let lines: Vec<String> = memories
                .iter()
                .map(|m| format!("- ({}) {}", m.role, m.text))
                .collect();
            out.push_str(&lines.join("\n"));
            out.push_str("\n\n");
        }

        if !results.is_empty() {
            let mut parts = vec!["Web findings:".to_string()];
            for r in results {
                let mut part = String::new();
                let _ = write!(
                    part,
                    "- Source: {}\n  Excerpt: {}",
                    r.url,
                    truncate_chars(&r.excerpt, self.limits.max_excerpt_chars)
                );
                parts.push(part);
            }
            out.push('\n');
            out.push_str(&parts.join("\n\n"));
            out.push_str("\n\n");
            out.push_str(WEB_INSTRUCTIONS);
        }

        let _ = write!(out, "User:\n{user_text}\n\n{}:", self.assistant_name);
        out
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, ContextLimits::default())
    }
}

/// Rough token estimate: ~4 bytes per token, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    text.len().div_ceil(4).min(u32::MAX as usize) as u32
}
