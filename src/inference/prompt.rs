//! Synthetic prompt sized to fill a requested context window.
//!
//! Token counts are estimates: the base instruction costs ~16 tokens and the
//! filler sentence ~11 tokens on common tokenizers.

use serde::Serialize;

const BASE_PROMPT: &str = "Count the number of characters in the following text and explain your counting process. Here's the text:\n\n";
const BASE_PROMPT_TOKENS: u32 = 16;

const TEST_SENTENCE: &str = "This is a test sentence to measure context performance. ";
const TEST_SENTENCE_TOKENS: u32 = 11;

/// A generated prompt and its estimated size.
#[derive(Debug, Clone, Serialize)]
pub struct PromptPlan {
    #[serde(skip)]
    pub text: String,
    pub estimated_tokens: u32,
    pub repetitions: u32,
}

/// Build a prompt whose estimated length approximately fills `context_size`.
///
/// Always includes at least one filler sentence, even when the base prompt
/// alone exceeds the window.
pub fn build_prompt(context_size: u32) -> PromptPlan {
    let available = context_size.saturating_sub(BASE_PROMPT_TOKENS);
    let repetitions = (available / TEST_SENTENCE_TOKENS).max(1);

    let mut text =
        String::with_capacity(BASE_PROMPT.len() + TEST_SENTENCE.len() * repetitions as usize);
    text.push_str(BASE_PROMPT);
    for _ in 0..repetitions {
        text.push_str(TEST_SENTENCE);
    }

    PromptPlan {
        text,
        estimated_tokens: BASE_PROMPT_TOKENS + repetitions * TEST_SENTENCE_TOKENS,
        repetitions,
    }
}
