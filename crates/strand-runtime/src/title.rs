//! Session title auto-generation.
//!
//! Fired once per session off the first prompt; failures only leave
//! the session untitled.

use std::sync::Arc;

use strand_llm::{Provider, SendOptions};
use tracing::debug;

const TITLE_SYSTEM_PROMPT: &str = "Generate a short title (at most six words) summarizing the \
     user's request. Respond with the title only, no quotes or punctuation around it.";
const MAX_TITLE_CHARS: usize = 80;

/// Ask the model for a short session title based on the first prompt.
/// Returns `None` on any failure.
pub async fn generate_title(provider: &Arc<dyn Provider>, first_prompt: &str) -> Option<String> {
    let message = strand_core::messages::Message::user(
        strand_core::ids::SessionId::new(),
        first_prompt,
    );
    let options = SendOptions {
        max_tokens: Some(64),
        ..SendOptions::default()
    };
    let response = provider
        .send(TITLE_SYSTEM_PROMPT, &[message], &[], &options)
        .await
        .ok()?;

    let title = clean_title(&response.content);
    if title.is_empty() {
        debug!("title generation produced empty output");
        return None;
    }
    Some(title)
}

fn clean_title(raw: &str) -> String {
    let mut title = raw
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"')
        .to_owned();
    if title.len() > MAX_TITLE_CHARS {
        let mut cut = MAX_TITLE_CHARS;
        while !title.is_char_boundary(cut) {
            cut -= 1;
        }
        title.truncate(cut);
    }
    title
}
