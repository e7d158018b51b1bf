//! Prompt building for classification and answer generation.
//!
//! All prompts embed the recent conversation window so referring
//! expressions ("it", "this", "tell me more") resolve against prior turns.

use crate::memory::Turn;
use crate::retrieval::RetrievedPassage;

const NO_PRIOR_CONVERSATION: &str = "NO PRIOR CONVERSATION";

/// Render the memory window as a transcript block.
pub fn render_window(window: &[Turn]) -> String {
    if window.is_empty() {
        return NO_PRIOR_CONVERSATION.to_string();
    }
    let lines: Vec<String> = window
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.text))
        .collect();
    format!("PRIOR CONVERSATION:\n{}", lines.join("\n"))
}

/// Classifier prompt: one short call asking the model to label the
/// question as casual chat or a knowledge question.
pub fn build_classifier_prompt(question: &str, window: &[Turn]) -> String {
    format!(
        r#"Analyze the question below and categorize it.

{context}

NEW QUESTION: {question}

CATEGORIES:
- "casual" -> small talk, greetings, pleasantries, follow-up chatter (e.g. "how are you?", "hello", "and then?", "what does that mean?")
- "knowledge" -> questions requiring specific knowledge (e.g. "what is agent memory?", "how does prompt engineering work?")

IMPORTANT: If the question refers back to the prior conversation (e.g. "so how does it work?", "tell me more"), use the conversation above to decide.

Reply with the category name only (casual or knowledge):"#,
        context = render_window(window),
        question = question,
    )
}

/// Casual chat prompt: answer directly, no retrieval.
pub fn build_casual_prompt(question: &str, window: &[Turn]) -> String {
    format!(
        r#"You are a friendly, helpful assistant.

{context}

NEW MESSAGE: {question}

TASK: Reply naturally and warmly, taking the prior conversation into account. Keep it short.
If the message refers to an earlier topic, show that you remember it.

REPLY:"#,
        context = render_window(window),
        question = question,
    )
}

/// Grounded prompt: answer from the retrieved passages, the conversation,
/// and the model's own knowledge, in that order of preference.
pub fn build_grounded_prompt(
    question: &str,
    window: &[Turn],
    passages: &[RetrievedPassage],
) -> String {
    let sources: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    format!(
        r#"You are a teaching assistant. Answer the question using the source passages below, the prior conversation, and your own knowledge.

{context}

SOURCE PASSAGES:
{sources}

NEW QUESTION: {question}

RULES:
1. If the question refers to the prior conversation, take it into account
2. If the sources answer the question directly, explain it in your own words
3. If the sources are only partially relevant, complete the answer from your own knowledge
4. If the sources say nothing about it, answer from your own knowledge but say so
5. Speak naturally and fluently, give an example when it helps

ANSWER:"#,
        context = render_window(window),
        sources = sources.join("\n\n"),
        question = question,
    )
}

/// Hybrid fallback prompt: the router wanted documents but none were
/// relevant, so answer from model knowledge alone.
pub fn build_knowledge_fallback_prompt(question: &str, window: &[Turn]) -> String {
    format!(
        r#"You are a helpful assistant. Answer the question from your own knowledge.

{context}

NEW QUESTION: {question}

RULES:
1. Take the prior conversation into account
2. Speak naturally and fluently
3. Explain in detail if you know the topic, be honest if you do not
4. Say "I am not certain" on points you are unsure about

ANSWER:"#,
        context = render_window(window),
        question = question,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Turn;

    #[test]
    fn empty_window_renders_placeholder() {
        assert_eq!(render_window(&[]), NO_PRIOR_CONVERSATION);
    }

    #[test]
    fn window_renders_roles_in_order() {
        let window = vec![
            Turn::user("What is agent memory?"),
            Turn::assistant("It stores prior context."),
        ];
        let rendered = render_window(&window);
        assert!(rendered.starts_with("PRIOR CONVERSATION:"));
        assert!(rendered.contains("User: What is agent memory?"));
        assert!(rendered.contains("Assistant: It stores prior context."));
    }

    #[test]
    fn classifier_prompt_embeds_question_and_context() {
        let window = vec![Turn::user("Tell me about agent memory")];
        let prompt = build_classifier_prompt("How does it work?", &window);
        assert!(prompt.contains("How does it work?"));
        assert!(prompt.contains("agent memory"));
        assert!(prompt.contains("casual or knowledge"));
    }

    #[test]
    fn grounded_prompt_includes_passages() {
        let passages = vec![
            RetrievedPassage::new("Memory lets agents recall.", "doc-1", 0.9),
            RetrievedPassage::new("Buffers hold recent turns.", "doc-2", 0.7),
        ];
        let prompt = build_grounded_prompt("What is agent memory?", &[], &passages);
        assert!(prompt.contains("Memory lets agents recall."));
        assert!(prompt.contains("Buffers hold recent turns."));
    }
}
