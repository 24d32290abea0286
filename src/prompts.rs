//! Prompts sent to the vision model.
//!
//! Callers can override the default via [`crate::config::DescribeConfig::prompt`];
//! the constant here is used only when no override is provided.

/// Default prompt: transcribe and describe one slide or image.
///
/// Tuned for slide decks, where the downstream consumer wants the text of the
/// slide plus a description of its charts and figures, and nothing else.
pub const DEFAULT_PROMPT: &str = r#"You are an expert AI assistant tasked with converting PowerPoint slides into semantically rich text for downstream use.
Carefully observe the content of each slide and accurately transcribe all text present.
Provide detailed descriptions of any graphs, charts, figures, or other visual elements.
It is essential to ensure accuracy and completeness in your text-based representation of the slide.
Where possible, include interpretations of graphics, icons, and other non-text descriptors.
If there is no text, just describe the image.

Return only the text content of the slide, without any preamble, explanation, or unrelated information."#;
