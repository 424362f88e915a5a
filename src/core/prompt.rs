//! Cleanup prompt sections and the prompt composer

use serde::{Deserialize, Serialize};

pub const MAIN_PROMPT_DEFAULT: &str = "You are a dictation cleanup assistant. \
Rewrite the user's raw speech transcript into clean written text.

Rules:
- Preserve the speaker's meaning and wording; do not add new content.
- Fix punctuation, capitalization and obvious transcription errors.
- Remove filler words (um, uh, you know) and false starts.
- Insert new lines or paragraphs when the speaker says \"new line\" or \"new paragraph\".
- Output only the cleaned text, with no commentary or quotation marks.";

pub const ADVANCED_PROMPT_DEFAULT: &str = "Advanced formatting:
- Backtrack corrections: when the speaker corrects themself (\"scratch that\", \"I mean\", \
\"actually\"), keep only the corrected version.
- Lists: when the speaker enumerates items (\"first\", \"second\", \"number one\"), format \
them as a numbered or bulleted list.";

pub const DICTIONARY_PROMPT_DEFAULT: &str = "Personal dictionary:
Apply these spellings whenever the matching word or phrase is heard.
Format each entry as: spoken form -> written form";

/// One prompt section as edited by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    pub enabled: bool,
    /// Custom content; `None` or blank means "use the default"
    #[serde(default)]
    pub content: Option<String>,
}

/// The three cleanup prompt sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSections {
    pub main: PromptSection,
    pub advanced: PromptSection,
    pub dictionary: PromptSection,
}

/// Built-in default text for each section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultPromptSections {
    pub main: &'static str,
    pub advanced: &'static str,
    pub dictionary: &'static str,
}

impl DefaultPromptSections {
    pub const fn get() -> Self {
        Self {
            main: MAIN_PROMPT_DEFAULT,
            advanced: ADVANCED_PROMPT_DEFAULT,
            dictionary: DICTIONARY_PROMPT_DEFAULT,
        }
    }
}

fn section_text<'a>(section: &'a PromptSection, default: &'a str) -> Option<&'a str> {
    if !section.enabled {
        return None;
    }
    match section.content.as_deref().map(str::trim) {
        Some(custom) if !custom.is_empty() => Some(custom),
        _ => Some(default),
    }
}

/// Combine the sections into one prompt.
///
/// Enabled sections contribute their custom content, or the default when the
/// content is absent or blank. Contributions are joined by a blank line.
/// Returns `None` when no section contributes.
pub fn combine_prompt_sections(sections: &PromptSections) -> Option<String> {
    let parts: Vec<&str> = [
        section_text(&sections.main, MAIN_PROMPT_DEFAULT),
        section_text(&sections.advanced, ADVANCED_PROMPT_DEFAULT),
        section_text(&sections.dictionary, DICTIONARY_PROMPT_DEFAULT),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Prompt used when no custom prompt has been set
pub fn default_prompt() -> String {
    [MAIN_PROMPT_DEFAULT, ADVANCED_PROMPT_DEFAULT].join("\n\n")
}
