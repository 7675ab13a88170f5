//! Chat messages sent to the completion engine.

use serde::{Deserialize, Serialize};

use crate::models::{AiMergePrefs, ConflictContext};

/// One chat-completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Instruction constraining the engine to raw file content.
pub fn system_prompt(prefs: &AiMergePrefs) -> String {
    let language_line = prefs
        .language_hint
        .map(|l| format!("Language: {}\n", l))
        .unwrap_or_default();
    let target = prefs
        .language_hint
        .map(|l| l.display_name())
        .unwrap_or("code/text");

    format!(
        "You are a merge tool. Given BASE/OURS/THEIRS, return the final merged file ONLY.\n\
         \n\
         {language_line}Rules:\n\
         - Output plain file content only (NO markdown fences, NO triple backticks, NO explanations).\n\
         - The output MUST be valid {target} for direct compilation/use.\n\
         - Preserve formatting, imports/usings, encoding, and EOL style.\n\
         - Prefer OURS for local decisions unless THEIRS clearly fixes a bug."
    )
}

/// The three labelled texts for one file.
pub fn user_prompt(context: &ConflictContext) -> String {
    format!(
        "File: {}\n\
         \n\
         ===== BASE =====\n\
         {}\n\
         \n\
         ===== OURS =====\n\
         {}\n\
         \n\
         ===== THEIRS =====\n\
         {}\n\
         \n\
         Respond with the final merged file content only.",
        context.file_path, context.base, context.ours, context.theirs
    )
}

/// Both messages, system first.
pub fn build_messages(context: &ConflictContext, prefs: &AiMergePrefs) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(prefs)),
        ChatMessage::user(user_prompt(context)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::language::Language;

    fn context() -> ConflictContext {
        ConflictContext {
            file_path: "src/App.cs".into(),
            base: "base-text".into(),
            ours: "ours-text".into(),
            theirs: "theirs-text".into(),
        }
    }

    #[test]
    fn test_system_prompt_names_language() {
        let prefs = AiMergePrefs::default().with_language(Language::CSharp);
        let prompt = system_prompt(&prefs);
        assert!(prompt.contains("Language: C#\n"));
        assert!(prompt.contains("MUST be valid C# for direct"));
        assert!(prompt.contains("NO markdown fences"));
        assert!(prompt.contains("Prefer OURS"));
    }

    #[test]
    fn test_system_prompt_without_hint() {
        let prompt = system_prompt(&AiMergePrefs::default());
        assert!(!prompt.contains("Language:"));
        assert!(prompt.contains("valid code/text"));
    }

    #[test]
    fn test_user_prompt_sections_in_order() {
        let prompt = user_prompt(&context());
        assert!(prompt.starts_with("File: src/App.cs\n"));
        let base = prompt.find("===== BASE =====\nbase-text").unwrap();
        let ours = prompt.find("===== OURS =====\nours-text").unwrap();
        let theirs = prompt.find("===== THEIRS =====\ntheirs-text").unwrap();
        assert!(base < ours && ours < theirs);
    }

    #[test]
    fn test_build_messages_roles() {
        let messages = build_messages(&context(), &AiMergePrefs::default());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
