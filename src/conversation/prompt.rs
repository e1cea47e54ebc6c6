//! # System Prompt
//!
//! The system prompt is resolved once at startup from `chatbot.prompt` and
//! shared, read-only, by every session for the rest of the process lifetime.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;

const BUNDLED_PREFIX: &str = "bundled:";
const FILE_PREFIX: &str = "file:";

/// Prompts compiled into the binary, addressable as `bundled:<name>`.
const BUNDLED_PROMPTS: &[(&str, &str)] = &[(
    "marvin.paranoid.android.txt",
    include_str!("../../prompts/marvin.paranoid.android.txt"),
)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    source: String,
    text: Arc<str>,
}

impl SystemPrompt {
    /// Resolve a prompt location (`bundled:<name>`, `file:<path>` or a bare path).
    pub fn load(location: &str) -> Result<Self> {
        let location = location.trim();

        let text = if let Some(name) = location.strip_prefix(BUNDLED_PREFIX) {
            BUNDLED_PROMPTS
                .iter()
                .find(|(bundled, _)| *bundled == name)
                .map(|(_, text)| (*text).to_string())
                .ok_or_else(|| anyhow!("Unknown bundled prompt '{}'", name))?
        } else {
            let path = location.strip_prefix(FILE_PREFIX).unwrap_or(location);
            read_prompt_file(Path::new(path))?
        };

        if text.trim().is_empty() {
            return Err(anyhow!("System prompt at '{}' is empty", location));
        }

        Ok(Self {
            source: location.to_string(),
            text: Arc::from(text),
        })
    }

    #[cfg(test)]
    pub fn from_text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            source: "inline".to_string(),
            text: Arc::from(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn read_prompt_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_prompt() {
        let prompt = SystemPrompt::load("bundled:marvin.paranoid.android.txt").unwrap();
        assert!(prompt.text().contains("Marvin"));
        assert_eq!(prompt.source(), "bundled:marvin.paranoid.android.txt");
    }

    #[test]
    fn test_unknown_bundled_prompt() {
        let err = SystemPrompt::load("bundled:nope.txt").unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }

    #[test]
    fn test_file_prompt_is_used_verbatim() {
        let path = std::env::temp_dir().join(format!("prompt-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "You are a terse assistant.\n").unwrap();

        let prefixed = SystemPrompt::load(&format!("file:{}", path.display())).unwrap();
        let bare = SystemPrompt::load(&path.display().to_string()).unwrap();
        assert_eq!(prefixed.text(), "You are a terse assistant.\n");
        assert_eq!(bare.text(), prefixed.text());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_or_empty_prompt_file() {
        assert!(SystemPrompt::load("/definitely/not/here.txt").is_err());

        let path = std::env::temp_dir().join(format!("prompt-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "   \n").unwrap();
        assert!(SystemPrompt::load(&path.display().to_string()).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
