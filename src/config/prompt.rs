use std::fs;
use std::path::Path;
use log::info;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful, concise chatbot.\nAnswer clearly and directly. If you don't know, say so.\n";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Prompt file '{0}' is empty")]
    Empty(String),
}

pub fn load_system_prompt(path: impl AsRef<Path>) -> Result<String, PromptError> {
    let path = path.as_ref();
    let prompt = fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if prompt.trim().is_empty() {
        return Err(PromptError::Empty(path.display().to_string()));
    }
    info!("Loaded system prompt from {} ({} chars)", path.display(), prompt.chars().count());
    Ok(prompt)
}

/// Picks the system preamble: a prompt file wins over an inline value, which wins
/// over the built-in default.
pub fn resolve_system_prompt(
    inline: Option<&str>,
    path: Option<&str>
) -> Result<String, PromptError> {
    if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
        return load_system_prompt(path);
    }
    match inline.filter(|p| !p.trim().is_empty()) {
        Some(prompt) => Ok(prompt.to_string()),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default() {
        assert_eq!(resolve_system_prompt(None, None).unwrap(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(resolve_system_prompt(Some("  "), Some("")).unwrap(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn inline_overrides_default() {
        assert_eq!(resolve_system_prompt(Some("Be terse."), None).unwrap(), "Be terse.");
    }

    #[test]
    fn file_overrides_inline() {
        let path = std::env::temp_dir().join(format!("fastchat-prompt-{}.txt", uuid::Uuid::new_v4()));
        fs::write(&path, "From file.").unwrap();
        let prompt = resolve_system_prompt(Some("inline"), path.to_str()).unwrap();
        assert_eq!(prompt, "From file.");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_system_prompt("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, PromptError::Io { .. }));
    }
}
