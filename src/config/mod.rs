pub mod prompt;

use crate::cli::Args;
use crate::memory::DEFAULT_MAX_MESSAGES;
use self::prompt::{ resolve_system_prompt, PromptError, DEFAULT_SYSTEM_PROMPT };

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4000;

/// Chat behaviour injected into the memory window and the orchestrator.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub max_messages: usize,
    pub max_message_chars: usize,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ChatConfig {
    pub fn from_args(args: &Args) -> Result<Self, PromptError> {
        Ok(Self {
            max_messages: args.memory_max_messages,
            max_message_chars: args.max_message_chars,
            system_prompt: resolve_system_prompt(
                args.system_prompt.as_deref(),
                args.system_prompt_path.as_deref()
            )?,
        })
    }
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn args_defaults_match_chat_defaults() {
        let args = Args::parse_from(["fastchat"]);
        let config = ChatConfig::from_args(&args).unwrap();
        assert_eq!(config.max_messages, 20);
        assert_eq!(config.max_message_chars, 4000);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn splits_origins() {
        assert_eq!(
            parse_origins("http://localhost:5173, https://fastchat-ten.vercel.app,,"),
            vec!["http://localhost:5173", "https://fastchat-ten.vercel.app"]
        );
    }
}
