use nu_ansi_term::Color;
use reedline::{Prompt, PromptEditMode, PromptHistorySearch};
use std::{borrow::Cow, env, fmt::Display};

pub struct ShellPrompt {
    custom_prompt: Option<Cow<'static, str>>,
}

impl ShellPrompt {
    pub fn new(config: &crate::config::Config) -> Self {
        let custom_prompt = config
            .prompt
            .as_ref()
            .map(|s| Cow::Owned(s.to_string()));

        Self { custom_prompt }
    }
}

/// `user@:cwd$ `
pub fn prompt_text(user: impl Display, cwd: impl Display) -> String {
    format!("{user}@:{cwd}$ ")
}

impl Prompt for ShellPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        if let Some(ref prompt) = self.custom_prompt {
            return prompt.clone();
        }

        let user = env::var("USER").unwrap_or_default();
        let cwd = env::current_dir().unwrap_or_default();

        Cow::Owned(prompt_text(
            Color::Green.bold().paint(user),
            Color::Blue.bold().paint(cwd.display().to_string()),
        ))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("(search) ")
    }
}
