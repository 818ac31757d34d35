use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use datashift_common::Error;
use datashift_engine::Prompt;
use dialoguer::{Confirm, Select};

/// How questions get answered for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Ask on the terminal.
    Ask,
    /// `--no-interaction` or no terminal: every question is answered yes.
    AssumeYes,
}

impl Interaction {
    pub fn detect(no_interaction: bool) -> Self {
        if no_interaction || !std::io::stdin().is_terminal() {
            Interaction::AssumeYes
        } else {
            Interaction::Ask
        }
    }

    pub fn is_interactive(self) -> bool {
        self == Interaction::Ask
    }

    pub fn confirm(self, question: &str, default: bool) -> Result<bool> {
        match self {
            Interaction::AssumeYes => Ok(true),
            Interaction::Ask => Confirm::new()
                .with_prompt(question)
                .default(default)
                .interact()
                .context("confirmation cancelled"),
        }
    }

    /// Pick one of `dirs`; without a terminal the first one wins.
    pub fn choose_directory(self, dirs: &[PathBuf]) -> Result<PathBuf> {
        let Some(first) = dirs.first() else {
            anyhow::bail!("no migration directories configured");
        };
        if dirs.len() == 1 || !self.is_interactive() {
            return Ok(first.clone());
        }

        let items: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
        let selection = Select::new()
            .with_prompt("Select the directory for the new migration")
            .items(&items)
            .default(0)
            .interact()
            .context("directory selection cancelled")?;
        Ok(dirs[selection].clone())
    }
}

/// Terminal prompt handed to migration units.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &str, default: bool) -> datashift_common::Result<bool> {
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(|e| Error::Other(format!("prompt failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assume_yes_never_prompts() {
        let interaction = Interaction::AssumeYes;
        assert!(!interaction.is_interactive());
        assert!(interaction.confirm("drop everything?", false).unwrap());
    }

    #[test]
    fn no_interaction_flag_wins() {
        assert_eq!(Interaction::detect(true), Interaction::AssumeYes);
    }

    #[test]
    fn single_directory_is_chosen_without_asking() {
        let dirs = vec![PathBuf::from("migrations")];
        assert_eq!(
            Interaction::Ask.choose_directory(&dirs).unwrap(),
            PathBuf::from("migrations")
        );
        assert!(Interaction::AssumeYes.choose_directory(&[]).is_err());
    }
}
