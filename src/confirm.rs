//! Operator confirmation prompts

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use colored::Colorize;

/// Asks the operator a yes/no question
pub trait Confirmer {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;
}

/// Interactive prompt on a reader/writer pair (stdin/stderr by default)
pub struct TerminalConfirmer<R, W> {
    input: R,
    output: W,
}

impl TerminalConfirmer<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirmer for TerminalConfirmer<R, W> {
    /// Only `y`/`yes` count as yes. End of input counts as no.
    /// Anything else asks again.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        loop {
            write!(self.output, "{} {} ", prompt.yellow().bold(), "[y/N]".dimmed())?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                writeln!(self.output)?;
                return Ok(false);
            }
            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "" | "n" | "no" => return Ok(false),
                other => writeln!(self.output, "I didn't understand '{other}', please answer y or n")?,
            }
        }
    }
}

/// Answers every prompt the same way (`--yes`)
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> io::Result<bool> {
        Ok(self.0)
    }
}

/// Replays scripted answers, then answers no
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    prompts: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Confirmer for ScriptedConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front().unwrap_or(false))
    }
}
