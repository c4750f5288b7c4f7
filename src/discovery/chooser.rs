use std::io::{BufRead, Write};

use crate::error::{DrError, Result};

/// Picks exactly one value out of several discovered candidates.
pub trait Chooser {
    fn choose(&mut self, key: &str, candidates: &[String]) -> Result<String>;
}

/// Prompts on a terminal: numbered list, answer by number.
pub struct PromptChooser<R, W> {
    input: R,
    output: W,
}

impl PromptChooser<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdin() -> Self {
        Self {
            input: std::io::stdin().lock(),
            output: std::io::stdout(),
        }
    }
}

impl<R: BufRead, W: Write> PromptChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Chooser for PromptChooser<R, W> {
    fn choose(&mut self, key: &str, candidates: &[String]) -> Result<String> {
        if candidates.is_empty() {
            return Err(DrError::config(format!("no candidates to choose from for {}", key)));
        }
        writeln!(self.output, "Several values found for {}:", key)?;
        for (i, c) in candidates.iter().enumerate() {
            writeln!(self.output, "  {}) {}", i + 1, c)?;
        }
        loop {
            write!(self.output, "Choose 1-{}: ", candidates.len())?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(DrError::config(format!("no answer given for {}", key)));
            }
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=candidates.len()).contains(&n) => return Ok(candidates[n - 1].clone()),
                _ => writeln!(self.output, "'{}' is not a valid choice", line.trim())?,
            }
        }
    }
}

/// Non-interactive: always takes the first candidate.
#[derive(Debug, Default)]
pub struct FirstChooser;

impl Chooser for FirstChooser {
    fn choose(&mut self, key: &str, candidates: &[String]) -> Result<String> {
        let first = candidates
            .first()
            .cloned()
            .ok_or_else(|| DrError::config(format!("no candidates to choose from for {}", key)))?;
        tracing::warn!(key = key, chosen = %first, "Multiple candidates, taking the first");
        Ok(first)
    }
}
