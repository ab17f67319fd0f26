//! Interactive yes/no prompts.
//!
//! Prompts write their question to the same sink as the rest of the
//! progress output, so `--yes`/`--no` echoes and typed answers interleave
//! with the step lines in order.

use anyhow::Result;
use std::io::{self, BufRead, Write};

/// Asks the operator a yes/no question.
pub trait Prompt {
    fn confirm(&mut self, question: &str, out: &mut dyn Write) -> Result<bool>;
}

/// Only a bare `y` or `Y` counts as yes. Empty input declines.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim_end_matches(['\r', '\n']), "y" | "Y")
}

/// Reads one answer per line from `input`.
///
/// Bytes that are not valid UTF-8, EOF and read errors all decline.
pub struct StdinPrompt<R> {
    input: R,
}

impl StdinPrompt<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> StdinPrompt<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Prompt for StdinPrompt<R> {
    fn confirm(&mut self, question: &str, out: &mut dyn Write) -> Result<bool> {
        write!(out, "{} (y/N): ", question)?;
        out.flush()?;

        let mut answer = Vec::new();
        match self.input.read_until(b'\n', &mut answer) {
            Ok(0) => {
                // EOF
                writeln!(out)?;
                Ok(false)
            }
            Ok(_) => Ok(is_affirmative(&String::from_utf8_lossy(&answer))),
            Err(e) => {
                log::warn!("Failed to read answer, treating it as no: {}", e);
                writeln!(out)?;
                Ok(false)
            }
        }
    }
}

/// Answers every question the same way (`--yes` / `--no`).
pub struct FixedPrompt {
    answer: bool,
}

impl FixedPrompt {
    pub fn new(answer: bool) -> Self {
        Self { answer }
    }
}

impl Prompt for FixedPrompt {
    fn confirm(&mut self, question: &str, out: &mut dyn Write) -> Result<bool> {
        writeln!(out, "{} (y/N): {}", question, if self.answer { "y" } else { "n" })?;
        Ok(self.answer)
    }
}

/// Answers from a fixed list and records the questions asked.
#[cfg(test)]
pub struct ScriptedPrompt {
    answers: std::collections::VecDeque<String>,
    pub asked: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|s| s.to_string()).collect(),
            asked: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Prompt for ScriptedPrompt {
    fn confirm(&mut self, question: &str, _out: &mut dyn Write) -> Result<bool> {
        self.asked.push(question.to_string());
        let answer = self
            .answers
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected prompt: {}", question))?;
        Ok(is_affirmative(&answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative("Y"));
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("Y\r\n"));
    }

    #[test]
    fn test_everything_else_declines() {
        for answer in ["", "\n", "n", "N", "yes", "YES", " y", "y ", "yy", "1", "true"] {
            assert!(!is_affirmative(answer), "{:?} should decline", answer);
        }
    }

    #[test]
    fn test_scripted_prompt_records_questions() {
        let mut out = Vec::new();
        let mut prompt = ScriptedPrompt::new(&["Y", "n"]);
        assert!(prompt.confirm("first?", &mut out).unwrap());
        assert!(!prompt.confirm("second?", &mut out).unwrap());
        assert_eq!(prompt.asked, vec!["first?", "second?"]);
        assert!(prompt.confirm("third?", &mut out).is_err());
    }

    /// Answer one question from `input`, returning the answer and what was written.
    fn ask(input: &[u8]) -> (bool, String) {
        let mut out = Vec::new();
        let mut prompt = StdinPrompt::new(input);
        let answer = prompt.confirm("Continue?", &mut out).unwrap();
        (answer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_stdin_prompt_writes_question_to_sink() {
        let (answer, out) = ask(b"y\n");
        assert!(answer);
        assert_eq!(out, "Continue? (y/N): ");
    }

    #[test]
    fn test_stdin_prompt_crlf() {
        assert!(ask(b"Y\r\n").0);
        assert!(!ask(b"n\r\n").0);
    }

    #[test]
    fn test_stdin_prompt_eof_declines() {
        let (answer, out) = ask(b"");
        assert!(!answer);
        assert_eq!(out, "Continue? (y/N): \n");
    }

    #[test]
    fn test_stdin_prompt_invalid_utf8_declines() {
        assert!(!ask(b"\xff\n").0);
        assert!(!ask(b"\xff").0);
        assert!(!ask(b"y\xff\n").0);
    }

    #[test]
    fn test_stdin_prompt_reads_one_line_per_question() {
        let mut out = Vec::new();
        let mut prompt = StdinPrompt::new(&b"\xff\ny\n"[..]);
        assert!(!prompt.confirm("first?", &mut out).unwrap());
        assert!(prompt.confirm("second?", &mut out).unwrap());
        assert!(!prompt.confirm("third?", &mut out).unwrap());
    }

    struct BrokenInput;

    impl io::Read for BrokenInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("terminal went away"))
        }
    }

    #[test]
    fn test_stdin_prompt_read_error_declines() {
        let mut out = Vec::new();
        let mut prompt = StdinPrompt::new(io::BufReader::new(BrokenInput));
        assert!(!prompt.confirm("Continue?", &mut out).unwrap());
    }

    #[test]
    fn test_fixed_prompt_echoes_to_sink() {
        let mut out = Vec::new();
        assert!(FixedPrompt::new(true).confirm("Upgrade?", &mut out).unwrap());
        assert!(!FixedPrompt::new(false).confirm("Retry?", &mut out).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Upgrade? (y/N): y\nRetry? (y/N): n\n"
        );
    }
}
