//! Interactive prompt for the top-level conversation.

use std::path::PathBuf;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::runtime::Runtime;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput<'a> {
    Empty,
    Exit,
    Prompt(&'a str),
}

pub fn parse_input(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => ReplInput::Empty,
        "exit" | "quit" | "q" => ReplInput::Exit,
        _ => ReplInput::Prompt(line),
    }
}

/// Startup banner: model, workdir, skills and agent types.
pub fn banner(runtime: &Runtime) -> String {
    let ws = runtime.workspace();
    let skills = ws.skills.names();
    let skills = if skills.is_empty() {
        "none".to_string()
    } else {
        skills.join(", ")
    };
    format!(
        "Agent with model: {} - {}\nSkills: {}\nAgent types: {}\nType 'exit' to quit.\n",
        runtime.model_name(),
        ws.workdir().display(),
        skills,
        ws.agent_types.names().join(", ")
    )
}

pub struct Repl {
    history_file: Option<PathBuf>,
}

impl Repl {
    pub fn new() -> Self {
        Repl {
            history_file: dirs::home_dir().map(|h| h.join(".kestrel_history")),
        }
    }

    /// Read lines until exit, EOF or Ctrl-C. A failed turn is reported and
    /// the session continues with its history intact.
    pub async fn run(&self, runtime: &mut Runtime) -> rustyline::Result<()> {
        println!("{}", banner(runtime));

        let mut rl = DefaultEditor::new()?;
        if let Some(ref path) = self.history_file {
            let _ = rl.load_history(path);
        }

        loop {
            let line = match rl.readline("You: ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            };

            let input = match parse_input(&line) {
                ReplInput::Empty => continue,
                ReplInput::Exit => break,
                ReplInput::Prompt(input) => input,
            };
            rl.add_history_entry(input)?;

            match runtime.send(input).await {
                Ok(reply) => println!("\n{}\n", reply),
                Err(e) => println!("\x1b[31mError: {}\x1b[0m\n", e),
            }
        }

        if let Some(metrics) = runtime.metrics() {
            debug!(?metrics, "session finished");
        }
        if let Some(ref path) = self.history_file {
            let _ = rl.save_history(path);
        }
        Ok(())
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::llm::ScriptedLLM;
    use crate::workspace::Workspace;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), ReplInput::Empty);
        assert_eq!(parse_input("exit"), ReplInput::Exit);
        assert_eq!(parse_input(" q "), ReplInput::Exit);
        assert_eq!(parse_input("EXIT"), ReplInput::Exit);
        assert_eq!(parse_input("Quit"), ReplInput::Exit);
        assert_eq!(parse_input("Q"), ReplInput::Exit);
        assert_eq!(parse_input("  list files "), ReplInput::Prompt("list files"));
        assert_eq!(parse_input("exit now"), ReplInput::Prompt("exit now"));
    }

    #[test]
    fn test_banner() {
        let tmp = TempDir::new().unwrap();
        let runtime = Runtime::new(
            Workspace::bare(tmp.path()),
            Arc::new(ScriptedLLM::new(vec![])),
            RuntimeSettings::default(),
        );
        let text = banner(&runtime);
        assert!(text.starts_with("Agent with model: scripted - "), "{}", text);
        assert!(text.contains("\nSkills: none\n"));
        assert!(text.contains("\nAgent types: explore, code, plan\n"));
    }
}
