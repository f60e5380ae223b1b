use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Step(u64), // Step N cycles
  Continue,
  Print,
  Quit,
}

pub const HELP: &str = "Enter to step, 'si N' to step N cycles, 'p' to print units, 'c' to continue, 'q' to quit";

/// Parse one shell line. Empty input steps once.
pub fn parse_command(line: &str) -> Result<Command, String> {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return Ok(Command::Step(1));
  }

  if let Some(rest) = trimmed.strip_prefix("si") {
    let num_str = rest.trim();
    if num_str.is_empty() {
      return Err("'si' requires a number, e.g., 'si 100'".to_string());
    }
    return match num_str.parse::<u64>() {
      Ok(n) if n > 0 => Ok(Command::Step(n)),
      Ok(_) => Err("step count must be greater than 0".to_string()),
      Err(e) => Err(format!("invalid number '{}': {}", num_str, e)),
    };
  }

  match trimmed {
    "c" => Ok(Command::Continue),
    "p" => Ok(Command::Print),
    "q" => Ok(Command::Quit),
    other => Err(format!("unknown command '{}'. {}", other, HELP)),
  }
}

/// Interactive step-mode prompt
pub struct Shell {
  editor: DefaultEditor,
}

impl Shell {
  pub fn new() -> Result<Self, SimError> {
    Ok(Self {
      editor: DefaultEditor::new()?,
    })
  }

  pub fn read_command(&mut self) -> Result<Command, SimError> {
    loop {
      match self.editor.readline("(ternpu) ") {
        Ok(line) => {
          let trimmed = line.trim();
          if !trimmed.is_empty() {
            let _ = self.editor.add_history_entry(trimmed);
          }
          match parse_command(trimmed) {
            Ok(cmd) => return Ok(cmd),
            Err(msg) => eprintln!("Error: {}", msg),
          }
        },
        // Ctrl-C / Ctrl-D
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(Command::Quit),
        Err(err) => return Err(err.into()),
      }
    }
  }
}
