//! Slash commands for interactive mode

use confab_engine::ConversationEngine;

/// Result of executing a slash command
pub enum CommandResult {
    /// Reset the conversation memory
    Reset,
    /// Clear the terminal screen
    ClearScreen,
    /// Toggle verbose progress output
    ToggleVerbose,
    /// Show a message to the user (not sent to the surface)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, engine: &mut ConversationEngine) -> Option<CommandResult> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = input[1..].splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "reset" | "r" => {
            engine.reset_conversation();
            CommandResult::Reset
        }

        "short" => {
            let on = !engine.short_mode();
            engine.set_short_mode(on);
            CommandResult::Message(format!(
                "Short mode {}",
                if on { "on" } else { "off" }
            ))
        }

        "verbose" | "v" => CommandResult::ToggleVerbose,

        "memory" | "mem" => CommandResult::Message(memory_message(engine)),

        "clear" | "cls" => CommandResult::ClearScreen,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?     Show this help message
  /reset, /r        Forget the conversation and start fresh
  /short            Toggle short-answer mode
  /verbose, /v      Toggle verbose progress output
  /memory, /mem     Show what the engine remembers
  /clear, /cls      Clear the screen
  /quit, /exit, /q  Exit confab

Anything else is sent to the answer surface as a query."#
        .to_string()
}

fn memory_message(engine: &ConversationEngine) -> String {
    let memory = engine.memory();
    if memory.is_empty() {
        return "Memory is empty.".to_string();
    }
    let mut out = String::new();
    for turn in memory.history() {
        out.push_str(&format!("  asked: {}\n", turn.query));
        out.push_str(&format!("  noted: {}\n", turn.summary));
    }
    out.push_str(&format!("  rolling summary: {}", memory.rolling_summary()));
    out
}
