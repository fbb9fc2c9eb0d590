//! Interactive REPL over `rustyline`, with history kept under `~/.clawbot/history/`.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use clawbot_agent::AgentRunner;

use crate::helpers;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub async fn run(runner: &AgentRunner, session: &str) -> Result<()> {
    helpers::print_banner();
    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\nGoodbye! 👋");
            break;
        }
        let _ = editor.add_history_entry(trimmed);

        helpers::print_thinking();
        let result = runner.process(&helpers::session_message(session, trimmed)).await;
        helpers::clear_thinking();
        match result {
            Ok(outcome) => {
                debug!(tools = outcome.invocations.len(), "turn complete");
                helpers::print_response(&outcome.final_text);
            }
            Err(e) => eprintln!("\n❌ Error: {e}\n"),
        }
    }

    save_history(&mut editor);
    Ok(())
}

fn create_editor() -> Result<DefaultEditor> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;
    let path = history_path();
    if path.exists() {
        if let Err(e) = editor.load_history(&path) {
            debug!("failed to load REPL history: {e}");
        }
    }
    Ok(editor)
}

fn save_history(editor: &mut DefaultEditor) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save REPL history: {e}");
    }
}

fn history_path() -> std::path::PathBuf {
    clawbot_core::utils::get_data_path().join("history").join("cli_history")
}

fn is_exit_command(input: &str) -> bool {
    EXIT_COMMANDS.contains(&input.to_lowercase().as_str())
}
