//! Interactive chat loop.

use anyhow::Result;
use archief_rag::QueryPipeline;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::app::new_session;
use crate::presenter::{Presenter, present_turn};
use crate::settings::Settings;

enum Input<'a> {
    Empty,
    Help,
    New,
    Quit,
    Query(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/help" => Input::Help,
        "/new" => Input::New,
        "/quit" | "/exit" => Input::Quit,
        query => Input::Query(query),
    }
}

fn print_help() {
    println!("Type a question about the archive, or:");
    println!("  /new   start a new conversation");
    println!("  /quit  exit");
}

pub async fn run(pipeline: &QueryPipeline, settings: &Settings) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut session = new_session(settings);
    let mut presenter = Presenter::new(std::io::stdout());

    println!("Archief Kasteel Amerongen v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit\n");

    loop {
        match rl.readline("archief> ") {
            Ok(line) => match parse_input(&line) {
                Input::Empty => continue,
                Input::Help => print_help(),
                Input::New => {
                    session = new_session(settings);
                    println!("Started a new conversation.");
                }
                Input::Quit => break,
                Input::Query(query) => {
                    rl.add_history_entry(query)?;
                    present_turn(&mut session, pipeline, query, &mut presenter).await?;
                    println!();
                    debug!(turns = session.history().len(), "turn presented");
                }
            },
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_queries() {
        assert!(matches!(parse_input("   "), Input::Empty));
        assert!(matches!(parse_input("/new"), Input::New));
        assert!(matches!(parse_input(" /quit "), Input::Quit));
        assert!(matches!(parse_input("/exit"), Input::Quit));
        assert!(matches!(parse_input(" Wie was Godard? "), Input::Query("Wie was Godard?")));
    }
}
