//! Interactive prompts.
//!
//! Thin adapter over stdin: every answer is parsed by a pure function so the
//! mapping rules are testable without a terminal.

use std::io::{self, BufRead, Write};

use trocr_core::ModelChoice;

/// Print the model menu and read a selection.
pub fn select_model() -> io::Result<ModelChoice> {
    println!("Available models:");
    for (number, choice) in [
        ModelChoice::BaseHandwritten,
        ModelChoice::BasePrinted,
        ModelChoice::SmallHandwritten,
    ]
    .iter()
    .enumerate()
    {
        println!(
            "  {}. {} ({})",
            number + 1,
            choice.repo_id(),
            choice.description()
        );
    }
    let answer = ask("Select model (1/2/3, default 1): ")?;
    Ok(ModelChoice::from_menu_choice(&answer))
}

/// Ask for confirmation before starting the pipeline.
///
/// Only `y` or `Y` continues; anything else aborts.
pub fn confirm_continue() -> io::Result<bool> {
    let answer = ask("Continue? (y/n): ")?;
    Ok(parse_confirmation(&answer))
}

fn ask(question: &str) -> io::Result<String> {
    print!("{question}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn parse_confirmation(input: &str) -> bool {
    matches!(input.trim(), "y" | "Y")
}
