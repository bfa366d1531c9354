//! Splits raw console input into built-in commands and AI queries.

/// What a line of input asks the console to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoOp,
    ClearTerminal,
    ShowHelp,
    ListFiles,
    SubmitQuery(String),
}

/// Trims the input and dispatches on an exact, case-sensitive match.
pub fn interpret(raw: &str) -> Action {
    match raw.trim() {
        "" => Action::NoOp,
        "clear" => Action::ClearTerminal,
        "help" => Action::ShowHelp,
        "files" => Action::ListFiles,
        query => Action::SubmitQuery(query.to_string()),
    }
}

pub fn help_lines() -> Vec<String> {
    vec![
        "Available Commands:".to_string(),
        "clear - Clear the terminal".to_string(),
        "files - List uploaded files".to_string(),
        "help - Show this list of commands".to_string(),
        String::new(),
        "Any other input will be treated as a question for the AI.".to_string(),
        "Questions mentioning \"image\" include the most recently uploaded image.".to_string(),
    ]
}
