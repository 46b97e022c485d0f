/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Adjust(i64),
    Note(String),
    Status,
    Quit,
}

/// Parses `+N`, `-N`, `note <text>`, `status`, or `quit`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('+') {
        return rest.trim().parse().ok().map(Command::Adjust);
    }
    if line.starts_with('-') {
        return line.parse().ok().map(Command::Adjust);
    }
    match line.split_once(char::is_whitespace) {
        Some(("note", text)) if !text.trim().is_empty() => {
            Some(Command::Note(text.trim().to_string()))
        }
        None if line == "status" => Some(Command::Status),
        None if line == "quit" || line == "exit" => Some(Command::Quit),
        _ => None,
    }
}
