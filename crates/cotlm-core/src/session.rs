//! Classification of one line typed into an interactive session.

/// What a line of user input asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// `exit` or `quit`, any case.
    Exit,
    /// Blank after trimming; the session ignores it and prompts again.
    Empty,
    /// A trimmed question to answer.
    Question(String),
}

impl TurnInput {
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else {
            Self::Question(trimmed.to_string())
        }
    }
}
