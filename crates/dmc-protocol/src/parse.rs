//! Parsing command lines received over the control socket.

use thiserror::Error;

/// Errors from parsing a raw command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line contained no command (empty or whitespace only)
    #[error("empty command")]
    EmptyCommand,
}

/// A parsed command request: `<command> [args...]`.
///
/// The command name is lowercased at parse time; matching is
/// case-insensitive end to end. Arguments keep their original form.
/// Fields are split on runs of whitespace with no quoting or escaping,
/// a deliberate simplicity choice for a local trusted control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    name: String,
    args: Vec<String>,
}

impl Request {
    /// Parses one command line.
    ///
    /// Leading and trailing whitespace, including the line terminator, is
    /// ignored. A line with no non-whitespace content is
    /// [`ParseError::EmptyCommand`].
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut fields = line.split_whitespace();
        let name = fields
            .next()
            .ok_or(ParseError::EmptyCommand)?
            .to_lowercase();
        let args = fields.map(str::to_string).collect();
        Ok(Self { name, args })
    }

    /// The lowercased command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments exactly as the client sent them.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}
