#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Parses `<prefix>name arg...`. A Telegram `@botname` suffix on the command
/// name is dropped, and the name is lowercased.
pub fn parse_prefixed_command(prefix: &str, text: &str) -> Option<ParsedCommand> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        name,
        args: parts.map(str::to_string).collect(),
    })
}
