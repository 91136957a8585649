//! Command line splitting for the host's restricted execution path.

/// Split a line into `;`-separated statements.
///
/// Semicolons inside single or double quotes do not split. A quote preceded
/// by an odd number of backslashes is escaped.
///
/// # Examples
///
/// ```
/// use bevy_concommand_lua::host::split_statements;
///
/// assert_eq!(split_statements("say hi; quit"), vec!["say hi", "quit"]);
/// assert_eq!(split_statements(r#"say "a; b""#), vec![r#"say "a; b""#]);
/// ```
pub fn split_statements(line: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_double = false;
    let mut in_single = false;
    let mut backslashes = 0;

    for (i, c) in line.char_indices() {
        match c {
            '\\' => {
                backslashes += 1;
                continue;
            }
            '"' if !in_single && backslashes % 2 == 0 => in_double = !in_double,
            '\'' if !in_double && backslashes % 2 == 0 => in_single = !in_single,
            ';' if !in_double && !in_single => {
                push_trimmed(&mut statements, &line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        backslashes = 0;
    }

    push_trimmed(&mut statements, &line[start..]);
    statements
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, statement: &'a str) {
    let statement = statement.trim();
    if !statement.is_empty() {
        out.push(statement);
    }
}

/// The command word of a statement, with surrounding quotes removed.
pub fn command_word(statement: &str) -> Option<&str> {
    let statement = statement.trim_start();
    let mut chars = statement.char_indices();
    let (_, first) = chars.next()?;

    if first == '"' || first == '\'' {
        let rest = &statement[1..];
        let end = rest.find(first).unwrap_or(rest.len());
        return Some(&rest[..end]);
    }

    let end = statement
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .unwrap_or(statement.len());
    Some(&statement[..end])
}
