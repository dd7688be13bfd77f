//! Job command lines (`mirror ...`, `pget ...`) as echoed back by `jobs -v`.

use crate::job_status::JobKind;

use super::ParseError;

/// Options that take the following token as their value.
const OPTIONS_WITH_VALUE: &[&str] = &["-n", "-o", "-O", "-P"];

/// Parsed command part of a job header or queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobCommand {
    pub kind: JobKind,
    pub name: String,
    pub flags: String,
    /// `Some` when the command text contained a ` -- ` separator; holds the text after it.
    pub progress: Option<String>,
}

/// Split `text` into shell-like tokens. A bare `--` token ends the command; the
/// remainder (trimmed) is returned as the progress text.
fn tokenize(text: &str, line: usize) -> Result<(Vec<String>, Option<String>), ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices();

    while let Some((idx, c)) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c == '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    current.push(escaped);
                    in_token = true;
                }
            }
            None if c.is_whitespace() => {
                if in_token {
                    if current == "--" {
                        let rest = text[idx..].trim().to_string();
                        return Ok((tokens, Some(rest)));
                    }
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote {
            line,
            text: text.to_string(),
        });
    }
    if in_token {
        if current == "--" {
            return Ok((tokens, Some(String::new())));
        }
        tokens.push(current);
    }
    Ok((tokens, None))
}

/// Last path component, ignoring trailing slashes.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return path;
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parse `<command> <args...> [-- <progress>]`.
pub(crate) fn parse_command(text: &str, line: usize) -> Result<JobCommand, ParseError> {
    let (tokens, progress) = tokenize(text, line)?;
    let mut tokens = tokens.into_iter();
    let word = tokens.next().unwrap_or_default();
    let kind = match word.as_str() {
        "mirror" => JobKind::Mirror,
        "pget" => JobKind::Pget,
        _ => {
            return Err(ParseError::UnsupportedCommand { line, command: word });
        }
    };

    let mut flags = Vec::new();
    let mut positional = Vec::new();
    let mut output = None;
    while let Some(token) = tokens.next() {
        if token.len() > 1 && token.starts_with('-') {
            if OPTIONS_WITH_VALUE.contains(&token.as_str()) {
                let value = tokens.next().ok_or(ParseError::MissingArgument {
                    line,
                    command: kind.as_str(),
                    argument: "option value",
                })?;
                if token == "-o" {
                    output = Some(value);
                } else {
                    flags.push(token);
                    flags.push(value);
                }
            } else {
                flags.push(token);
            }
        } else {
            positional.push(token);
        }
    }

    let mut positional = positional.into_iter();
    let remote = positional.next().ok_or(ParseError::MissingArgument {
        line,
        command: kind.as_str(),
        argument: "remote path",
    })?;
    let local = output.or_else(|| positional.next());
    if kind == JobKind::Mirror && local.is_none() {
        return Err(ParseError::MissingArgument {
            line,
            command: kind.as_str(),
            argument: "local path",
        });
    }

    Ok(JobCommand {
        kind,
        name: base_name(&remote).to_string(),
        flags: flags.join(" "),
        progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_with_flags_and_progress() {
        let cmd = parse_command(
            "mirror -c --parallel=2 /remote/a /local/a  -- 1.4k/26M (0%)",
            1,
        )
        .unwrap();
        assert_eq!(cmd.kind, JobKind::Mirror);
        assert_eq!(cmd.name, "a");
        assert_eq!(cmd.flags, "-c --parallel=2");
        assert_eq!(cmd.progress.as_deref(), Some("1.4k/26M (0%)"));
    }

    #[test]
    fn quoted_paths_with_spaces() {
        let cmd = parse_command(r#"mirror -c "/remote/My Show" '/local/My Show'"#, 1).unwrap();
        assert_eq!(cmd.name, "My Show");
        assert!(cmd.progress.is_none());
    }

    #[test]
    fn escaped_quote_inside_double_quotes() {
        let cmd = parse_command(r#"pget -c "/r/say \"hi\".txt" -o /l/"#, 1).unwrap();
        assert_eq!(cmd.name, r#"say "hi".txt"#);
    }

    #[test]
    fn pget_output_option_and_connection_count() {
        let cmd = parse_command("pget -c -n 4 /remote/c.iso -o /local/", 2).unwrap();
        assert_eq!(cmd.kind, JobKind::Pget);
        assert_eq!(cmd.flags, "-c -n 4");
        assert_eq!(cmd.name, "c.iso");
    }

    #[test]
    fn pget_without_output_is_accepted() {
        let cmd = parse_command("pget /remote/c.iso", 1).unwrap();
        assert_eq!(cmd.name, "c.iso");
        assert_eq!(cmd.flags, "");
    }

    #[test]
    fn trailing_slash_name() {
        let cmd = parse_command("mirror /remote/dir/ /local/dir/", 1).unwrap();
        assert_eq!(cmd.name, "dir");
    }

    #[test]
    fn errors() {
        assert!(matches!(
            parse_command("mirror -c \"/remote/a /local/a", 7),
            Err(ParseError::UnterminatedQuote { line: 7, .. })
        ));
        assert!(matches!(
            parse_command("mirror -c /remote/a", 1),
            Err(ParseError::MissingArgument { argument: "local path", .. })
        ));
        assert!(matches!(
            parse_command("get /remote/a", 1),
            Err(ParseError::UnsupportedCommand { .. })
        ));
        assert!(matches!(
            parse_command("pget -c -n", 1),
            Err(ParseError::MissingArgument { argument: "option value", .. })
        ));
    }
}
