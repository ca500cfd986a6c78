//! Quote-aware shell command lexer.
//!
//! Security validation must reason about the *structure* of a command
//! (separators, operators, quoting) rather than treating it as a flat
//! string — otherwise an attacker could hide dangerous sub-commands inside
//! quoted arguments or chained operators. The lexer therefore either
//! produces a full pipeline decomposition or fails, and a failure is
//! always a deny upstream.

use serde::Serialize;

/// A single pipeline segment: the trimmed source text plus its word-split
/// argument vector (quotes removed, escapes applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexedSegment {
    pub raw: String,
    pub argv: Vec<String>,
}

/// A fully lexed command: one entry per pipeline segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexedCommand {
    pub segments: Vec<LexedSegment>,
}

/// Constructs the lexer refuses to analyze. Every variant is fatal to the
/// whole command: an unparsable command is never partially trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unbalanced quote")]
    UnbalancedQuote,
    #[error("trailing escape character")]
    TrailingEscape,
    #[error("command substitution is not analyzable")]
    CommandSubstitution,
    #[error("shell expansion is not analyzable")]
    ShellExpansion,
    #[error("process substitution is not analyzable")]
    ProcessSubstitution,
    #[error("redirection operators bypass path policy")]
    Redirection,
    #[error("background operator '&' hides sub-commands")]
    BackgroundOperator,
    #[error("empty command")]
    EmptyCommand,
    #[error("empty pipeline segment")]
    EmptySegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    None,
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// `;` or newline: a trailing one is harmless.
    Sequence,
    /// `|`, `||`, `&&`: another segment must follow.
    Chain,
}

/// Split a command into pipeline segments on unquoted separators and
/// word-split each segment.
///
/// Separators: `;`, newline, `|`, `||`, `&&`. Characters inside single or
/// double quotes are literal, so `sqlite3 db "SELECT 1; SELECT 2;"`
/// remains a single segment.
pub fn lex_command(command: &str) -> Result<LexedCommand, ParseError> {
    let raw_segments = split_segments(command)?;
    if raw_segments.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let mut segments = Vec::with_capacity(raw_segments.len());
    for raw in raw_segments {
        let argv = split_words(&raw)?;
        if argv.is_empty() {
            return Err(ParseError::EmptySegment);
        }
        segments.push(LexedSegment { raw, argv });
    }

    Ok(LexedCommand { segments })
}

fn split_segments(command: &str) -> Result<Vec<String>, ParseError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote = QuoteState::None;
    let mut escaped = false;
    let mut last_separator: Option<Separator> = None;
    let mut chars = command.chars().peekable();

    let mut push_segment =
        |current: &mut String, separator: Separator| -> Result<(), ParseError> {
            let trimmed = current.trim();
            if trimmed.is_empty() {
                return Err(ParseError::EmptySegment);
            }
            segments.push(trimmed.to_string());
            current.clear();
            last_separator = Some(separator);
            Ok(())
        };

    while let Some(ch) = chars.next() {
        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                }
                current.push(ch);
            }
            QuoteState::Double => {
                if escaped {
                    escaped = false;
                    current.push(ch);
                    continue;
                }
                match ch {
                    '\\' => {
                        escaped = true;
                        current.push(ch);
                    }
                    // Backticks and `$` still expand inside double quotes.
                    '`' => return Err(ParseError::CommandSubstitution),
                    '$' if is_expansion_start(chars.peek()) => {
                        return Err(ParseError::ShellExpansion)
                    }
                    '"' => {
                        quote = QuoteState::None;
                        current.push(ch);
                    }
                    _ => current.push(ch),
                }
            }
            QuoteState::None => {
                if escaped {
                    escaped = false;
                    current.push(ch);
                    continue;
                }
                match ch {
                    '\\' => {
                        escaped = true;
                        current.push(ch);
                    }
                    '\'' => {
                        quote = QuoteState::Single;
                        current.push(ch);
                    }
                    '"' => {
                        quote = QuoteState::Double;
                        current.push(ch);
                    }
                    '`' => return Err(ParseError::CommandSubstitution),
                    '$' if is_expansion_start(chars.peek()) => {
                        return Err(ParseError::ShellExpansion)
                    }
                    '<' | '>' => {
                        if chars.peek() == Some(&'(') {
                            return Err(ParseError::ProcessSubstitution);
                        }
                        return Err(ParseError::Redirection);
                    }
                    ';' | '\n' => push_segment(&mut current, Separator::Sequence)?,
                    '|' => {
                        chars.next_if_eq(&'|');
                        push_segment(&mut current, Separator::Chain)?;
                    }
                    '&' => {
                        if chars.next_if_eq(&'&').is_none() {
                            return Err(ParseError::BackgroundOperator);
                        }
                        push_segment(&mut current, Separator::Chain)?;
                    }
                    _ => current.push(ch),
                }
            }
        }
    }

    if quote != QuoteState::None {
        return Err(ParseError::UnbalancedQuote);
    }
    if escaped {
        return Err(ParseError::TrailingEscape);
    }

    let trimmed = current.trim();
    if trimmed.is_empty() {
        // `ls |` and `ls &&` are incomplete; `ls ;` is fine.
        if last_separator == Some(Separator::Chain) {
            return Err(ParseError::EmptySegment);
        }
    } else {
        segments.push(trimmed.to_string());
    }

    Ok(segments)
}

/// Characters that start an expansion after `$` (variables, `${}`, `$()`,
/// arithmetic, positional and special parameters).
fn is_expansion_start(next: Option<&char>) -> bool {
    let Some(&next) = next else {
        return false;
    };
    next.is_ascii_alphanumeric()
        || matches!(next, '_' | '{' | '(' | '#' | '?' | '!' | '$' | '*' | '@' | '-')
}

/// Word-split a single segment, removing quotes and applying escapes.
fn split_words(segment: &str) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = QuoteState::None;
    let mut escaped = false;

    for ch in segment.chars() {
        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                } else {
                    current.push(ch);
                }
            }
            QuoteState::Double => {
                if escaped {
                    escaped = false;
                    // Inside double quotes, backslash only escapes a few
                    // characters; the rest keep their backslash.
                    if !matches!(ch, '"' | '\\' | '$' | '`') {
                        current.push('\\');
                    }
                    current.push(ch);
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    quote = QuoteState::None;
                } else {
                    current.push(ch);
                }
            }
            QuoteState::None => {
                if escaped {
                    escaped = false;
                    current.push(ch);
                    continue;
                }
                match ch {
                    '\\' => escaped = true,
                    '\'' => {
                        quote = QuoteState::Single;
                        in_word = true;
                    }
                    '"' => {
                        quote = QuoteState::Double;
                        in_word = true;
                    }
                    c if c.is_whitespace() => {
                        if in_word || !current.is_empty() {
                            words.push(std::mem::take(&mut current));
                            in_word = false;
                        }
                    }
                    _ => current.push(ch),
                }
            }
        }
        if !current.is_empty() {
            in_word = true;
        }
    }

    if quote != QuoteState::None {
        return Err(ParseError::UnbalancedQuote);
    }
    if escaped {
        return Err(ParseError::TrailingEscape);
    }
    if in_word || !current.is_empty() {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(command: &str) -> Vec<Vec<String>> {
        lex_command(command)
            .unwrap()
            .segments
            .into_iter()
            .map(|s| s.argv)
            .collect()
    }

    #[test]
    fn single_command_splits_words() {
        assert_eq!(argv("jq -r .name"), vec![vec!["jq", "-r", ".name"]]);
    }

    #[test]
    fn pipeline_splits_into_segments() {
        let got = argv("cat | sort -r | uniq");
        assert_eq!(
            got,
            vec![vec!["cat"], vec!["sort", "-r"], vec!["uniq"]]
        );
    }

    #[test]
    fn and_chain_splits_like_pipe() {
        assert_eq!(argv("sort && uniq"), vec![vec!["sort"], vec!["uniq"]]);
    }

    #[test]
    fn or_chain_splits_like_pipe() {
        assert_eq!(argv("sort || uniq"), vec![vec!["sort"], vec!["uniq"]]);
    }

    #[test]
    fn quoted_separator_stays_in_word() {
        assert_eq!(
            argv(r#"grep "a|b""#),
            vec![vec!["grep".to_string(), "a|b".to_string()]]
        );
    }

    #[test]
    fn single_quotes_preserve_dollar() {
        assert_eq!(
            argv("grep '$HOME'"),
            vec![vec!["grep".to_string(), "$HOME".to_string()]]
        );
    }

    #[test]
    fn double_quoted_words_join() {
        assert_eq!(
            argv(r#"grep "hello world""#),
            vec![vec!["grep".to_string(), "hello world".to_string()]]
        );
    }

    #[test]
    fn escaped_space_stays_in_word() {
        assert_eq!(
            argv(r"grep hello\ world"),
            vec![vec!["grep".to_string(), "hello world".to_string()]]
        );
    }

    #[test]
    fn empty_quotes_produce_empty_word() {
        assert_eq!(
            argv(r#"grep """#),
            vec![vec!["grep".to_string(), String::new()]]
        );
    }

    #[test]
    fn unbalanced_quote_is_rejected() {
        assert_eq!(lex_command("grep 'oops"), Err(ParseError::UnbalancedQuote));
        assert_eq!(
            lex_command(r#"grep "oops"#),
            Err(ParseError::UnbalancedQuote)
        );
    }

    #[test]
    fn trailing_escape_is_rejected() {
        assert_eq!(lex_command("grep x\\"), Err(ParseError::TrailingEscape));
    }

    #[test]
    fn backtick_is_rejected_even_in_double_quotes() {
        assert_eq!(
            lex_command("echo \"`id`\""),
            Err(ParseError::CommandSubstitution)
        );
    }

    #[test]
    fn dollar_expansion_is_rejected() {
        assert_eq!(lex_command("echo $HOME"), Err(ParseError::ShellExpansion));
        assert_eq!(lex_command("echo ${X}"), Err(ParseError::ShellExpansion));
        assert_eq!(lex_command("echo $(id)"), Err(ParseError::ShellExpansion));
    }

    #[test]
    fn literal_dollar_in_single_quotes_is_fine() {
        assert!(lex_command("echo '$(id)'").is_ok());
    }

    #[test]
    fn bare_dollar_is_fine() {
        assert_eq!(
            argv("echo $"),
            vec![vec!["echo".to_string(), "$".to_string()]]
        );
    }

    #[test]
    fn redirection_is_rejected() {
        assert_eq!(lex_command("sort > out"), Err(ParseError::Redirection));
        assert_eq!(lex_command("sort < in"), Err(ParseError::Redirection));
        assert_eq!(lex_command("sort 2>err"), Err(ParseError::Redirection));
    }

    #[test]
    fn process_substitution_is_rejected() {
        assert_eq!(
            lex_command("diff <(ls) x"),
            Err(ParseError::ProcessSubstitution)
        );
    }

    #[test]
    fn quoted_redirection_chars_are_literal() {
        assert_eq!(
            argv(r#"echo "a>b""#),
            vec![vec!["echo".to_string(), "a>b".to_string()]]
        );
    }

    #[test]
    fn single_ampersand_is_rejected() {
        assert_eq!(lex_command("sleep 5 &"), Err(ParseError::BackgroundOperator));
        assert_eq!(
            lex_command("ls & date"),
            Err(ParseError::BackgroundOperator)
        );
    }

    #[test]
    fn empty_command_is_rejected() {
        assert_eq!(lex_command(""), Err(ParseError::EmptyCommand));
        assert_eq!(lex_command("   "), Err(ParseError::EmptyCommand));
    }

    #[test]
    fn dangling_pipe_is_rejected() {
        assert_eq!(lex_command("ls |"), Err(ParseError::EmptySegment));
        assert_eq!(lex_command("ls &&"), Err(ParseError::EmptySegment));
        assert_eq!(lex_command("| ls"), Err(ParseError::EmptySegment));
    }

    #[test]
    fn trailing_semicolon_is_tolerated() {
        assert_eq!(argv("date ;"), vec![vec!["date"]]);
    }

    #[test]
    fn raw_preserves_segment_text() {
        let lexed = lex_command("sort -r | uniq").unwrap();
        assert_eq!(lexed.segments[0].raw, "sort -r");
        assert_eq!(lexed.segments[1].raw, "uniq");
    }
}
