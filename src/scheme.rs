use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit1, multispace0, multispace1, not_line_ending, one_of, satisfy},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::{many0, many1, separated_list0},
    sequence::pair,
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::{NumberType, Value, is_symbol_char, is_symbol_start};

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` up to the end of the line as whitespace
    pub handle_comments: bool,
    /// Maximum nesting of lists and quotes
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

fn error_at(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn failure_at(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Render a byte offset into `input` as a line/column pair (both 1-based)
fn describe_position(input: &str, offset: usize) -> String {
    let consumed = &input[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rsplit('\n')
        .next()
        .map_or(0, |last| last.chars().count())
        + 1;
    format!("line {line}, column {column}")
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(
    input: &str,
    error: nom::Err<nom::error::Error<&str>>,
    config: ParseConfig,
) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let position = describe_position(input, offset);
            let message = match e.code {
                ErrorKind::TooLarge => format!(
                    "Expression too deeply nested (max depth: {})",
                    config.max_depth
                ),
                ErrorKind::MapRes => "Integer literal out of range".to_owned(),
                ErrorKind::Eof => "Unterminated string literal".to_owned(),
                ErrorKind::Escaped => "Invalid escape sequence".to_owned(),
                _ if e.input.is_empty() => "Unexpected end of input".to_owned(),
                _ => {
                    let near: String = e.input.chars().take(10).collect();
                    format!("Invalid syntax near '{near}'")
                }
            };
            format!("{message} at {position}")
        }
        nom::Err::Incomplete(_) => "Incomplete input".into(),
    }
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(char(';'), not_line_ending)).parse(input)
}

/// Skip any amount of whitespace (and comments, when enabled)
fn skip_space(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        value((), many0(alt((value((), multispace1), comment)))).parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// Require at least one whitespace character (or comment) between list elements
fn separator(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        value((), many1(alt((value((), multispace1), comment)))).parse(input)
    } else {
        value((), multispace1).parse(input)
    }
}

/// Parse an optionally signed decimal integer
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (remaining, number_str) = recognize(pair(opt(one_of("+-")), digit1)).parse(input)?;

    // "123abc" and "-1x" are neither numbers nor atoms
    if remaining.starts_with(is_symbol_char) {
        return Err(error_at(input, ErrorKind::Digit));
    }

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((remaining, Value::Number(n))),
        Err(_) => Err(failure_at(input, ErrorKind::MapRes)),
    }
}

/// Parse an atom; `#t` and `#f` collapse to booleans
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, name) =
        recognize(pair(satisfy(is_symbol_start), take_while(is_symbol_char))).parse(input)?;

    let atom = match name {
        "#t" => Value::Bool(true),
        "#f" => Value::Bool(false),
        _ => Value::Atom(name.to_owned()),
    };
    Ok((remaining, atom))
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Value::String(chars)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => return Err(failure_at(remaining, ErrorKind::Escaped)),
                    None => return Err(failure_at(input, ErrorKind::Eof)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(failure_at(input, ErrorKind::Eof)),
        }
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quoted(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_expr(input, config, depth + 1)?;
    Ok((input, Value::List(vec![Value::Atom("quote".into()), expr])))
}

/// ` . expr` closing a dotted list, after its head elements
fn parse_dotted_tail(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = separator(input, config)?;
    let (input, _) = char('.').parse(input)?;
    let (input, _) = skip_space(input, config)?;
    parse_expr(input, config, depth + 1)
}

/// Parse a proper or dotted list.
///
/// Both forms share the `(expr expr ...` prefix, so the elements are read once and the
/// optional `. expr` tail decides the form. An empty head list cannot take a tail.
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = skip_space(input, config)?;
    let (input, heads) = separated_list0(
        |input| separator(input, config),
        |input| parse_expr(input, config, depth + 1),
    )
    .parse(input)?;
    let (input, tail) = if heads.is_empty() {
        (input, None)
    } else {
        opt(|input| parse_dotted_tail(input, config, depth)).parse(input)?
    };
    let (input, _) = skip_space(input, config)?;

    // A list can only end here; there is nothing to backtrack into
    let (input, _) = char(')')
        .parse(input)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| failure_at(input, ErrorKind::Char))?;

    let list = match tail {
        Some(tail) => Value::DottedList(heads, Box::new(tail)),
        None => Value::List(heads),
    };
    Ok((input, list))
}

/// Parse one expression starting exactly at `input`
fn parse_expr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= config.max_depth {
        return Err(failure_at(input, ErrorKind::TooLarge));
    }
    match input.chars().next() {
        Some('(') => parse_list(input, config, depth),
        Some('\'') => parse_quoted(input, config, depth),
        Some('"') => parse_string(input),
        _ => alt((parse_number, parse_atom)).parse(input),
    }
}

/// Parse exactly one expression, surrounded by optional whitespace
pub fn read(input: &str) -> Result<Value, Error> {
    read_with_config(input, ParseConfig::default())
}

/// Parse a whole program: zero or more whitespace-separated expressions
pub fn read_all(input: &str) -> Result<Vec<Value>, Error> {
    read_all_with_config(input, ParseConfig::default())
}

pub fn read_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let to_error = |e| Error::ParseError(parse_error_to_message(input, e, config));

    let (rest, _) = skip_space(input, config).map_err(to_error)?;
    let (rest, value) = parse_expr(rest, config, 0).map_err(to_error)?;
    let (rest, _) = skip_space(rest, config).map_err(to_error)?;

    if rest.is_empty() {
        Ok(value)
    } else {
        let offset = input.len() - rest.len();
        Err(Error::ParseError(format!(
            "Unexpected remaining input '{}' at {}",
            rest.chars().take(10).collect::<String>(),
            describe_position(input, offset)
        )))
    }
}

pub fn read_all_with_config(input: &str, config: ParseConfig) -> Result<Vec<Value>, Error> {
    let to_error = |e| Error::ParseError(parse_error_to_message(input, e, config));

    let (mut rest, _) = skip_space(input, config).map_err(to_error)?;
    let mut values = Vec::new();
    while !rest.is_empty() {
        let (after, value) = parse_expr(rest, config, 0).map_err(to_error)?;
        let (after, _) = skip_space(after, config).map_err(to_error)?;
        values.push(value);
        rest = after;
    }
    Ok(values)
}
