use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::{many0, separated_list0},
    sequence::{pair, preceded, terminated},
};

use crate::MAX_PARSE_DEPTH;
use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol, sym};
use crate::{Error, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Strip `;` line comments (outside string literals) before reading
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                _ if position >= input.len() => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                ErrorKind::Char => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Expected character at position {position}"),
                ),
                ErrorKind::Tag => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Unexpected token at position {position}"),
                ),
                _ => {
                    let remaining_chars: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining_chars}'"),
                    )
                }
            };
            ParseError::with_context(kind, message, input, position)
        }
        nom::Err::Incomplete(_) => {
            ParseError::new(ParseErrorKind::Incomplete, "Incomplete input", None)
        }
    }
}

/// Parse a number (integer only, supports decimal and hexadecimal)
fn parse_number(input: &str) -> IResult<&str, Value> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

/// Parse a decimal number
fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let (input, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((input, Value::Number(n))),
        // Overflow; symbol parsing rejects a leading digit anyway
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('#').parse(input)?;
    let (input, _) = alt((char('x'), char('X'))).parse(input)?;
    let (input, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(input)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((input, Value::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Bool(true), tag("#t")),
        value(Value::Bool(false), tag("#f")),
    ))
    .parse(input)
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let mut symbol_chars =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c));

    let (remaining, candidate) = symbol_chars.parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((remaining, Value::Symbol(candidate.into())))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )))
    }
}

/// Parse a string literal
///
/// Once the opening quote is seen, failures are fatal so the error points into
/// the literal instead of back at its start.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    // Unknown escape, or a backslash at the very end
                    Some(_) | None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Escaped,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                // Reached end of input without finding closing quote
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parse a list; after the opening parenthesis, failures are fatal
fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    let (input, elements) =
        separated_list0(multispace1, |input| parse_sexpr(input, depth + 1)).parse(input)?;

    let (input, _) = cut((multispace0, char(')'))).parse(input)?;

    Ok((input, Value::List(elements)))
}

/// Parse an S-expression
fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    preceded(
        multispace0,
        alt((
            |input| parse_quote(input, depth),
            |input| parse_list(input, depth),
            parse_number,
            parse_bool,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, depth + 1)?;
    Ok((input, Value::List(vec![sym("quote"), expr])))
}

/// Parse exactly one S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    match terminated(|input| parse_sexpr(input, 0), multispace0).parse(input) {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => Err(Error::ParseError(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{remaining}'"),
            input,
            input.len() - remaining.len(),
        ))),
        Err(e) => Err(Error::ParseError(parse_error_from_nom(input, e))),
    }
}

/// Parse a sequence of S-expressions (a script, or one line of REPL input).
///
/// Empty input (or input holding only whitespace and comments) yields no items.
pub fn parse_program(input: &str, config: &ParseConfig) -> Result<Vec<Value>, Error> {
    let stripped;
    let source = if config.handle_comments {
        stripped = strip_comments(input);
        stripped.as_str()
    } else {
        input
    };

    match terminated(many0(|input| parse_sexpr(input, 0)), multispace0).parse(source) {
        Ok(("", items)) => Ok(items),
        Ok((remaining, _)) => {
            // `many0` stops quietly at the first bad item; re-read it for the real error
            let offset = source.len() - remaining.len();
            Err(Error::ParseError(match parse_sexpr(remaining, 0) {
                Err(e) => {
                    let mut err = parse_error_from_nom(remaining, e);
                    if err.kind != ParseErrorKind::Incomplete {
                        err = ParseError::with_context(err.kind, err.message, source, offset);
                    }
                    err
                }
                Ok(_) => ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("Unexpected input: '{}'", remaining.trim()),
                    source,
                    offset,
                ),
            }))
        }
        Err(e) => Err(Error::ParseError(parse_error_from_nom(source, e))),
    }
}

/// Remove `;` comments up to end of line, leaving string literals untouched
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;

    for ch in input.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
                out.push(ch);
            }
            continue;
        }
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            ';' => in_comment = true,
            '"' => {
                in_string = true;
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
