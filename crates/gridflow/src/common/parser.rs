use std::fmt::{Debug, Display, Formatter};

use nom::character::complete::{multispace0, satisfy};
use nom::combinator::recognize;
use nom::error::{ErrorKind, FromExternalError, ParseError};
use nom::multi::many0;
use nom::sequence::{delimited, pair};
use nom::{AsChar, IResult, Parser};

pub enum ParserError<I> {
    Custom(anyhow::Error),
    Nom(I, ErrorKind),
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(error) => f.write_fmt(format_args!("Semantic error at {}", error)),
            Self::Nom(input, error) => f.write_fmt(format_args!(
                "Parser error at '{:?}': expecting {:?}",
                input, error
            )),
        }
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I: Display, E: Into<anyhow::Error>> FromExternalError<I, E> for ParserError<I> {
    fn from_external_error(input: I, _: ErrorKind, error: E) -> Self {
        ParserError::Custom(anyhow::anyhow!("'{}': {}", input, error.into()))
    }
}

pub fn format_parse_error<I: Debug>(error: nom::Err<ParserError<I>>) -> anyhow::Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => anyhow::anyhow!("{:?}", e),
        _ => anyhow::anyhow!(error.to_string()),
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn p_ident(input: &str) -> NomResult<&str> {
    recognize(pair(
        satisfy(|c| c.is_alpha() || c == '_'),
        many0(satisfy(|c| c.is_alphanum() || c == '_')),
    ))(input)
}

/// Runs `parser` with surrounding whitespace discarded.
pub fn ws<'a, Ret>(
    parser: impl Parser<&'a str, Ret, ParserError<&'a str>>,
) -> impl FnMut(&'a str) -> NomResult<'a, Ret> {
    let mut parser = delimited(multispace0, parser, multispace0);
    move |input| parser.parse(input)
}

pub fn p_number(input: &str) -> NomResult<f64> {
    nom::number::complete::double(input)
}

#[cfg(test)]
mod tests {
    use super::{p_ident, p_number};
    use nom::combinator::all_consuming;

    #[test]
    fn test_parse_ident() {
        assert_eq!(all_consuming(p_ident)("x").unwrap().1, "x");
        assert_eq!(all_consuming(p_ident)("loop_count2").unwrap().1, "loop_count2");
        assert!(all_consuming(p_ident)("2fast").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(all_consuming(p_number)("10").unwrap().1, 10.0);
        assert_eq!(all_consuming(p_number)("-1.5").unwrap().1, -1.5);
    }
}
