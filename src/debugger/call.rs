//! Call-site analysis of SQL statements.
//!
//! A debug session usually starts from a statement calling a routine, like
//! `SELECT billing.calc(1, 'a');`. [`CallSite::parse`] extracts the routine name
//! and the literal arguments of such a call. [`parse_break_notice`] extracts the
//! listener port from the `PLDBGBREAK` notice a target backend emits once it
//! waits for a debugger.

use crate::debugger::error::Error;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case};
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0, multispace1};
use nom::combinator::{eof, map, opt, recognize, value};
use nom::multi::{many0, many0_count, many1, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, terminated, tuple};
use nom::IResult;
use once_cell::sync::Lazy;
use regex::Regex;
use strum_macros::Display;

/// Statement keyword of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CallVerb {
    Select,
    Call,
    Perform,
}

/// Routine call found in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub verb: CallVerb,
    /// Routine name as written, possibly schema qualified.
    pub routine: String,
    /// Argument expressions as written, trimmed.
    pub args: Vec<String>,
}

fn verb(input: &str) -> IResult<&str, CallVerb> {
    alt((
        value(CallVerb::Select, tag_no_case("select")),
        value(CallVerb::Call, tag_no_case("call")),
        value(CallVerb::Perform, tag_no_case("perform")),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(char('"'), is_not("\""), char('"'))),
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_"), tag("$")))),
        )),
    ))(input)
}

fn qualified_name(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), identifier))(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(alt((is_not("'"), tag("''")))),
        char('\''),
    ))(input)
}

fn parenthesized(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('('),
        many0(alt((string_literal, parenthesized, is_not("'()")))),
        char(')'),
    ))(input)
}

fn argument(input: &str) -> IResult<&str, &str> {
    recognize(many1(alt((string_literal, parenthesized, is_not("',()")))))(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<String>> {
    map(
        delimited(char('('), separated_list0(char(','), argument), char(')')),
        |args: Vec<&str>| {
            let args: Vec<String> = args.iter().map(|a| a.trim().to_string()).collect();
            if args.len() == 1 && args[0].is_empty() {
                return vec![];
            }
            args
        },
    )(input)
}

fn call_site(input: &str) -> IResult<&str, CallSite> {
    map(
        terminated(
            tuple((
                delimited(multispace0, verb, multispace1),
                qualified_name,
                delimited(multispace0, arguments, multispace0),
            )),
            tuple((opt(char(';')), multispace0, eof)),
        ),
        |(verb, routine, args)| CallSite {
            verb,
            routine: routine.to_string(),
            args,
        },
    )(input)
}

impl CallSite {
    /// Parse a statement calling a single routine.
    pub fn parse(sql: &str) -> Result<Self, Error> {
        call_site(sql)
            .map(|(_, call)| call)
            .map_err(|_| Error::CallSite(sql.trim().to_string()))
    }
}

static BREAK_NOTICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PLDBGBREAK:([0-9]+)").expect("valid regex"));

/// Extract the listener port from a `PLDBGBREAK:<port>` notice.
pub fn parse_break_notice(message: &str) -> Option<i64> {
    BREAK_NOTICE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|port| port.as_str().parse().ok())
}
