//! Console commands and their parser.

use crate::debugger::Oid;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::sequence::{delimited, preceded, separated_pair};
use nom::IResult;

pub const STEP_OVER_COMMAND: &str = "next";
pub const STEP_OVER_COMMAND_SHORT: &str = "n";
pub const STEP_INTO_COMMAND: &str = "step";
pub const STEP_INTO_COMMAND_SHORT: &str = "s";
pub const CONTINUE_COMMAND: &str = "continue";
pub const CONTINUE_COMMAND_SHORT: &str = "c";
pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const DELETE_COMMAND: &str = "delete";
pub const DELETE_COMMAND_SHORT: &str = "d";
pub const BREAKPOINTS_COMMAND: &str = "breakpoints";
pub const BREAKPOINTS_COMMAND_SHORT: &str = "bl";
pub const BACKTRACE_COMMAND: &str = "backtrace";
pub const BACKTRACE_COMMAND_SHORT: &str = "bt";
pub const SOURCE_COMMAND: &str = "source";
pub const SOURCE_COMMAND_SHORT: &str = "l";
pub const VARS_COMMAND: &str = "vars";
pub const ARGS_COMMAND: &str = "args";
pub const WHERE_COMMAND: &str = "where";
pub const ABORT_COMMAND: &str = "abort";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";
pub const QUIT_COMMAND: &str = "quit";
pub const QUIT_COMMAND_SHORT: &str = "q";

/// Place of a breakpoint, lines are 1-based lines of the routine definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointPlace {
    /// Line of the current routine.
    Line(usize),
    /// Line of a routine given by oid.
    RoutineLine(Oid, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StepOver,
    StepInto,
    Continue,
    Break(BreakpointPlace),
    Delete(BreakpointPlace),
    Breakpoints,
    Backtrace,
    Source(Option<usize>),
    Vars,
    Args,
    Where,
    Abort,
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("malformed command `{0}` (try `help`)")]
pub struct ParseError(pub String);

fn keyword<'a>(full: &'static str, short: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    alt((tag(full), tag(short)))
}

fn number<T: std::str::FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |s: &str| s.parse::<T>())(input)
}

fn place(input: &str) -> IResult<&str, BreakpointPlace> {
    alt((
        map(
            separated_pair(number::<Oid>, char(':'), number::<usize>),
            |(oid, line)| BreakpointPlace::RoutineLine(oid, line),
        ),
        map(number::<usize>, BreakpointPlace::Line),
    ))(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((
        map(
            preceded(keyword(BREAKPOINTS_COMMAND, BREAKPOINTS_COMMAND_SHORT), multispace0),
            |_| Command::Breakpoints,
        ),
        map(
            preceded(
                keyword(BREAK_COMMAND, BREAK_COMMAND_SHORT),
                preceded(multispace1, place),
            ),
            Command::Break,
        ),
        map(
            preceded(
                keyword(DELETE_COMMAND, DELETE_COMMAND_SHORT),
                preceded(multispace1, place),
            ),
            Command::Delete,
        ),
        map(
            preceded(
                keyword(SOURCE_COMMAND, SOURCE_COMMAND_SHORT),
                opt(preceded(multispace1, number::<usize>)),
            ),
            Command::Source,
        ),
        value(Command::StepOver, keyword(STEP_OVER_COMMAND, STEP_OVER_COMMAND_SHORT)),
        value(Command::StepInto, keyword(STEP_INTO_COMMAND, STEP_INTO_COMMAND_SHORT)),
        value(Command::Continue, keyword(CONTINUE_COMMAND, CONTINUE_COMMAND_SHORT)),
        value(Command::Backtrace, keyword(BACKTRACE_COMMAND, BACKTRACE_COMMAND_SHORT)),
        value(Command::Vars, tag(VARS_COMMAND)),
        value(Command::Args, tag(ARGS_COMMAND)),
        value(Command::Where, tag(WHERE_COMMAND)),
        value(Command::Abort, tag(ABORT_COMMAND)),
        value(Command::Help, keyword(HELP_COMMAND, HELP_COMMAND_SHORT)),
        value(Command::Quit, keyword(QUIT_COMMAND, QUIT_COMMAND_SHORT)),
    ))(input)
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        all_consuming(delimited(multispace0, command, multispace0))(input)
            .map(|(_, cmd)| cmd)
            .map_err(|_| ParseError(input.trim().to_string()))
    }
}
