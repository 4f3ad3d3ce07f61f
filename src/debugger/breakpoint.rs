use crate::debugger::error::Error;
use crate::debugger::source::RoutineDescriptor;
use crate::debugger::Oid;
use std::fmt::{Display, Formatter};

/// Line breakpoint as known by the remote debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub oid: Oid,
    /// Line relative to the routine body.
    pub line: i32,
    pub target_name: String,
}

impl Breakpoint {
    /// Build a breakpoint from a 0-based line of the routine definition.
    pub fn at_absolute_line(routine: &RoutineDescriptor, absolute: usize) -> Result<Self, Error> {
        let out_of_range = || Error::SourceLineOutOfRange {
            oid: routine.oid(),
            line: absolute as i64,
            lines: routine.line_count(),
        };
        if absolute >= routine.line_count() {
            return Err(out_of_range());
        }
        let line = i32::try_from(routine.relative_line(absolute as i64))
            .ok()
            .filter(|line| *line > 0)
            .ok_or_else(out_of_range)?;

        Ok(Self {
            oid: routine.oid(),
            line,
            target_name: routine.name().to_string(),
        })
    }

    /// 0-based line of the routine definition.
    pub fn absolute_line(&self, routine: &RoutineDescriptor) -> i64 {
        routine.absolute_line(self.line)
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) line {}", self.target_name, self.oid, self.line)
    }
}

/// Host side of breakpoint management.
///
/// Lines are 0-based lines of the routine definition, as a user sees them.
pub trait BreakpointSink {
    fn register(&self, oid: Oid, absolute_line: usize) -> Result<Breakpoint, Error>;

    fn unregister(&self, oid: Oid, absolute_line: usize) -> Result<bool, Error>;
}
