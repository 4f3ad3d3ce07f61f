//! Stack snapshots built after every processed step.

use crate::debugger::error::Error;
use crate::debugger::source::RoutineDescriptor;
use crate::debugger::variable::{VarClass, VariableRecord};
use crate::debugger::Oid;
use std::sync::Arc;

/// Result of a step operation: where execution stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub target_oid: Oid,
    /// Line relative to the routine body.
    pub line: i32,
    pub target_name: String,
}

/// One frame of the remote call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResult {
    pub level: i32,
    /// Raw textual argument list as reported by the debugger.
    pub args: String,
    /// `md5` of the routine definition at the time of the call.
    pub digest: Option<String>,
    pub step: StepResult,
}

pub type StackFrame = StackResult;

/// Installed server extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub schema: String,
    pub name: String,
    pub version: String,
}

/// Immutable view of the current execution position.
#[derive(Debug, Clone)]
pub struct StackSnapshot {
    level: i32,
    routine: Arc<RoutineDescriptor>,
    absolute_line: usize,
    arguments: Vec<VariableRecord>,
    locals: Vec<VariableRecord>,
    raw_args: String,
}

impl StackSnapshot {
    /// Combine a stack frame, its resolved routine and the visible variables.
    ///
    /// Variables keep the order they were reported in. Variables that are neither
    /// arguments nor locals are dropped.
    ///
    /// # Errors
    ///
    /// [`Error::SourceLineOutOfRange`] if the reported line does not point into
    /// the routine definition.
    pub fn build(
        stack: &StackResult,
        routine: Arc<RoutineDescriptor>,
        variables: Vec<VariableRecord>,
    ) -> Result<Self, Error> {
        let absolute = routine.absolute_line(stack.step.line);
        let lines = routine.line_count();
        let absolute_line = usize::try_from(absolute)
            .ok()
            .filter(|line| *line < lines)
            .ok_or(Error::SourceLineOutOfRange {
                oid: routine.oid(),
                line: absolute,
                lines,
            })?;

        let (arguments, locals): (Vec<_>, Vec<_>) = variables
            .into_iter()
            .filter(|v| matches!(v.class(), VarClass::Argument | VarClass::Local))
            .partition(|v| *v.class() == VarClass::Argument);

        Ok(Self {
            level: stack.level,
            routine,
            absolute_line,
            arguments,
            locals,
            raw_args: stack.args.clone(),
        })
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn routine(&self) -> &Arc<RoutineDescriptor> {
        &self.routine
    }

    /// 0-based line of the routine definition where execution stopped.
    pub fn absolute_line(&self) -> usize {
        self.absolute_line
    }

    pub fn arguments(&self) -> &[VariableRecord] {
        &self.arguments
    }

    pub fn locals(&self) -> &[VariableRecord] {
        &self.locals
    }

    pub fn raw_args(&self) -> &str {
        &self.raw_args
    }

    /// Text of the current line.
    pub fn line_text(&self) -> &str {
        self.routine.line(self.absolute_line).unwrap_or_default()
    }

    pub fn qualified_name(&self) -> String {
        self.routine.qualified_name()
    }
}
