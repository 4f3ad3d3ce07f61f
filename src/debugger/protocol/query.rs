//! Call templates of the `pldbgapi` remote surface.

use crate::debugger::error::Error;
use strum_macros::{Display, EnumIter};

const PLACEHOLDER: &str = "%s";

const ATTACH_TO_PORT: &str = "pldbg_attach_to_port(%s)";
const CREATE_LISTENER: &str = "pldbg_create_listener()";
const WAIT_FOR_TARGET: &str = "pldbg_wait_for_target(%s)";
const OID_DEBUG: &str = "plpgsql_oid_debug(%s)";
const STEP_OVER: &str = "pldbg_step_over(%s)";
const STEP_INTO: &str = "pldbg_step_into(%s)";
const CONTINUE: &str = "pldbg_continue(%s)";
const ABORT_TARGET: &str = "pldbg_abort_target(%s)";
const GET_BREAKPOINTS: &str = "pldbg_get_breakpoints(%s)";
const SET_GLOBAL_BREAKPOINT: &str = "pldbg_set_global_breakpoint(%s, %s, -1, NULL)";
const SET_BREAKPOINT: &str = "pldbg_set_breakpoint(%s, %s, %s)";
const DROP_BREAKPOINT: &str = "pldbg_drop_breakpoint(%s, %s, %s)";

const GET_STACK: &str = "(SELECT
    frame.level,
    frame.targetname,
    frame.func,
    frame.linenumber,
    frame.args,
    md5(pg_catalog.pg_get_functiondef(frame.func))
FROM pldbg_get_stack(%s) frame) stack";

const GET_VARIABLES: &str = "(SELECT
    name,
    varclass,
    linenumber,
    isunique,
    isconst,
    isnotnull,
    dtype,
    value,
    (SELECT t.typname FROM pg_catalog.pg_type t WHERE t.oid = dtype LIMIT 1) AS typname
FROM pldbg_get_variables(%s)) variable";

const GET_ROUTINE_SOURCE: &str = "(SELECT
    t_proc.oid,
    t_namespace.nspname,
    t_proc.proname,
    pg_catalog.pg_get_function_arguments(t_proc.oid),
    pg_catalog.pg_get_functiondef(t_proc.oid),
    t_proc.prosrc,
    md5(pg_catalog.pg_get_functiondef(t_proc.oid))
FROM pg_catalog.pg_proc t_proc
JOIN pg_catalog.pg_namespace t_namespace ON t_proc.pronamespace = t_namespace.oid
WHERE t_proc.oid = %s) info";

const SEARCH_ROUTINES: &str = "(SELECT
    t_proc.oid,
    t_namespace.nspname,
    t_proc.proname,
    pg_catalog.pg_get_function_arguments(t_proc.oid),
    pg_catalog.pg_get_functiondef(t_proc.oid),
    t_proc.prosrc,
    md5(pg_catalog.pg_get_functiondef(t_proc.oid))
FROM pg_catalog.pg_proc t_proc
JOIN pg_catalog.pg_namespace t_namespace ON t_proc.pronamespace = t_namespace.oid
WHERE t_namespace.nspname = %s
AND t_proc.proname = %s
ORDER BY t_proc.oid) info";

const GET_EXTENSIONS: &str = "(SELECT
    t_namespace.nspname,
    t_extension.extname,
    t_extension.extversion
FROM pg_catalog.pg_extension t_extension
JOIN pg_catalog.pg_namespace t_namespace ON t_extension.extnamespace = t_namespace.oid) extension";

/// Remote operations known by the protocol adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    AttachToPort,
    CreateListener,
    WaitForTarget,
    DebugByRoutineId,
    StepOver,
    StepInto,
    Resume,
    AbortTarget,
    GetStack,
    GetVariables,
    GetRoutineSource,
    SearchRoutines,
    SetGlobalBreakpoint,
    SetBreakpoint,
    DropBreakpoint,
    ListBreakpoints,
    ListExtensions,
}

impl Operation {
    pub fn template(self) -> &'static str {
        match self {
            Operation::AttachToPort => ATTACH_TO_PORT,
            Operation::CreateListener => CREATE_LISTENER,
            Operation::WaitForTarget => WAIT_FOR_TARGET,
            Operation::DebugByRoutineId => OID_DEBUG,
            Operation::StepOver => STEP_OVER,
            Operation::StepInto => STEP_INTO,
            Operation::Resume => CONTINUE,
            Operation::AbortTarget => ABORT_TARGET,
            Operation::GetStack => GET_STACK,
            Operation::GetVariables => GET_VARIABLES,
            Operation::GetRoutineSource => GET_ROUTINE_SOURCE,
            Operation::SearchRoutines => SEARCH_ROUTINES,
            Operation::SetGlobalBreakpoint => SET_GLOBAL_BREAKPOINT,
            Operation::SetBreakpoint => SET_BREAKPOINT,
            Operation::DropBreakpoint => DROP_BREAKPOINT,
            Operation::ListBreakpoints => GET_BREAKPOINTS,
            Operation::ListExtensions => GET_EXTENSIONS,
        }
    }

    /// Message used when a single-row operation produced no rows.
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::AttachToPort | Operation::CreateListener | Operation::WaitForTarget => {
                "listener/attach failed"
            }
            Operation::DebugByRoutineId => "debug activation failed",
            Operation::StepOver | Operation::StepInto | Operation::Resume => {
                "unable to get step result"
            }
            Operation::GetStack => "unable to get stack",
            Operation::GetRoutineSource | Operation::SearchRoutines => "routine not found",
            Operation::AbortTarget
            | Operation::SetGlobalBreakpoint
            | Operation::SetBreakpoint
            | Operation::DropBreakpoint => "no acknowledgement",
            Operation::GetVariables | Operation::ListBreakpoints | Operation::ListExtensions => {
                "unexpected result"
            }
        }
    }
}

/// Argument of a call template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl Arg {
    fn render(&self, op: Operation) -> Result<String, Error> {
        match self {
            Arg::Int(v) => Ok(v.to_string()),
            Arg::Text(v) if v.contains('\0') => Err(Error::InvalidArgument {
                op,
                arg: v.replace('\0', "\\0"),
            }),
            Arg::Text(v) => Ok(format!("'{}'", v.replace('\'', "''"))),
        }
    }
}

/// Build the statement for `op`: `SELECT * FROM <template>` with every
/// placeholder replaced by the next rendered argument.
pub fn render(op: Operation, args: &[Arg]) -> Result<String, Error> {
    let template = op.template();
    let expected = template.matches(PLACEHOLDER).count();
    if expected != args.len() {
        return Err(Error::InvalidArgument {
            op,
            arg: format!("expected {expected} arguments, got {}", args.len()),
        });
    }

    let mut parts = template.split(PLACEHOLDER);
    let mut sql = String::from("SELECT * FROM ");
    sql.push_str(parts.next().unwrap_or_default());
    for (arg, part) in args.iter().zip(parts) {
        sql.push_str(&arg.render(op)?);
        sql.push_str(part);
    }
    sql.push(';');
    Ok(sql)
}
