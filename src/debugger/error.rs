use crate::debugger::protocol::connection::TransportError;
use crate::debugger::protocol::query::Operation;
use crate::debugger::Oid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- command errors --------------------------------------------
    #[error("{0}: {msg}", msg = .0.failure_message())]
    UnexpectedRowCount(Operation),
    #[error("{op}: invalid column {column}: {reason}")]
    Decode {
        op: Operation,
        column: usize,
        reason: String,
    },
    #[error("{op}: invalid argument {arg}")]
    InvalidArgument { op: Operation, arg: String },
    #[error("{op}: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: TransportError,
    },

    // --------------------------------- resolution errors -----------------------------------------
    #[error("routine not found for id {0}")]
    RoutineNotFound(Oid),
    #[error("routine not found for {0}")]
    RoutineNameNotFound(String),
    #[error("unable to align source of routine {0}: body not found in definition")]
    SourceAlignment(Oid),
    #[error("line {line} is out of source of routine {oid} ({lines} lines)")]
    SourceLineOutOfRange { oid: Oid, line: i64, lines: usize },
    #[error("not a routine call: {0}")]
    CallSite(String),

    // --------------------------------- session errors --------------------------------------------
    #[error("debug session construction failed: {0}")]
    SessionConstruction(#[source] Box<Error>),
    #[error("debug activation failed with code {0}")]
    ActivationFailed(i64),
    #[error("debug session already finished")]
    SessionFinished,
    #[error("extension `{0}` is not installed")]
    ExtensionMissing(&'static str),
    #[error("unable to interrupt remote call: {0}")]
    Cancellation(#[source] TransportError),
    #[error("target statement failed: {0}")]
    Statement(#[source] TransportError),
    #[error("routine {0} did not stop at the debugger, no port announced")]
    BreakNotReached(Oid),

    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Return a hint to a session - continue debugging after error or stop whole session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::UnexpectedRowCount(_) => false,
            Error::Decode { .. } => false,
            Error::InvalidArgument { .. } => false,
            Error::RoutineNotFound(_) => false,
            Error::RoutineNameNotFound(_) => false,
            Error::SourceAlignment(_) => false,
            Error::SourceLineOutOfRange { .. } => false,
            Error::CallSite(_) => false,
            Error::ActivationFailed(_) => false,
            Error::ExtensionMissing(_) => false,
            Error::BreakNotReached(_) => false,
            Error::IO(_) => false,
            Error::Config(_) => false,

            // remote session state is unknown after these
            Error::Transport { source, .. } => source.is_connection_level(),
            Error::Statement(source) => source.is_connection_level(),
            Error::SessionConstruction(_) => true,
            Error::SessionFinished => true,
            Error::Cancellation(_) => true,
        }
    }

    /// Return true if the error comes from a remote call that did not produce a usable result.
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedRowCount(_)
                | Error::Decode { .. }
                | Error::InvalidArgument { .. }
                | Error::Transport { .. }
        ) || self.is_resolution_error()
    }

    /// Return true if a routine (or its source position) can not be resolved.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::RoutineNotFound(_)
                | Error::RoutineNameNotFound(_)
                | Error::SourceAlignment(_)
                | Error::SourceLineOutOfRange { .. }
                | Error::CallSite(_)
        )
    }

    /// Return the remote operation that caused this error, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::UnexpectedRowCount(op) => Some(*op),
            Error::Decode { op, .. } => Some(*op),
            Error::InvalidArgument { op, .. } => Some(*op),
            Error::Transport { op, .. } => Some(*op),
            Error::SessionConstruction(e) => e.operation(),
            _ => None,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
