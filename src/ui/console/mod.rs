//! Terminal front-end driving one debug session.

pub mod command;
mod help;
pub mod print;
pub mod view;

use crate::debugger::{
    BreakpointSink, Error, SessionEvent, SessionWorker, StackSnapshot, VariableRecord,
};
use crate::ui::config;
use crate::ui::console::command::{BreakpointPlace, Command, ParseError};
use crate::ui::console::help::HELP;
use crate::ui::console::print::style::{
    ErrorView, KeywordView, LineNumberView, RoutineNameView, TypeNameView,
};
use crate::ui::console::print::ExternalPrinter;
use crate::ui::console::view::render_source;
use crate::weak_error;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::thread;

const WELCOME_TEXT: &str = r#"
pldbg greets, type `help` for the list of commands
"#;
const PROMT: &str = "(pldbg) ";

enum Control {
    /// New command from user received
    Cmd(String),
    /// Terminate application
    Terminate,
}

#[derive(thiserror::Error, Debug)]
enum HandlingError {
    #[error(transparent)]
    Parser(#[from] ParseError),
    #[error(transparent)]
    Debugger(#[from] Error),
    #[error("no current position (try `where`)")]
    NoPosition,
    #[error("line numbers start at 1")]
    ZeroLine,
}

type CurrentSnapshot = Arc<Mutex<Option<StackSnapshot>>>;

pub struct TerminalApplication {
    worker: SessionWorker,
    events: Receiver<SessionEvent>,
    editor: DefaultEditor,
    control_tx: SyncSender<Control>,
    control_rx: Receiver<Control>,
}

pub static HELLO_ONCE: Once = Once::new();

impl TerminalApplication {
    pub fn new(worker: SessionWorker, events: Receiver<SessionEvent>) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = mpsc::sync_channel::<Control>(0);
        Ok(Self {
            worker,
            events,
            editor: DefaultEditor::new()?,
            control_tx,
            control_rx,
        })
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let current: CurrentSnapshot = Arc::default();

        // print session events as they come
        {
            let printer = ExternalPrinter::new(&mut self.editor)?;
            let current = current.clone();
            let control_tx = self.control_tx.clone();
            let events = self.events;
            thread::spawn(move || {
                for event in events {
                    match event {
                        SessionEvent::Snapshot(_, snapshot) => {
                            print_position(&printer, &snapshot);
                            if config::current().show_locals {
                                print_variables(&printer, snapshot.locals());
                            }
                            *current.lock().unwrap_or_else(PoisonError::into_inner) =
                                Some(snapshot);
                        }
                        SessionEvent::Error {
                            task,
                            message,
                            fatal,
                        } => {
                            let kind = if fatal { "fatal error" } else { "error" };
                            printer.print(ErrorView::from(format!("{task}: {kind}: {message}")));
                        }
                        SessionEvent::Finished => {
                            printer.print("session finished");
                            _ = control_tx.send(Control::Terminate);
                            return;
                        }
                    }
                }
            });
        }

        let app_loop = AppLoop {
            worker: self.worker,
            control_rx: self.control_rx,
            printer: ExternalPrinter::new(&mut self.editor)?,
            current,
        };

        let mut editor = self.editor;
        {
            let control_tx = self.control_tx;
            thread::spawn(move || {
                HELLO_ONCE.call_once(|| {
                    println!("{WELCOME_TEXT}");
                });

                loop {
                    match editor.readline(PROMT) {
                        Ok(input) => {
                            if Command::parse(&input) == Ok(Command::Quit) {
                                _ = control_tx.send(Control::Terminate);
                                break;
                            }
                            _ = editor.add_history_entry(&input);
                            if control_tx.send(Control::Cmd(input)).is_err() {
                                break;
                            }
                        }
                        Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                        Err(err) => {
                            println!("error: {:#}", err);
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                    }
                }
            });
        }

        app_loop.run();
        Ok(())
    }
}

fn print_position(printer: &ExternalPrinter, snapshot: &StackSnapshot) {
    printer.print(format!(
        "{} at line {}: {}",
        RoutineNameView::from(snapshot.qualified_name()),
        LineNumberView::from(snapshot.absolute_line() + 1),
        snapshot.line_text().trim(),
    ));
}

fn print_variables(printer: &ExternalPrinter, vars: &[VariableRecord]) {
    for var in vars {
        printer.print(format!(
            "{} {} = {}",
            KeywordView::from(var.name()),
            TypeNameView::from(var.resolved_type_name()),
            var.value()
        ));
    }
}

struct AppLoop {
    worker: SessionWorker,
    control_rx: Receiver<Control>,
    printer: ExternalPrinter,
    current: CurrentSnapshot,
}

impl AppLoop {
    fn snapshot(&self) -> Result<StackSnapshot, HandlingError> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HandlingError::NoPosition)
    }

    /// Return routine oid and 0-based definition line of a breakpoint place.
    fn resolve_place(&self, place: BreakpointPlace) -> Result<(i64, usize), HandlingError> {
        let (oid, line) = match place {
            BreakpointPlace::Line(line) => (self.snapshot()?.routine().oid(), line),
            BreakpointPlace::RoutineLine(oid, line) => (oid, line),
        };
        let line = line.checked_sub(1).ok_or(HandlingError::ZeroLine)?;
        Ok((oid, line))
    }

    fn handle_command(&mut self, cmd: &str) -> Result<(), HandlingError> {
        match Command::parse(cmd)? {
            Command::StepOver => self.worker.step_over()?,
            Command::StepInto => self.worker.step_into()?,
            Command::Continue => self.worker.resume()?,
            Command::Where => self.worker.refresh()?,
            Command::Break(place) => {
                let (oid, line) = self.resolve_place(place)?;
                let bp = self.worker.register(oid, line)?;
                self.printer.print(format!(
                    "New breakpoint at {} line {}",
                    RoutineNameView::from(&bp.target_name),
                    LineNumberView::from(line + 1)
                ));
            }
            Command::Delete(place) => {
                let (oid, line) = self.resolve_place(place)?;
                if self.worker.unregister(oid, line)? {
                    self.printer.print(format!(
                        "Remove breakpoint at line {}",
                        LineNumberView::from(line + 1)
                    ));
                } else {
                    self.printer.print("No breakpoint removed");
                }
            }
            Command::Breakpoints => {
                for bp in self.worker.breakpoints()? {
                    let line = self
                        .worker
                        .cache()
                        .get(bp.oid)
                        .map(|routine| bp.absolute_line(&routine) + 1);
                    self.printer.print(format!(
                        "- Breakpoint {} ({}) at line {}",
                        RoutineNameView::from(&bp.target_name),
                        bp.oid,
                        LineNumberView::from(line),
                    ));
                }
            }
            Command::Backtrace => {
                for frame in self.worker.frames()? {
                    self.printer.print(format!(
                        "#{} {} ({}) line {} {}",
                        frame.level,
                        RoutineNameView::from(&frame.step.target_name),
                        frame.step.target_oid,
                        LineNumberView::from(frame.step.line),
                        frame.args,
                    ));
                }
            }
            Command::Source(bounds) => {
                let snapshot = self.snapshot()?;
                let bounds = bounds.unwrap_or(config::current().context_lines);
                self.printer.print(render_source(&snapshot, bounds));
            }
            Command::Vars => print_variables(&self.printer, self.snapshot()?.locals()),
            Command::Args => print_variables(&self.printer, self.snapshot()?.arguments()),
            Command::Abort => {
                if self.worker.abort()? {
                    self.printer.print("Target statement aborted");
                }
            }
            Command::Help => self.printer.print(HELP),
            Command::Quit => {}
        }

        Ok(())
    }

    fn run(mut self) {
        if let Err(e) = self.worker.refresh() {
            self.printer.print(ErrorView::from(format!("{e:#}")));
        }

        loop {
            let Ok(action) = self.control_rx.recv() else {
                break;
            };

            match action {
                Control::Cmd(command) => {
                    if let Err(e) = self.handle_command(&command) {
                        match e {
                            HandlingError::Debugger(ref err) if err.is_fatal() => {
                                self.printer.print(ErrorView::from("shutdown debugger"));
                                self.printer
                                    .print(ErrorView::from(format!("fatal debugger error: {e:#}")));
                                break;
                            }
                            _ => {
                                self.printer.print(ErrorView::from(format!("{e:#}")));
                            }
                        }
                    }
                }
                Control::Terminate => {
                    break;
                }
            }
        }

        weak_error!(self.worker.finish(), "finish session:");
        self.worker.join();
    }
}
