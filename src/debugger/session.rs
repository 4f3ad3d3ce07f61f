//! Session worker: one remote debug session driven by one dedicated thread.
//!
//! Every remote call of a session goes through a FIFO queue processed by the
//! worker thread, so calls on the session connection never overlap. A step task
//! issues one step call and then rebuilds the current [`StackSnapshot`]:
//!
//! ```text
//!   step/continue -> get stack -> resolve routine source -> get variables -> snapshot
//! ```
//!
//! Snapshots and errors are delivered to a [`SessionObserver`] on the worker
//! thread. [`ChannelObserver`] forwards them into a channel for a UI thread.

use crate::debugger::breakpoint::{Breakpoint, BreakpointSink};
use crate::debugger::error::Error;
use crate::debugger::protocol::connection::{Canceller, Connection};
use crate::debugger::protocol::{Client, SessionHandle};
use crate::debugger::resolver::{Resolver, RoutineCache};
use crate::debugger::snapshot::{StackFrame, StackSnapshot};
use crate::debugger::Oid;
use crate::muted_error;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use strum_macros::Display;

/// Lifecycle of a session worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Attaching,
    Ready,
    Busy,
    Finished,
}

/// Unit of work processed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Task {
    StepOver,
    StepInto,
    Resume,
    /// Current state request while the session runs, exit request once it is finished.
    End,
}

/// Receiver of session results. Called on the worker thread.
pub trait SessionObserver: Send + 'static {
    fn on_snapshot(&mut self, task: Task, snapshot: StackSnapshot);

    fn on_error(&mut self, _task: Task, _error: &Error) {}

    fn on_finish(&mut self) {}
}

/// Event forwarded by a [`ChannelObserver`].
#[derive(Debug)]
pub enum SessionEvent {
    Snapshot(Task, StackSnapshot),
    Error {
        task: Task,
        message: String,
        fatal: bool,
    },
    Finished,
}

/// Observer forwarding every notification into a channel.
pub struct ChannelObserver(Sender<SessionEvent>);

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self(tx), rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn on_snapshot(&mut self, task: Task, snapshot: StackSnapshot) {
        _ = self.0.send(SessionEvent::Snapshot(task, snapshot));
    }

    fn on_error(&mut self, task: Task, error: &Error) {
        _ = self.0.send(SessionEvent::Error {
            task,
            message: format!("{error:#}"),
            fatal: error.is_fatal(),
        });
    }

    fn on_finish(&mut self) {
        _ = self.0.send(SessionEvent::Finished);
    }
}

type Reply<T> = SyncSender<Result<T, Error>>;

enum Request {
    Task(Task),
    Register {
        oid: Oid,
        absolute_line: usize,
        reply: Reply<Breakpoint>,
    },
    Unregister {
        oid: Oid,
        absolute_line: usize,
        reply: Reply<bool>,
    },
    Breakpoints(Reply<Vec<Breakpoint>>),
    Frames(Reply<Vec<StackFrame>>),
    Abort(Reply<bool>),
}

/// State shared between the worker thread and its controllers.
struct Shared {
    state: Mutex<SessionState>,
    canceller: Box<dyn Canceller>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn is_finished(&self) -> bool {
        self.state() == SessionState::Finished
    }

    /// Move into `state` unless the session is finished. Return false if it is.
    fn transition(&self, state: SessionState) -> bool {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == SessionState::Finished {
            return false;
        }
        *current = state;
        true
    }

    /// Move into [`SessionState::Finished`]. Return false if already there.
    fn finish(&self) -> bool {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == SessionState::Finished {
            return false;
        }
        *current = SessionState::Finished;
        true
    }
}

/// Cloneable handle able to enqueue tasks and finish a session from any thread,
/// including observer callbacks.
#[derive(Clone)]
pub struct SessionControl {
    session: SessionHandle,
    shared: Arc<Shared>,
    tx: Sender<Request>,
}

impl SessionControl {
    pub fn session(&self) -> SessionHandle {
        self.session
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Enqueue a task, never blocks.
    pub fn enqueue(&self, task: Task) -> Result<(), Error> {
        if self.shared.is_finished() {
            return Err(Error::SessionFinished);
        }
        self.tx
            .send(Request::Task(task))
            .map_err(|_| Error::SessionFinished)
    }

    /// Stop the session: wake the worker and interrupt an in-flight remote call.
    /// Calling it again has no effect.
    pub fn finish(&self) -> Result<(), Error> {
        if !self.shared.finish() {
            return Ok(());
        }
        log::info!(target: "session", "finish session {}", self.session);
        _ = self.tx.send(Request::Task(Task::End));
        self.shared.canceller.cancel().map_err(Error::Cancellation)
    }

    fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T, Error> {
        if self.shared.is_finished() {
            return Err(Error::SessionFinished);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.tx
            .send(request(tx))
            .map_err(|_| Error::SessionFinished)?;
        rx.recv().map_err(|_| Error::SessionFinished)?
    }
}

/// Owner of one attached debug session and its worker thread.
///
/// Dropping the worker finishes the session and waits for the worker thread.
pub struct SessionWorker {
    control: SessionControl,
    cache: RoutineCache,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionWorker {
    /// Attach to a target backend waiting on `port` (see `PLDBGBREAK` notices).
    ///
    /// # Errors
    ///
    /// [`Error::SessionConstruction`] if the attach call fails, no worker is started then.
    pub fn attach<C: Connection>(
        conn: C,
        port: i64,
        observer: impl SessionObserver,
    ) -> Result<Self, Error> {
        Self::start(Client::new(conn), observer, move |client| {
            client.attach_to_port(port)
        })
    }

    /// Wait until any backend calls routine `oid` and attach to it.
    ///
    /// Blocks the calling thread until a target appears.
    pub fn wait_for_routine<C: Connection>(
        conn: C,
        oid: Oid,
        observer: impl SessionObserver,
    ) -> Result<Self, Error> {
        Self::start(Client::new(conn), observer, move |client| {
            let listener = client.create_listener()?;
            client.set_global_breakpoint(listener, oid)?;
            log::info!(target: "session", "listener {listener} waits for routine {oid}");
            let target = client.wait_for_target(listener)?;
            log::info!(target: "session", "backend {target} reached routine {oid}");
            Ok(listener)
        })
    }

    fn start<C: Connection>(
        mut client: Client<C>,
        observer: impl SessionObserver,
        open: impl FnOnce(&mut Client<C>) -> Result<SessionHandle, Error>,
    ) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Idle),
            canceller: client.canceller(),
        });

        shared.set_state(SessionState::Attaching);
        let session = match open(&mut client) {
            Ok(session) => session,
            Err(e) => {
                shared.set_state(SessionState::Finished);
                muted_error!(client.close(), "close connection:");
                return Err(Error::SessionConstruction(Box::new(e)));
            }
        };
        shared.set_state(SessionState::Ready);

        let (tx, rx) = mpsc::channel();
        let cache = RoutineCache::default();
        let worker = Worker {
            client,
            session,
            cache: cache.clone(),
            shared: shared.clone(),
            observer: Box::new(observer),
            rx,
        };
        let handle = thread::Builder::new()
            .name(format!("pldbg-session-{session}"))
            .spawn(move || worker.run())
            .map_err(|e| Error::SessionConstruction(Box::new(Error::IO(e))))?;
        log::info!(target: "session", "session {session} attached");

        Ok(Self {
            control: SessionControl {
                session,
                shared,
                tx,
            },
            cache,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn session(&self) -> SessionHandle {
        self.control.session
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Routines resolved by this session so far.
    pub fn cache(&self) -> &RoutineCache {
        &self.cache
    }

    pub fn enqueue(&self, task: Task) -> Result<(), Error> {
        self.control.enqueue(task)
    }

    pub fn step_over(&self) -> Result<(), Error> {
        self.enqueue(Task::StepOver)
    }

    pub fn step_into(&self) -> Result<(), Error> {
        self.enqueue(Task::StepInto)
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.enqueue(Task::Resume)
    }

    /// Request a snapshot of the current position without stepping.
    pub fn refresh(&self) -> Result<(), Error> {
        self.enqueue(Task::End)
    }

    // Synchronous requests wait for the worker and must not be called from
    // observer callbacks.

    pub fn breakpoints(&self) -> Result<Vec<Breakpoint>, Error> {
        self.control.call(Request::Breakpoints)
    }

    /// Whole remote call stack, top frame first.
    pub fn frames(&self) -> Result<Vec<StackFrame>, Error> {
        self.control.call(Request::Frames)
    }

    /// Abort the statement executed by the target backend.
    pub fn abort(&self) -> Result<bool, Error> {
        self.control.call(Request::Abort)
    }

    pub fn finish(&self) -> Result<(), Error> {
        self.control.finish()
    }

    /// Wait until the worker thread exits. Does nothing on the worker thread itself.
    pub fn join(&self) {
        let mut guard = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = guard.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            *guard = Some(handle);
            return;
        }
        drop(guard);

        if handle.join().is_err() {
            log::error!(target: "session", "session {} worker panicked", self.session());
        }
    }
}

impl BreakpointSink for SessionWorker {
    fn register(&self, oid: Oid, absolute_line: usize) -> Result<Breakpoint, Error> {
        self.control.call(|reply| Request::Register {
            oid,
            absolute_line,
            reply,
        })
    }

    fn unregister(&self, oid: Oid, absolute_line: usize) -> Result<bool, Error> {
        self.control.call(|reply| Request::Unregister {
            oid,
            absolute_line,
            reply,
        })
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        muted_error!(self.finish(), "finish session:");
        self.join();
    }
}

struct Worker<C: Connection> {
    client: Client<C>,
    session: SessionHandle,
    cache: RoutineCache,
    shared: Arc<Shared>,
    observer: Box<dyn SessionObserver>,
    rx: Receiver<Request>,
}

impl<C: Connection> Worker<C> {
    fn run(mut self) {
        while let Ok(request) = self.rx.recv() {
            if !self.shared.transition(SessionState::Busy) {
                break;
            }

            let proceed = match request {
                Request::Task(task) => self.handle_task(task),
                Request::Register {
                    oid,
                    absolute_line,
                    reply,
                } => {
                    let result = self.register(oid, absolute_line);
                    self.respond(reply, result)
                }
                Request::Unregister {
                    oid,
                    absolute_line,
                    reply,
                } => {
                    let result = self.unregister(oid, absolute_line);
                    self.respond(reply, result)
                }
                Request::Breakpoints(reply) => {
                    let result = self.client.list_breakpoints(self.session);
                    self.respond(reply, result)
                }
                Request::Frames(reply) => {
                    let result = self.client.get_frames(self.session);
                    self.respond(reply, result)
                }
                Request::Abort(reply) => {
                    let result = self.client.abort_target(self.session);
                    self.respond(reply, result)
                }
            };

            if !proceed || !self.shared.transition(SessionState::Ready) {
                break;
            }
        }

        self.shared.finish();
        muted_error!(self.client.close(), "close connection:");
        log::debug!(target: "session", "session {} worker exits", self.session);
        self.observer.on_finish();
    }

    /// Process a task, return false if the worker must stop.
    fn handle_task(&mut self, task: Task) -> bool {
        log::debug!(target: "session", "session {}: {task}", self.session);
        match self.process(task) {
            Ok(snapshot) => {
                self.observer.on_snapshot(task, snapshot);
                true
            }
            Err(e) if self.shared.is_finished() => {
                log::debug!(target: "session", "session {}: {task} interrupted: {e:#}", self.session);
                false
            }
            Err(e) => {
                let proceed = self.on_failure(&e);
                self.observer.on_error(task, &e);
                proceed
            }
        }
    }

    fn process(&mut self, task: Task) -> Result<StackSnapshot, Error> {
        let session = self.session;
        let step = match task {
            Task::StepOver => Some(self.client.step_over(session)?),
            Task::StepInto => Some(self.client.step_into(session)?),
            Task::Resume => Some(self.client.resume(session)?),
            Task::End => None,
        };
        if let Some(step) = step {
            log::debug!(
                target: "session",
                "session {session}: stopped at {} ({}) line {}",
                step.target_name,
                step.target_oid,
                step.line
            );
        }

        let stack = self.client.get_stack(session)?;
        let routine = Resolver::new(&mut self.client, &self.cache)
            .by_frame(stack.step.target_oid, stack.digest.as_deref())?;
        let variables = self.client.get_variables(session)?;
        StackSnapshot::build(&stack, routine, variables)
    }

    fn register(&mut self, oid: Oid, absolute_line: usize) -> Result<Breakpoint, Error> {
        let routine = Resolver::new(&mut self.client, &self.cache).by_oid(oid)?;
        let breakpoint = Breakpoint::at_absolute_line(&routine, absolute_line)?;
        if !self
            .client
            .set_breakpoint(self.session, breakpoint.oid, breakpoint.line)?
        {
            log::warn!(target: "session", "breakpoint {breakpoint} is not acknowledged");
        }
        Ok(breakpoint)
    }

    fn unregister(&mut self, oid: Oid, absolute_line: usize) -> Result<bool, Error> {
        let routine = Resolver::new(&mut self.client, &self.cache).by_oid(oid)?;
        let breakpoint = Breakpoint::at_absolute_line(&routine, absolute_line)?;
        self.client
            .drop_breakpoint(self.session, breakpoint.oid, breakpoint.line)
    }

    fn respond<T>(&mut self, reply: Reply<T>, result: Result<T, Error>) -> bool {
        let proceed = match &result {
            Ok(_) => true,
            Err(e) => self.on_failure(e),
        };
        _ = reply.send(result);
        proceed
    }

    /// Log a failed request, finish the session on fatal errors.
    /// Return false if the worker must stop.
    fn on_failure(&mut self, error: &Error) -> bool {
        if self.shared.is_finished() {
            log::debug!(target: "session", "session {} interrupted: {error:#}", self.session);
            return false;
        }
        if error.is_fatal() {
            log::error!(target: "session", "session {}: {error:#}", self.session);
            self.shared.finish();
            return false;
        }
        log::warn!(target: "session", "session {}: {error:#}", self.session);
        true
    }
}
