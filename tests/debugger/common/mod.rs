use pldbg::debugger::{
    Canceller, Connection, Error, Row, SessionObserver, StackSnapshot, Task, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub const CALC_OID: i64 = 16384;
pub const CALC_ONE_OID: i64 = 16390;

/// Digests of the fixture definitions as reported by `md5(pg_get_functiondef(..))`.
pub const CALC_DIGEST: &str = "6f1ed002ab5595859014ebf0951522d9";
pub const CALC_ONE_DIGEST: &str = "0cc175b9c0f1b6a831c399e269772661";

pub const CALC_DEFINITION: &str = "CREATE OR REPLACE FUNCTION public.calc(a integer, b integer)
 RETURNS integer
 LANGUAGE plpgsql
AS $function$
DECLARE
    r integer;
BEGIN
    r := a + b;
    RETURN r;
END;
$function$
";
pub const CALC_BODY: &str = "
DECLARE
    r integer;
BEGIN
    r := a + b;
    RETURN r;
END;
";

pub const CALC_ONE_DEFINITION: &str = "CREATE OR REPLACE FUNCTION public.calc(a integer)
 RETURNS integer
 LANGUAGE plpgsql
AS $function$
BEGIN
    RETURN a * 2;
END;
$function$
";
pub const CALC_ONE_BODY: &str = "
BEGIN
    RETURN a * 2;
END;
";

/// Canned reply of a [`ScriptedConnection`].
#[derive(Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    /// Statement failed on the server, connection stays usable.
    Database(String),
    /// Connection broken.
    Closed,
    /// Block until the connection canceller is called, then fail as closed.
    Block,
}

struct Rule {
    pattern: &'static str,
    reply: Reply,
    once: bool,
}

#[derive(Default)]
struct Gate {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// State of a [`ScriptedConnection`] observable from tests.
#[derive(Default)]
pub struct Script {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancellations: AtomicUsize,
    closed: AtomicUsize,
    gate: Gate,
}

impl Script {
    /// Reply to every statement containing `pattern`.
    pub fn on(&self, pattern: &'static str, reply: Reply) -> &Self {
        self.push(pattern, reply, false)
    }

    /// Reply once to the next statement containing `pattern`, takes precedence over [`Script::on`].
    pub fn once(&self, pattern: &'static str, reply: Reply) -> &Self {
        self.push(pattern, reply, true)
    }

    fn push(&self, pattern: &'static str, reply: Reply, once: bool) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            pattern,
            reply,
            once,
        });
        self
    }

    /// Executed statements.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Executed statements containing `pattern`.
    pub fn calls(&self, pattern: &str) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|sql| sql.contains(pattern))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) > 0
    }

    /// Wait until a statement containing `pattern` was executed `count` times.
    pub fn wait_calls(&self, pattern: &str, count: usize) {
        for _ in 0..500 {
            if self.calls(pattern).len() >= count {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("`{pattern}` is not called {count} times, log: {:?}", self.log());
    }

    fn reply(&self, sql: &str) -> Reply {
        let mut rules = self.rules.lock().unwrap();
        let idx = rules
            .iter()
            .position(|r| r.once && sql.contains(r.pattern))
            .or_else(|| rules.iter().position(|r| sql.contains(r.pattern)));
        match idx {
            Some(idx) if rules[idx].once => rules.remove(idx).reply,
            Some(idx) => rules[idx].reply.clone(),
            None => Reply::Rows(vec![]),
        }
    }
}

/// In-memory connection replying with canned rows, matched by statement substring.
pub struct ScriptedConnection(pub Arc<Script>);

impl ScriptedConnection {
    pub fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        (Self(script.clone()), script)
    }
}

impl Connection for ScriptedConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, TransportError> {
        let script = &self.0;
        if script.is_closed() {
            return Err(TransportError::Closed);
        }
        script.log.lock().unwrap().push(sql.to_string());
        let current = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(current, Ordering::SeqCst);

        // give a concurrent caller the chance to overlap
        std::thread::sleep(Duration::from_millis(1));
        let result = match script.reply(sql) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Database(msg) => Err(TransportError::Database(msg)),
            Reply::Closed => Err(TransportError::Closed),
            Reply::Block => {
                let mut cancelled = script.gate.cancelled.lock().unwrap();
                while !*cancelled {
                    cancelled = script.gate.cond.wait(cancelled).unwrap();
                }
                Err(TransportError::Closed)
            }
        };

        script.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn canceller(&self) -> Box<dyn Canceller> {
        Box::new(ScriptedCanceller(self.0.clone()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedCanceller(Arc<Script>);

impl Canceller for ScriptedCanceller {
    fn cancel(&self) -> Result<(), TransportError> {
        self.0.cancellations.fetch_add(1, Ordering::SeqCst);
        *self.0.gate.cancelled.lock().unwrap() = true;
        self.0.gate.cond.notify_all();
        Ok(())
    }
}

pub fn row(columns: &[&str]) -> Row {
    columns.iter().map(|c| Some(*c)).collect()
}

pub fn rows(columns: &[&str]) -> Reply {
    Reply::Rows(vec![row(columns)])
}

pub fn step_row(oid: i64, line: i32, name: &str) -> Reply {
    rows(&[&oid.to_string(), &line.to_string(), name])
}

pub fn stack_row(level: i32, name: &str, oid: i64, line: i32, args: &str) -> Row {
    row(&[
        &level.to_string(),
        name,
        &oid.to_string(),
        &line.to_string(),
        args,
        CALC_DIGEST,
    ])
}

pub fn calc_routine_row() -> Row {
    row(&[
        &CALC_OID.to_string(),
        "public",
        "calc",
        "a integer, b integer",
        CALC_DEFINITION,
        CALC_BODY,
        CALC_DIGEST,
    ])
}

pub fn calc_one_routine_row() -> Row {
    row(&[
        &CALC_ONE_OID.to_string(),
        "public",
        "calc",
        "a integer",
        CALC_ONE_DEFINITION,
        CALC_ONE_BODY,
        CALC_ONE_DIGEST,
    ])
}

pub fn variable_row(name: &str, class: &str, value: Option<&str>, dtype: i64, typname: &str) -> Row {
    [
        Some(name),
        Some(class),
        Some("0"),
        Some("t"),
        Some("f"),
        Some("f"),
        Some(&*dtype.to_string()),
        value,
        Some(typname),
    ]
    .into_iter()
    .map(|c| c.map(str::to_string))
    .collect()
}

/// Script a stopped target inside `calc` at body line `line`.
pub fn script_calc_session(script: &Script, session: i64, line: i32) {
    script
        .on("pldbg_attach_to_port", rows(&[&session.to_string()]))
        .on("pldbg_step_over", step_row(CALC_OID, line, "calc"))
        .on("pldbg_step_into", step_row(CALC_OID, line, "calc"))
        .on("pldbg_continue", step_row(CALC_OID, line, "calc"))
        .on(
            "pldbg_get_stack",
            Reply::Rows(vec![stack_row(0, "calc", CALC_OID, line, "a=1, b=2")]),
        )
        .on("WHERE t_proc.oid = 16384", Reply::Rows(vec![calc_routine_row()]))
        .on(
            "pldbg_get_variables",
            Reply::Rows(vec![
                variable_row("a", "A", Some("1"), 23, "int4"),
                variable_row("b", "A", Some("2"), 23, "int4"),
                variable_row("r", "L", None, 23, "int4"),
            ]),
        );
}

pub enum Notification {
    Snapshot(Task, StackSnapshot),
    Error(Task, String, bool),
    Finished,
}

/// Observer collecting notifications into a channel.
pub struct TestObserver(Sender<Notification>);

impl TestObserver {
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Self(tx), rx)
    }
}

impl SessionObserver for TestObserver {
    fn on_snapshot(&mut self, task: Task, snapshot: StackSnapshot) {
        _ = self.0.send(Notification::Snapshot(task, snapshot));
    }

    fn on_error(&mut self, task: Task, error: &Error) {
        _ = self
            .0
            .send(Notification::Error(task, error.to_string(), error.is_fatal()));
    }

    fn on_finish(&mut self) {
        _ = self.0.send(Notification::Finished);
    }
}

pub fn next(rx: &Receiver<Notification>) -> Notification {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("no notification from the session")
}
