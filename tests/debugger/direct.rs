use crate::common::{
    next, rows, script_calc_session, Notification, Reply, ScriptedConnection, TestObserver,
    CALC_OID,
};
use pldbg::debugger::{Client, Error, SessionWorker, TargetCall, Task, TransportError};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const CALL: &str = "SELECT calc(1, 2);";

#[test]
fn test_direct_call_attaches_to_announced_port() {
    let (target, target_script) = ScriptedConnection::new();
    target_script
        .on("plpgsql_oid_debug(16384)", rows(&["0"]))
        .on("calc(1, 2)", Reply::Block);
    let (tx, notices) = mpsc::channel();
    // left from an earlier statement
    tx.send("PLDBGBREAK:1".to_string()).unwrap();

    let announcer = {
        let script = target_script.clone();
        thread::spawn(move || {
            script.wait_calls("calc(1, 2)", 1);
            tx.send("function calc() called".to_string()).unwrap();
            tx.send("PLDBGBREAK:5433".to_string()).unwrap();
            tx
        })
    };

    let call = TargetCall::start(
        Client::new(target),
        CALC_OID,
        CALL,
        &notices,
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(call.port(), 5433);
    assert!(!call.is_finished());
    assert_eq!(
        target_script.log(),
        vec![
            "SELECT * FROM plpgsql_oid_debug(16384);".to_string(),
            CALL.to_string(),
        ]
    );
    let _tx = announcer.join().unwrap();

    let (conn, script) = ScriptedConnection::new();
    script_calc_session(&script, 7, 5);
    let (observer, rx) = TestObserver::new();
    let worker = SessionWorker::attach(conn, call.port(), observer).unwrap();
    assert_eq!(script.calls("pldbg_attach_to_port(5433)").len(), 1);
    worker.refresh().unwrap();
    assert!(matches!(next(&rx), Notification::Snapshot(Task::End, _)));
    worker.finish().unwrap();
    worker.join();

    call.cancel().unwrap();
    assert!(matches!(
        call.wait(),
        Err(Error::Statement(TransportError::Closed))
    ));
    assert_eq!(target_script.cancellations(), 1);
    assert!(target_script.is_closed());
}

#[test]
fn test_direct_call_completes_without_break() {
    let (target, script) = ScriptedConnection::new();
    script
        .on("plpgsql_oid_debug", rows(&["0"]))
        .on("calc(1, 2)", rows(&["3"]));
    let (_tx, notices) = mpsc::channel::<String>();

    let err = TargetCall::start(
        Client::new(target),
        CALC_OID,
        CALL,
        &notices,
        Duration::from_secs(5),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::BreakNotReached(CALC_OID)));
    assert!(!err.is_fatal());
    assert_eq!(script.cancellations(), 0);
    assert!(script.is_closed());
}

#[test]
fn test_direct_call_statement_failure() {
    let (target, script) = ScriptedConnection::new();
    script
        .on("plpgsql_oid_debug", rows(&["0"]))
        .on("calc(1, 2)", Reply::Database("division by zero".to_string()));
    let (_tx, notices) = mpsc::channel::<String>();

    let err = TargetCall::start(
        Client::new(target),
        CALC_OID,
        CALL,
        &notices,
        Duration::from_secs(5),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        Error::Statement(TransportError::Database(ref msg)) if msg == "division by zero"
    ));
    assert!(!err.is_fatal());
}

#[test]
fn test_direct_call_timeout_cancels_statement() {
    let (target, script) = ScriptedConnection::new();
    script
        .on("plpgsql_oid_debug", rows(&["0"]))
        .on("calc(1, 2)", Reply::Block);
    let (_tx, notices) = mpsc::channel::<String>();

    let err = TargetCall::start(
        Client::new(target),
        CALC_OID,
        CALL,
        &notices,
        Duration::from_millis(100),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::BreakNotReached(CALC_OID)));
    assert_eq!(script.cancellations(), 1);
    assert!(script.is_closed());
}

#[test]
fn test_direct_call_activation_failure() {
    let (target, script) = ScriptedConnection::new();
    script.on("plpgsql_oid_debug", rows(&["-1"]));
    let (_tx, notices) = mpsc::channel::<String>();

    let err = TargetCall::start(
        Client::new(target),
        CALC_OID,
        CALL,
        &notices,
        Duration::from_secs(5),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::ActivationFailed(-1)));
    assert!(script.calls("calc(1, 2)").is_empty());
    assert!(script.is_closed());
}
