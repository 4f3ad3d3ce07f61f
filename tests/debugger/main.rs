mod common;

mod direct;
mod resolver;

use crate::common::{rows, Reply, ScriptedConnection};
use pldbg::debugger::{activate_for_routine, Client, Error};

#[test]
fn test_check_extension() {
    let (conn, script) = ScriptedConnection::new();
    script.on(
        "pg_extension",
        Reply::Rows(vec![
            common::row(&["pg_catalog", "plpgsql", "1.0"]),
            common::row(&["public", "pldbgapi", "1.1"]),
        ]),
    );
    let mut client = Client::new(conn);

    let extension = client.check_extension().unwrap();
    assert_eq!(extension.name, "pldbgapi");
    assert_eq!(extension.schema, "public");
    assert_eq!(extension.version, "1.1");
}

#[test]
fn test_check_extension_missing() {
    let (conn, script) = ScriptedConnection::new();
    script.on("pg_extension", rows(&["pg_catalog", "plpgsql", "1.0"]));
    let mut client = Client::new(conn);

    assert!(matches!(
        client.check_extension(),
        Err(Error::ExtensionMissing("pldbgapi"))
    ));
}

#[test]
fn test_activate_for_routine() {
    let (conn, script) = ScriptedConnection::new();
    script
        .once("plpgsql_oid_debug", rows(&["0"]))
        .once("plpgsql_oid_debug", rows(&["-1"]));
    let mut client = Client::new(conn);

    assert_eq!(activate_for_routine(&mut client, 16384).unwrap(), 0);
    assert!(matches!(
        activate_for_routine(&mut client, 16384),
        Err(Error::ActivationFailed(-1))
    ));
    assert_eq!(
        script.calls("plpgsql_oid_debug"),
        vec![
            "SELECT * FROM plpgsql_oid_debug(16384);",
            "SELECT * FROM plpgsql_oid_debug(16384);"
        ]
    );
}

#[test]
fn test_database_error_keeps_connection() {
    let (conn, script) = ScriptedConnection::new();
    script
        .once("pldbg_abort_target", Reply::Database("permission denied".to_string()))
        .on("pldbg_abort_target", rows(&["t"]));
    let mut client = Client::new(conn);
    let session = pldbg::debugger::SessionHandle::new(7);

    let err = client.abort_target(session).unwrap_err();
    assert!(!err.is_fatal());
    assert!(err.is_command_error());
    assert!(client.abort_target(session).unwrap());
}
