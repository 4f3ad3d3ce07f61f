use crate::common::{
    calc_one_routine_row, calc_routine_row, row, Reply, ScriptedConnection, CALC_DEFINITION,
    CALC_DIGEST, CALC_ONE_OID, CALC_OID,
};
use pldbg::debugger::{Client, Error, Resolver, RoutineCache};

fn script_catalog(script: &crate::common::Script) {
    script
        .on(
            "proname = 'calc'",
            Reply::Rows(vec![calc_routine_row(), calc_one_routine_row()]),
        )
        .on("WHERE t_proc.oid = 16384", Reply::Rows(vec![calc_routine_row()]));
}

#[test]
fn test_resolve_by_oid() {
    let (conn, script) = ScriptedConnection::new();
    script_catalog(&script);
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();

    let routine = Resolver::new(&mut client, &cache).by_oid(CALC_OID).unwrap();
    assert_eq!(routine.qualified_name(), "public.calc");
    assert_eq!(routine.source_offset(), 2);
    assert_eq!(routine.line(7), Some("    r := a + b;"));
    assert_eq!(routine.absolute_line(5), 7);
    assert_eq!(
        routine.parameters().keys().collect::<Vec<_>>(),
        vec!["a", "b"]
    );

    // second lookup served by the cache
    let again = Resolver::new(&mut client, &cache).by_oid(CALC_OID).unwrap();
    assert_eq!(again, routine);
    assert_eq!(script.calls("WHERE t_proc.oid").len(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_resolve_unknown_oid() {
    let (conn, script) = ScriptedConnection::new();
    script_catalog(&script);
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();

    let err = Resolver::new(&mut client, &cache).by_oid(1).unwrap_err();
    assert!(matches!(err, Error::RoutineNotFound(1)));
    assert!(err.is_resolution_error());
    assert!(cache.is_empty());
}

#[test]
fn test_resolve_by_call_uses_argument_count() {
    let (conn, script) = ScriptedConnection::new();
    script_catalog(&script);
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(&mut client, &cache);

    let two = resolver.by_call("SELECT calc(1, 2);").unwrap();
    assert_eq!(two.oid(), CALC_OID);

    let one = resolver.by_call("select public.calc(21)").unwrap();
    assert_eq!(one.oid(), CALC_ONE_OID);
    assert_eq!(one.line(5), Some("    RETURN a * 2;"));

    // without a hint the first routine in catalog order wins
    let first = resolver.by_name("calc", None).unwrap();
    assert_eq!(first.oid(), CALC_OID);

    assert_eq!(cache.len(), 2);
    assert!(script
        .calls("t_namespace.nspname = 'public'")
        .iter()
        .all(|sql| sql.contains("t_proc.proname = 'calc'")));
}

#[test]
fn test_resolve_by_name_not_found() {
    let (conn, script) = ScriptedConnection::new();
    script_catalog(&script);
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(&mut client, &cache);

    assert!(matches!(
        resolver.by_name("billing.missing", None),
        Err(Error::RoutineNameNotFound(name)) if name == "billing.missing"
    ));
    assert!(matches!(
        resolver.by_call("SELECT calc(1, 2, 3)"),
        Err(Error::RoutineNameNotFound(_))
    ));
    assert!(matches!(
        resolver.by_call("UPDATE t SET a = 1"),
        Err(Error::CallSite(_))
    ));
}

#[test]
fn test_resolve_unaligned_source() {
    let (conn, script) = ScriptedConnection::new();
    script.on(
        "WHERE t_proc.oid = 77",
        crate::common::rows(&[
            "77",
            "public",
            "broken",
            "",
            "CREATE FUNCTION public.broken()\nAS $$ SELECT 1 $$",
            "\nBEGIN\nEND\n",
            "9a0c2b7e",
        ]),
    );
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();

    assert!(matches!(
        Resolver::new(&mut client, &cache).by_oid(77),
        Err(Error::SourceAlignment(77))
    ));
}

#[test]
fn test_resolve_folds_unquoted_names() {
    let (conn, script) = ScriptedConnection::new();
    script_catalog(&script);
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(&mut client, &cache);

    let routine = resolver.by_call("SELECT Public.Calc(1, 2);").unwrap();
    assert_eq!(routine.oid(), CALC_OID);

    // quoted names keep their case and are not found here
    assert!(matches!(
        resolver.by_call("SELECT \"Calc\"(1, 2);"),
        Err(Error::RoutineNameNotFound(name)) if name == "public.Calc"
    ));

    let searches = script.calls("t_namespace.nspname = ");
    assert_eq!(searches.len(), 2);
    assert!(searches[0].contains("t_namespace.nspname = 'public'"));
    assert!(searches[0].contains("t_proc.proname = 'calc'"));
    assert!(searches[1].contains("t_proc.proname = 'Calc'"));
}

#[test]
fn test_resolve_by_call_omits_defaults() {
    let definition = CALC_DEFINITION.replace("b integer)", "b integer DEFAULT 0)");
    let (conn, script) = ScriptedConnection::new();
    script.on(
        "proname = 'calc'",
        Reply::Rows(vec![row(&[
            &CALC_OID.to_string(),
            "public",
            "calc",
            "a integer, b integer DEFAULT 0",
            &definition,
            crate::common::CALC_BODY,
            CALC_DIGEST,
        ])]),
    );
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(&mut client, &cache);

    let omitted = resolver.by_call("SELECT calc(1);").unwrap();
    assert_eq!(omitted.oid(), CALC_OID);
    assert_eq!(omitted.arity(), &(1..=2));
    assert_eq!(resolver.by_call("SELECT calc(1, 2);").unwrap().oid(), CALC_OID);

    assert!(matches!(
        resolver.by_call("SELECT calc();"),
        Err(Error::RoutineNameNotFound(_))
    ));
    assert!(matches!(
        resolver.by_call("SELECT calc(1, 2, 3);"),
        Err(Error::RoutineNameNotFound(_))
    ));
}

#[test]
fn test_resolve_rejects_other_routine() {
    let (conn, script) = ScriptedConnection::new();
    // a catalog reply describing another routine than the requested one
    script.on("WHERE t_proc.oid = 1", Reply::Rows(vec![calc_routine_row()]));
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();

    let err = Resolver::new(&mut client, &cache).by_oid(1).unwrap_err();
    assert!(matches!(err, Error::RoutineNotFound(1)));
    assert!(cache.is_empty());
    assert!(cache.get(CALC_OID).is_none());
}

#[test]
fn test_resolve_frame_reloads_redefined_routine() {
    let redefined = CALC_DEFINITION.replace("r := a + b;", "r := a - b;");
    let body = crate::common::CALC_BODY.replace("r := a + b;", "r := a - b;");
    let (conn, script) = ScriptedConnection::new();
    script
        .once("WHERE t_proc.oid = 16384", Reply::Rows(vec![calc_routine_row()]))
        .on(
            "WHERE t_proc.oid = 16384",
            Reply::Rows(vec![row(&[
                &CALC_OID.to_string(),
                "public",
                "calc",
                "a integer, b integer",
                &redefined,
                &body,
                "d41d8cd98f00b204e9800998ecf8427e",
            ])]),
        );
    let mut client = Client::new(conn);
    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(&mut client, &cache);

    let first = resolver.by_frame(CALC_OID, Some(CALC_DIGEST)).unwrap();
    assert_eq!(first.line(7), Some("    r := a + b;"));
    // same digest, served by the cache
    resolver.by_frame(CALC_OID, Some(CALC_DIGEST)).unwrap();
    resolver.by_frame(CALC_OID, None).unwrap();
    assert_eq!(script.calls("WHERE t_proc.oid").len(), 1);

    let reloaded = resolver
        .by_frame(CALC_OID, Some("d41d8cd98f00b204e9800998ecf8427e"))
        .unwrap();
    assert_eq!(reloaded.line(7), Some("    r := a - b;"));
    assert_eq!(script.calls("WHERE t_proc.oid").len(), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(CALC_OID).unwrap().digest(),
        Some("d41d8cd98f00b204e9800998ecf8427e")
    );
}
