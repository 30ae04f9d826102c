//! Integration tests for result set handling.
//!
//! ## Test Matrix
//!
//! ### Multiple result sets
//! - `test_next_result_two_sets` - 5 rows then 3 rows
//! - `test_three_result_sets` - has_more_results across three result sets
//! - `test_next_result_requires_drained_rows` - Unread rows keep next_result false
//! - `test_leading_empty_part` - A first part without a result set is skipped
//! - `test_leading_empty_part_discarded` - Same, on a statement being discarded
//!
//! ### Discard
//! - `test_discard_mid_stream` - No rows surface after discard_remaining
//! - `test_discard_before_reading` - Discarding a statement that was never read
//!
//! ### Row batches
//! - `test_suspended_fetch` - Rows arriving in several batches
//! - `test_empty_result_set` - Result set with columns but no rows
//!
//! ### Errors
//! - `test_server_error_short_circuits` - An error reply completes the statement
//! - `test_error_in_later_result_set` - First result set readable, second fails
//! - `test_error_does_not_break_pipeline` - Later statements still run
//!
//! ### Notices
//! - `test_notices_and_stats` - Warnings, statistics and session notices
//! - `test_error_level_notice_keeps_statement_done` - An error-level warning notice does not fail the statement

use std::cell::RefCell;
use std::rc::Rc;

use zero_mysqlx::protocol::message::{Notice, NoticePayload, StateChange};
use zero_mysqlx::protocol::reply::{ReceiveKind, XProtocol};
use zero_mysqlx::protocol::scripted::{Journal, ScriptedWire};
use zero_mysqlx::{Command, Error, ServerError, Session, Severity, State, Target};

fn session_over(wire: ScriptedWire) -> (Session, Rc<RefCell<ScriptedWire>>) {
    let wire = Rc::new(RefCell::new(wire));
    let session = Session::new(XProtocol::from_shared(Rc::clone(&wire)));
    (session, wire)
}

fn receive_count(wire: &Rc<RefCell<ScriptedWire>>, kind: ReceiveKind) -> usize {
    wire.borrow()
        .journal()
        .iter()
        .filter(|entry| **entry == Journal::Receive(kind))
        .count()
}

fn texts(rows: &[zero_mysqlx::Row]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_str(0).unwrap().unwrap_or("NULL").to_string())
        .collect()
}

// === Multiple result sets ===

/// Two result sets: next_result is true once, then false
#[test]
fn test_next_result_two_sets() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .result_set(&["n"], &[&["1"], &["2"], &["3"], &["4"], &["5"]])
            .fetch_done_more_resultsets()
            .result_set(&["m"], &[&["a"], &["b"], &["c"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("CALL two_sets()").unwrap();
    assert_eq!(stmt.fetch_all().unwrap().len(), 5);
    assert!(stmt.next_result().unwrap());
    assert_eq!(stmt.columns().unwrap()[0].name, "m");
    assert_eq!(texts(&stmt.fetch_all().unwrap()), vec!["a", "b", "c"]);
    assert!(!stmt.next_result().unwrap());
    assert!(!stmt.has_more_results().unwrap());
    assert!(stmt.is_completed());
}

/// Three result sets
#[test]
fn test_three_result_sets() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .result_set(&["a"], &[&["1"]])
            .fetch_done_more_resultsets()
            .result_set(&["b"], &[&["2"]])
            .fetch_done_more_resultsets()
            .result_set(&["c"], &[&["3"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("CALL three_sets()").unwrap();
    let mut seen = Vec::new();
    let mut more = Vec::new();
    loop {
        seen.extend(texts(&stmt.fetch_all().unwrap()));
        more.push(stmt.has_more_results().unwrap());
        if !stmt.next_result().unwrap() {
            break;
        }
    }
    assert_eq!(seen, vec!["1", "2", "3"]);
    assert_eq!(more, vec![true, true, false]);
    assert_eq!(stmt.state().unwrap(), State::Done);
}

/// Rows of the current result set must be read or discarded first
#[test]
fn test_next_result_requires_drained_rows() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .result_set(&["n"], &[&["1"], &["2"]])
            .fetch_done_more_resultsets()
            .result_set(&["m"], &[&["x"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("CALL two_sets()").unwrap();
    assert!(stmt.has_more_results().unwrap());
    assert!(!stmt.next_result().unwrap());

    let first = stmt.fetch_row().unwrap().unwrap();
    assert_eq!(first.get_str(0).unwrap(), Some("1"));
    // The batch is read, but "2" is still buffered
    assert_eq!(stmt.state().unwrap(), State::Next);
    assert!(!stmt.next_result().unwrap());

    assert_eq!(stmt.fetch_row().unwrap().unwrap().get_str(0).unwrap(), Some("2"));
    assert_eq!(stmt.fetch_row().unwrap(), None);
    assert!(stmt.next_result().unwrap());
    assert_eq!(texts(&stmt.fetch_all().unwrap()), vec!["x"]);
}

/// A reply whose first part has no result set
#[test]
fn test_leading_empty_part() {
    let (session, wire) = session_over(
        ScriptedWire::new()
            .fetch_done_more_resultsets()
            .result_set(&["a"], &[&["1"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("CALL p()").unwrap();
    stmt.wait().unwrap();
    assert_eq!(stmt.state().unwrap(), State::Rows);
    assert_eq!(stmt.columns().unwrap()[0].name, "a");
    assert_eq!(texts(&stmt.fetch_all().unwrap()), vec!["1"]);
    assert!(!stmt.next_result().unwrap());
    assert_eq!(stmt.state().unwrap(), State::Done);
    assert_eq!(receive_count(&wire, ReceiveKind::Metadata), 2);
    assert!(!session.is_broken());
}

/// An empty part is skipped while discarding too
#[test]
fn test_leading_empty_part_discarded() {
    let (session, wire) = session_over(
        ScriptedWire::new()
            .fetch_done_more_resultsets()
            .result_set(&["a"], &[&["1"]])
            .fetch_done()
            .execute_ok()
            .execute_ok(),
    );

    let s1 = session.sql("CALL p()").unwrap();
    let s2 = session.sql("DO 1").unwrap();
    drop(s1);
    s2.wait().unwrap();
    assert_eq!(s2.state().unwrap(), State::Done);
    assert_eq!(wire.borrow().remaining(), 0);
    assert!(!session.is_broken());
}

// === Discard ===

/// No row surfaces after discard_remaining, across result sets
#[test]
fn test_discard_mid_stream() {
    let (session, wire) = session_over(
        ScriptedWire::new()
            .result_set(&["a"], &[&["1"], &["2"]])
            .fetch_suspended()
            .rows(&[&["3"]])
            .fetch_done_more_resultsets()
            .result_set(&["b"], &[&["4"], &["5"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("CALL many()").unwrap();
    assert_eq!(stmt.fetch_row().unwrap().unwrap().get_str(0).unwrap(), Some("1"));

    stmt.discard_remaining().unwrap();
    assert_eq!(stmt.fetch_row().unwrap(), None);
    stmt.wait().unwrap();

    assert_eq!(stmt.state().unwrap(), State::Done);
    assert!(!stmt.has_more_results().unwrap());
    assert!(!stmt.next_result().unwrap());
    assert!(stmt.fetch_all().unwrap().is_empty());
    assert_eq!(wire.borrow().remaining(), 0);

    // Discarding again is a no-op
    stmt.discard_remaining().unwrap();
}

/// Discarding a statement whose reply was never read
#[test]
fn test_discard_before_reading() {
    let (session, wire) = session_over(
        ScriptedWire::new()
            .result_set(&["a"], &[&["1"]])
            .fetch_done()
            .execute_ok()
            .result_set(&["b"], &[&["2"]])
            .fetch_done()
            .execute_ok(),
    );

    let s1 = session.sql("SELECT a FROM t").unwrap();
    let s2 = session.sql("SELECT b FROM t").unwrap();
    s1.discard_remaining().unwrap();

    assert_eq!(texts(&s2.fetch_all().unwrap()), vec!["2"]);
    assert!(s1.is_completed());
    assert_eq!(s1.fetch_row().unwrap(), None);
    assert_eq!(receive_count(&wire, ReceiveKind::Rows), 2);
}

// === Row batches ===

/// Rows split by FetchSuspended are read one batch at a time
#[test]
fn test_suspended_fetch() {
    let (session, wire) = session_over(
        ScriptedWire::new()
            .result_set(&["n"], &[&["1"], &["2"]])
            .fetch_suspended()
            .rows(&[&["3"]])
            .fetch_suspended()
            .rows(&[&["4"]])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("SELECT n FROM t").unwrap();
    assert_eq!(stmt.fetch_row().unwrap().unwrap().get_str(0).unwrap(), Some("1"));
    assert_eq!(receive_count(&wire, ReceiveKind::Rows), 1);

    assert_eq!(texts(&stmt.fetch_all().unwrap()), vec!["2", "3", "4"]);
    assert_eq!(receive_count(&wire, ReceiveKind::Rows), 3);
    assert!(stmt.is_completed());
}

/// Columns but no rows
#[test]
fn test_empty_result_set() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .result_set(&["a", "b"], &[])
            .fetch_done()
            .execute_ok(),
    );

    let stmt = session.sql("SELECT a, b FROM t WHERE false").unwrap();
    assert_eq!(stmt.columns().unwrap().len(), 2);
    assert!(stmt.fetch_all().unwrap().is_empty());
    assert!(stmt.is_completed());
}

// === Errors ===

/// An error reply completes the statement and is recorded once
#[test]
fn test_server_error_short_circuits() {
    let (session, wire) = session_over(
        ScriptedWire::new().error(ServerError::new(1146, "42S02", "Table 'test.t' doesn't exist")),
    );

    let stmt = session.sql("SELECT * FROM t").unwrap();
    stmt.wait().unwrap();

    assert!(stmt.is_completed());
    assert_eq!(stmt.state().unwrap(), State::Error);
    let diagnostics = stmt.diagnostics().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics.entry_count(Severity::Error), 1);
    assert_eq!(stmt.error().unwrap().code, 1146);
    assert!(!stmt.has_more_results().unwrap());
    assert!(!stmt.next_result().unwrap());
    match stmt.fetch_row() {
        Err(Error::Server(err)) => assert_eq!(err.sql_state, "42S02"),
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(receive_count(&wire, ReceiveKind::Metadata), 1);
    assert_eq!(wire.borrow().journal().len(), 3);
    assert!(!session.is_broken());
}

/// The first result set is readable even though the second one fails
#[test]
fn test_error_in_later_result_set() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .result_set(&["a"], &[&["1"]])
            .fetch_done_more_resultsets()
            .error(ServerError::new(1305, "42000", "FUNCTION nope does not exist")),
    );

    let stmt = session.sql("CALL p()").unwrap();
    assert_eq!(texts(&stmt.fetch_all().unwrap()), vec!["1"]);
    assert!(!stmt.next_result().unwrap());
    assert_eq!(stmt.state().unwrap(), State::Error);
    assert_eq!(stmt.error().unwrap().code, 1305);
}

/// A server error does not stop the statements queued after it
#[test]
fn test_error_does_not_break_pipeline() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .error(ServerError::new(1062, "23000", "Duplicate entry '1'"))
            .result_set(&["n"], &[&["7"]])
            .fetch_done()
            .execute_ok(),
    );

    let insert = session.sql("INSERT INTO t VALUES (1)").unwrap();
    let select = session.sql("SELECT n FROM t").unwrap();

    assert_eq!(texts(&select.fetch_all().unwrap()), vec!["7"]);
    assert!(insert.is_completed());
    assert_eq!(insert.error().unwrap().code, 1062);
    assert!(select.error().is_none());
    assert!(!session.is_broken());
}

// === Notices ===

/// Statement warnings and statistics stay with the statement; the rest goes to the session
#[test]
fn test_notices_and_stats() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .notice(Notice::local(NoticePayload::Warning {
                level: Severity::Warning,
                code: 1265,
                message: "Data truncated for column 'name'".into(),
            }))
            .notice(Notice::local(NoticePayload::SessionStateChanged(
                StateChange::RowsAffected(2),
            )))
            .notice(Notice::local(NoticePayload::SessionStateChanged(
                StateChange::GeneratedDocumentIds(vec!["a1".into(), "a2".into()]),
            )))
            .notice(Notice::local(NoticePayload::SessionStateChanged(
                StateChange::CurrentSchema("shop".into()),
            )))
            .notice(Notice::global(NoticePayload::SessionStateChanged(
                StateChange::ClientIdAssigned(17),
            )))
            .execute_ok(),
    );

    let stmt = session
        .execute(Command::Insert {
            target: Target::collection("shop", "orders"),
            columns: Vec::new(),
            rows: vec![Vec::new(), Vec::new()],
            upsert: false,
        })
        .unwrap();
    stmt.wait().unwrap();

    let stats = stmt.stats().unwrap();
    assert_eq!(stats.rows_affected, 2);
    assert_eq!(stats.generated_ids, vec!["a1", "a2"]);
    let diagnostics = stmt.diagnostics().unwrap();
    assert_eq!(diagnostics.warnings().count(), 1);
    assert!(diagnostics.error().is_none());

    assert_eq!(session.current_schema().as_deref(), Some("shop"));
    assert_eq!(session.client_id(), Some(17));
    assert_eq!(session.take_notices().len(), 2);
    assert!(session.take_notices().is_empty());
}

/// A warning notice at error level is recorded but the statement succeeds
#[test]
fn test_error_level_notice_keeps_statement_done() {
    let (session, _wire) = session_over(
        ScriptedWire::new()
            .notice(Notice::local(NoticePayload::Warning {
                level: Severity::from_warning_level(3),
                code: 1592,
                message: "Unsafe statement written to the binary log".into(),
            }))
            .execute_ok()
            .notice(Notice::local(NoticePayload::Warning {
                level: Severity::Error,
                code: 3170,
                message: "Memory capacity exceeded".into(),
            }))
            .ok("committed"),
    );

    let stmt = session
        .execute(Command::Delete {
            target: Target::table("shop", "orders"),
            criteria: None,
            limit: None,
            args: Vec::new(),
        })
        .unwrap();
    stmt.wait().unwrap();
    assert_eq!(stmt.state().unwrap(), State::Done);
    assert!(stmt.error().is_none());
    assert_eq!(stmt.diagnostics().unwrap().entry_count(Severity::Error), 1);

    session.commit().unwrap();
}
