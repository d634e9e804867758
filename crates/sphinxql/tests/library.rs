//! Process-wide transport state. Kept in its own test binary so no other
//! test holds connections while teardown is checked.

mod common;

use common::FakeSphinx;
use sphinxql::{Query, StateErrorKind};

#[test]
fn unload_refuses_while_connections_are_open() {
    let server = FakeSphinx::start().with_table("SELECT a FROM t;", &["a"], &[&[Some("1")]]);

    sphinxql::init().unwrap();
    assert!(sphinxql::is_initialized());

    let mut query = Query::new();
    query.connect("127.0.0.1", server.port()).unwrap();
    assert_eq!(sphinxql::live_connections(), 1);

    let err = sphinxql::unload().unwrap_err();
    assert_eq!(err.state_kind(), Some(StateErrorKind::LibraryBusy));
    assert!(sphinxql::is_initialized());

    drop(query);
    assert_eq!(sphinxql::live_connections(), 0);
    sphinxql::unload().unwrap();
    assert!(!sphinxql::is_initialized());

    // Init after teardown works again.
    sphinxql::init().unwrap();
    sphinxql::unload().unwrap();
}
