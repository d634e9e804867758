//! Connection pool fan-out over the MySQL transport.

mod common;

use std::time::Duration;

use common::FakeSphinx;
use sphinxql::prelude::*;

fn listener() -> FakeSphinx {
    FakeSphinx::start()
        .with_table("SELECT * FROM products;", &["id"], &[&[Some("1")], &[Some("2")]])
        .with_table("CALL SUGGEST('phne', 'products');", &["suggest"], &[&[Some("phone")]])
        .with_table("SELECT * FROM articles;", &["id"], &[&[Some("10")]])
        .with_meta(&[("total_found", "2")])
}

fn first_column(result: &ResultSet) -> String {
    result.column_names().next().unwrap_or_default().to_string()
}

#[test]
fn results_come_back_in_worker_order() {
    let server = listener();
    let mut pool = AsyncQuery::new("127.0.0.1", server.port());
    pool.add("SELECT * FROM products;", true).unwrap();
    pool.add("CALL SUGGEST('phne', 'products');", false).unwrap();
    assert_eq!(server.connections(), 2);

    let mut response = pool.launch().unwrap();
    let products = response.next().unwrap();
    assert_eq!(products.row_count(), 2);
    assert_eq!(products.meta_value::<u32>("total_found").unwrap(), 2);
    let suggest = response.next().unwrap();
    assert_eq!(first_column(&suggest), "suggest");
    assert!(response.next().is_none());
}

#[test]
fn slow_first_worker_still_comes_first() {
    let server = listener();
    server.delay_on("products", Duration::from_millis(300));
    let mut pool = AsyncQuery::new("127.0.0.1", server.port());
    pool.add("SELECT * FROM products;", false).unwrap();
    pool.add("SELECT * FROM articles;", false).unwrap();

    let mut response = pool.launch().unwrap();
    // The second worker's answer was on the wire first.
    assert_eq!(
        server.answered(),
        ["SELECT * FROM articles;", "SELECT * FROM products;"]
    );
    assert_eq!(response.next().unwrap().row_count(), 2);
    assert_eq!(response.next().unwrap().row_count(), 1);
    assert!(response.next().is_none());
}

#[test]
fn workers_keep_their_connections() {
    let server = listener();
    let mut pool = AsyncQuery::new("127.0.0.1", server.port());
    for _ in 0..3 {
        pool.add("SELECT * FROM products;", false).unwrap();
        pool.add("SELECT * FROM articles;", false).unwrap();
        let response = pool.launch().unwrap();
        let columns: Vec<String> = response.map(|r| first_column(&r)).collect();
        assert_eq!(columns, ["id", "id"]);
        assert_eq!(pool.idle_count(), 2);
    }
    assert_eq!(server.connections(), 2);
    assert_eq!(server.requests().len(), 6);
}

#[test]
fn one_failure_discards_the_whole_launch() {
    let server = listener();
    let mut pool = AsyncQuery::new("127.0.0.1", server.port());
    pool.add("SELECT * FROM products;", false).unwrap();
    pool.add("SELECT * FROM articles;", false).unwrap();
    server.drop_on(Some("articles"));

    let err = pool.launch().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.stats().failed_launches, 1);

    server.drop_on(None);
    pool.add("SELECT * FROM articles;", false).unwrap();
    assert_eq!(pool.launch().unwrap().len(), 1);
    assert_eq!(server.connections(), 3);
}

#[test]
fn caller_built_batches_join_the_launch() {
    let server = listener();
    let mut pool = AsyncQuery::new("127.0.0.1", server.port());

    let mut batch = Query::new();
    batch
        .add_query("SELECT * FROM products;", true)
        .add_query("SELECT * FROM articles;", false);
    pool.add_batch(batch).unwrap();
    pool.add("CALL SUGGEST('phne', 'products');", false).unwrap();

    let mut response = pool.launch().unwrap();
    assert_eq!(response.len(), 3);
    assert!(response.next().unwrap().has_meta());
    assert_eq!(response.next().unwrap().row_count(), 1);
    assert_eq!(first_column(&response.next().unwrap()), "suggest");
}

#[test]
fn unreachable_server_fails_add() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap();
    let mut pool = AsyncQuery::new("127.0.0.1", port);
    let err = pool.add("SELECT 1;", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(pool.active_count(), 0);
}
