//! Live integration tests for prospector-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/prospector-db/`), so `"../../migrations"` resolves to the
//! workspace migration directory.

use std::collections::{BTreeMap, BTreeSet};

use prospector_core::sink::RecordSink;
use prospector_core::BusinessRecord;
use prospector_db::{count_businesses, get_business_by_external_id, list_businesses, PgSink};

fn make_record(external_id: &str, name: &str) -> BusinessRecord {
    BusinessRecord {
        external_id: external_id.to_string(),
        name: name.to_string(),
        addresses: vec!["100 Main St".to_string(), "Austin, TX 78701".to_string()],
        website: Some("www.example.com".to_string()),
        phone: Some("(512) 555-0100".to_string()),
        services: BTreeSet::from(["Drain cleaning".to_string(), "Repiping".to_string()]),
        rating: Some(4.8),
        review_count: Some(132),
        raw_attributes: BTreeMap::new(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn persist_inserts_new_businesses(pool: sqlx::PgPool) {
    let mut sink = PgSink::new(pool.clone(), "plumber", "Austin, TX");

    let outcome = sink
        .persist(&[make_record("biz-1", "Acme Plumbing")])
        .await
        .expect("persist should succeed");
    assert_eq!(outcome.inserted, 1);
    assert!(outcome.failed.is_empty());

    let row = get_business_by_external_id(&pool, "biz-1")
        .await
        .expect("query should succeed")
        .expect("row should exist");
    assert_eq!(row.name, "Acme Plumbing");
    assert_eq!(row.business_type, "plumber");
    assert_eq!(row.location, "Austin, TX");
    assert_eq!(row.addresses.len(), 2);
    assert_eq!(row.services.len(), 2);
    assert_eq!(row.rating, Some(4.8));
    assert_eq!(row.review_count, Some(132));
}

#[sqlx::test(migrations = "../../migrations")]
async fn persist_updates_existing_row_on_conflict(pool: sqlx::PgPool) {
    let mut sink = PgSink::new(pool.clone(), "plumber", "Austin, TX");

    sink.persist(&[make_record("biz-1", "Acme Plumbing")])
        .await
        .expect("first persist should succeed");

    let mut updated = make_record("biz-1", "Acme Plumbing & Sons");
    updated.rating = Some(4.9);
    let outcome = sink
        .persist(&[updated])
        .await
        .expect("second persist should succeed");
    assert_eq!(outcome.inserted, 1);

    // Still exactly one row, carrying the latest values.
    assert_eq!(
        count_businesses(&pool, "plumber", "Austin, TX")
            .await
            .expect("count should succeed"),
        1
    );
    let row = get_business_by_external_id(&pool, "biz-1")
        .await
        .expect("query should succeed")
        .expect("row should exist");
    assert_eq!(row.name, "Acme Plumbing & Sons");
    assert_eq!(row.rating, Some(4.9));
}

#[sqlx::test(migrations = "../../migrations")]
async fn rejected_record_does_not_poison_the_batch(pool: sqlx::PgPool) {
    let mut sink = PgSink::new(pool.clone(), "plumber", "Austin, TX");

    // rating violates the table check constraint; the record is rejected
    // while the rest of the batch commits.
    let mut bad = make_record("biz-bad", "Broken Rating Co");
    bad.rating = Some(11.0);

    let outcome = sink
        .persist(&[make_record("biz-1", "Acme Plumbing"), bad])
        .await
        .expect("batch should still commit");
    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "biz-bad");

    assert!(get_business_by_external_id(&pool, "biz-1")
        .await
        .expect("query should succeed")
        .is_some());
    assert!(get_business_by_external_id(&pool, "biz-bad")
        .await
        .expect("query should succeed")
        .is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_is_scoped_to_the_query(pool: sqlx::PgPool) {
    let mut austin = PgSink::new(pool.clone(), "plumber", "Austin, TX");
    austin
        .persist(&[make_record("biz-1", "Acme Plumbing")])
        .await
        .expect("persist should succeed");

    let mut dallas = PgSink::new(pool.clone(), "plumber", "Dallas, TX");
    dallas
        .persist(&[make_record("biz-2", "Big D Drains")])
        .await
        .expect("persist should succeed");

    let rows = list_businesses(&pool, "plumber", "Austin, TX")
        .await
        .expect("list should succeed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].external_id, "biz-1");
}
