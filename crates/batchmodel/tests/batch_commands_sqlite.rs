use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};

use batchmodel::prelude::*;
use batchmodel::{CommandErrorKind, MappingErrorKind};
use batchmodel_sqlite::SqliteConnection;

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Clone, Default, PartialEq, batchmodel::Reflect)]
struct Embedded {
    address: String,
    is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, batchmodel::Entity)]
#[entity(table = "entity_with_types")]
struct EntityWithTypes {
    id: i64,
    guid_prop: String,
    date_prop: i64,
    int_prop: i64,
    #[entity(unmapped)]
    scratch: String,
    #[entity(owned)]
    embedded: Embedded,
}

#[derive(Debug, Clone, Default, PartialEq, batchmodel::Entity)]
#[entity(table = "generic_entities")]
struct GenericEntity<T> {
    id: i64,
    value: T,
}

const SCHEMA: &str = "CREATE TABLE entity_with_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid_prop TEXT NOT NULL,
    date_prop INTEGER NOT NULL,
    int_prop INTEGER NOT NULL,
    embedded_address TEXT,
    embedded_is_active INTEGER
)";

fn open() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(SCHEMA).expect("create table");
    conn
}

fn rows(guid: &str, count: i64) -> Vec<EntityWithTypes> {
    (0..count)
        .map(|i| EntityWithTypes {
            id: 0,
            guid_prop: guid.to_string(),
            date_prop: 1_700_000_000 + i * 86_400,
            int_prop: i,
            scratch: "not stored".to_string(),
            embedded: Embedded {
                address: format!("{i} Main St"),
                is_active: i % 2 == 0,
            },
        })
        .collect()
}

fn scalar(conn: &SqliteConnection, cx: &Cx, sql: &str, params: &[Value]) -> i64 {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let rows: Vec<Row> = unwrap_outcome(rt.block_on(conn.query(cx, sql, params)));
    rows[0].get(0).and_then(Value::as_i64).expect("integer value")
}

async fn seed(cx: &Cx, repo: &Repository<'_, SqliteConnection>, batch: &mut [EntityWithTypes]) {
    unwrap_outcome(
        repo.insert::<EntityWithTypes>()
            .insert(PropertySet::all().exclude("id"))
            .execute(cx, repo.connection(), batch)
            .await,
    );
}

#[test]
fn insert_with_output_populates_ids() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut batch = rows("g-insert", 15);

    let inserted = rt.block_on(async {
        unwrap_outcome(
            repo.insert::<EntityWithTypes>()
                .insert(PropertySet::all().exclude("id"))
                .output(PropertySet::none().include("id"))
                .execute(&cx, &conn, &mut batch)
                .await,
        )
    });

    assert_eq!(inserted, 15);
    assert!(batch.iter().all(|e| e.id != 0));
    let mut ids: Vec<_> = batch.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 15);
    // unmapped properties are left alone
    assert!(batch.iter().all(|e| e.scratch == "not stored"));
}

#[test]
fn insert_generic_entity() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(
        "CREATE TABLE generic_entities (id INTEGER PRIMARY KEY AUTOINCREMENT, value INTEGER NOT NULL)",
    )
    .expect("create table");
    let repo = Repository::new(&conn);
    let mut batch: Vec<GenericEntity<i32>> = (1..=3)
        .map(|value| GenericEntity { id: 0, value })
        .collect();

    let inserted = rt.block_on(async {
        unwrap_outcome(
            repo.insert::<GenericEntity<i32>>()
                .insert(PropertySet::all().exclude("id"))
                .output(PropertySet::none().include("id"))
                .execute(&cx, &conn, &mut batch)
                .await,
        )
    });

    assert_eq!(inserted, 3);
    assert!(batch.iter().all(|e| e.id != 0));
    assert_eq!(
        scalar(&conn, &cx, "SELECT SUM(value) FROM generic_entities", &[]),
        6
    );
}

#[test]
fn delete_by_predicate() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);

    let deleted = rt.block_on(async {
        seed(&cx, &repo, &mut rows("g", 10)).await;
        seed(&cx, &repo, &mut rows("other", 3)).await;
        unwrap_outcome(
            repo.delete_many::<EntityWithTypes>(Expr::prop("guid_prop").eq("g"))
                .execute(&cx, &conn)
                .await,
        )
    });

    assert_eq!(deleted, 10);
    assert_eq!(scalar(&conn, &cx, "SELECT COUNT(*) FROM entity_with_types", &[]), 3);
}

#[test]
fn update_with_limit_touches_exactly_limit_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut batch = rows("g", 10);
    for row in &mut batch {
        row.int_prop = 1;
    }

    let updated = rt.block_on(async {
        seed(&cx, &repo, &mut batch).await;
        unwrap_outcome(
            repo.update_many::<EntityWithTypes>(Expr::prop("guid_prop").eq("g"))
                .set("int_prop", 5)
                .limit(2)
                .execute(&cx, &conn)
                .await,
        )
    });

    assert_eq!(updated, 2);
    let five = scalar(
        &conn,
        &cx,
        "SELECT COUNT(*) FROM entity_with_types WHERE int_prop = ?1",
        &[Value::BigInt(5)],
    );
    let one = scalar(
        &conn,
        &cx,
        "SELECT COUNT(*) FROM entity_with_types WHERE int_prop = ?1",
        &[Value::BigInt(1)],
    );
    assert_eq!((five, one), (2, 8));
}

#[test]
fn update_with_nested_arithmetic_stores_expected_value() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut batch = rows("nested", 1);
    batch[0].int_prop = 100;

    let updated = rt.block_on(async {
        seed(&cx, &repo, &mut batch).await;
        unwrap_outcome(
            repo.update_many::<EntityWithTypes>(Expr::prop("guid_prop").eq("nested"))
                .set(
                    "int_prop",
                    Expr::prop("int_prop").sub(Expr::lit(10_i64).sub(3_i64)),
                )
                .execute(&cx, &conn)
                .await,
        )
    });

    assert_eq!(updated, 1);
    assert_eq!(
        scalar(
            &conn,
            &cx,
            "SELECT int_prop FROM entity_with_types WHERE guid_prop = ?1",
            &[Value::from("nested")],
        ),
        93
    );
}

#[test]
fn page_reports_total() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut batch = rows("g", 15);
    batch.reverse();

    let page = rt.block_on(async {
        seed(&cx, &repo, &mut batch).await;
        unwrap_outcome(
            repo.find_page::<EntityWithTypes>(
                PageRequest::new(0, 10)
                    .order_by("date_prop", true)
                    .with_total(true),
            )
            .execute(&cx, &conn)
            .await,
        )
    });

    assert_eq!(page.data.len(), 10);
    assert_eq!(page.total_rows, Some(15));
    assert!(page.data.windows(2).all(|w| w[0].date_prop < w[1].date_prop));
    assert_eq!(page.data[0].date_prop, 1_700_000_000);
    assert_eq!(page.data[0].embedded.address, "0 Main St");
    assert!(page.data[0].embedded.is_active);
    assert!(page.data[0].scratch.is_empty());
}

#[test]
fn page_past_the_end_still_counts() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);

    let page = rt.block_on(async {
        seed(&cx, &repo, &mut rows("g", 15)).await;
        unwrap_outcome(
            repo.find_page::<EntityWithTypes>(
                PageRequest::new(3, 10)
                    .filter(Expr::prop("guid_prop").eq("g"))
                    .order_by("id", false)
                    .with_total(true),
            )
            .execute(&cx, &conn)
            .await,
        )
    });

    assert!(page.data.is_empty());
    assert_eq!(page.total_rows, Some(15));
    assert_eq!(page.page_count(), Some(2));
}

#[test]
fn merge_inserts_new_rows_and_reads_back() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut batch = rows("g-merge", 15);
    let expected = batch.clone();

    let (affected, page) = rt.block_on(async {
        let affected = unwrap_outcome(
            repo.merge::<EntityWithTypes>()
                .compare(PropertySet::none().include("id"))
                .insert(PropertySet::all().exclude("id"))
                .execute(&cx, &conn, &mut batch)
                .await,
        );
        let page = unwrap_outcome(
            repo.find_page::<EntityWithTypes>(
                PageRequest::new(0, 100)
                    .filter(Expr::prop("guid_prop").eq("g-merge"))
                    .order_by("date_prop", true),
            )
            .execute(&cx, &conn)
            .await,
        );
        (affected, page)
    });

    assert_eq!(affected, 15);
    assert_eq!(page.data.len(), 15);
    for (stored, input) in page.data.iter().zip(&expected) {
        assert_ne!(stored.id, 0);
        assert_eq!(stored.guid_prop, input.guid_prop);
        assert_eq!(stored.date_prop, input.date_prop);
        assert_eq!(stored.int_prop, input.int_prop);
        assert_eq!(stored.embedded, input.embedded);
    }
}

#[test]
fn merge_upsert_updates_matches_and_returns_output() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);
    let mut existing = rows("g", 2);

    let (affected, batch) = rt.block_on(async {
        unwrap_outcome(
            repo.insert::<EntityWithTypes>()
                .insert(PropertySet::all().exclude("id"))
                .output(PropertySet::none().include("id"))
                .execute(&cx, &conn, &mut existing)
                .await,
        );

        let mut batch = existing.clone();
        for row in &mut batch {
            row.int_prop = 42;
        }
        batch.extend(rows("g", 1).into_iter().map(|mut r| {
            r.int_prop = 7;
            r
        }));

        let affected = unwrap_outcome(
            repo.merge::<EntityWithTypes>()
                .compare(PropertySet::none().include("id"))
                .insert(PropertySet::all().exclude("id"))
                .output(PropertySet::none().include("id").include("int_prop"))
                .execute(&cx, &conn, &mut batch)
                .await,
        );
        (affected, batch)
    });

    assert_eq!(affected, 3);
    assert_eq!(batch[0].id, existing[0].id);
    assert_eq!(batch[1].int_prop, 42);
    assert!(batch[2].id > existing[1].id);
    assert_eq!(
        scalar(
            &conn,
            &cx,
            "SELECT COUNT(*) FROM entity_with_types WHERE int_prop = ?1",
            &[Value::BigInt(42)],
        ),
        2
    );
}

#[test]
fn chunked_insert_with_local_registry() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let config = BatchConfig::new()
        .max_rows_per_statement(4)
        .registry(RegistryChoice::Local);
    let repo = Repository::with_config(&conn, config).expect("valid config");
    let mut batch = rows("chunked", 11);

    let inserted = rt.block_on(async {
        unwrap_outcome(
            repo.insert::<EntityWithTypes>()
                .insert(PropertySet::all().exclude("id"))
                .output(PropertySet::none().include("id"))
                .execute(&cx, &conn, &mut batch)
                .await,
        )
    });

    assert_eq!(inserted, 11);
    assert!(batch.windows(2).all(|w| w[0].id < w[1].id));
    assert!(repo.registry().contains::<EntityWithTypes>());
}

#[test]
fn delete_on_owned_property_with_limit() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);

    let deleted = rt.block_on(async {
        seed(&cx, &repo, &mut rows("g", 6)).await;
        unwrap_outcome(
            repo.delete_many::<EntityWithTypes>(Expr::prop("embedded.is_active").eq(true))
                .limit(2)
                .execute(&cx, &conn)
                .await,
        )
    });

    assert_eq!(deleted, 2);
    assert_eq!(
        scalar(
            &conn,
            &cx,
            "SELECT COUNT(*) FROM entity_with_types WHERE embedded_is_active = 1",
            &[],
        ),
        1
    );
}

#[test]
fn configuration_errors_surface_before_sql() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = open();
    let repo = Repository::new(&conn);

    rt.block_on(async {
        match repo
            .update_many::<EntityWithTypes>(Expr::prop("guid_prop").eq("g"))
            .set("int_prop", 1)
            .limit(0)
            .execute(&cx, &conn)
            .await
        {
            Outcome::Err(e) => {
                assert_eq!(e.command_kind(), Some(CommandErrorKind::InvalidLimit));
                assert!(e.is_configuration_error());
            }
            other => panic!("expected error, got {other:?}"),
        }

        match repo
            .delete_many::<EntityWithTypes>(Expr::prop("scratch").eq("x"))
            .execute(&cx, &conn)
            .await
        {
            Outcome::Err(e) => {
                assert_eq!(e.mapping_kind(), Some(MappingErrorKind::UnmappedProperty));
            }
            other => panic!("expected error, got {other:?}"),
        }
    });

    assert!(Repository::with_config(&conn, BatchConfig::new().max_parameters(0)).is_err());
}
