mod common;

use std::error::Error as _;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use table_gateway::{
    ChangeSet, CrudOperation, Dialect, Error, Field, Filters, Gateway, GatewayConfig, Handle,
    MappingError, OrderBy, QueryOperator, Record, Row, TableDataGateway, Value,
};

use common::{create_temp_db, create_test_db, seed_places, Place};

fn places(conn: &Connection) -> Gateway<Place, &Connection> {
    Gateway::new(conn, "places", "id")
}

fn seed(gw: &Gateway<Place, &Connection>) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for place in seed_places() {
        ids.push(gw.insert(&place)?);
    }
    Ok(ids)
}

#[tokio::test]
async fn test_insert_find_round_trip() {
    test_insert_find_round_trip_impl().unwrap();
}

fn test_insert_find_round_trip_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    assert_eq!(gw.dialect(), Dialect::Sqlite);

    let place = Place::new("Germany", "Stuttgart", 711);
    let id = gw.insert(&place)?;

    let found = gw.find(id)?;
    assert_eq!(found.id, Some(id));
    assert_eq!(found, place.with_id(id));
    assert_eq!(gw.get_id(&found)?, Value::Integer(id));
    Ok(())
}

#[tokio::test]
async fn test_nullable_column_round_trip() {
    test_nullable_column_round_trip_impl().unwrap();
}

fn test_nullable_column_round_trip_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let place = Place {
        id: None,
        country: "Atlantis".into(),
        city: None,
        telcode: 0,
    };
    let id = gw.insert(&place)?;
    assert_eq!(gw.find(id)?.city, None);

    let unnamed = gw.filter_query(&Filters::new().eq("city", Value::Null), &[], 0, 0)?;
    assert_eq!(unnamed.len(), 1);
    assert_eq!(unnamed[0].country, "Atlantis");
    Ok(())
}

#[tokio::test]
async fn test_update_changes_only_given_columns() {
    test_update_changes_only_given_columns_impl().unwrap();
}

fn test_update_changes_only_given_columns_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let ids = seed(&gw)?;
    let stuttgart = ids[0];

    let affected = gw.update(stuttgart, &ChangeSet::new().set("city", "Stuggi"))?;
    assert_eq!(affected, 1);

    let updated = gw.find(stuttgart)?;
    assert_eq!(updated.city.as_deref(), Some("Stuggi"));
    assert_eq!(updated.country, "Germany");
    assert_eq!(updated.telcode, 711);

    // The other rows are untouched.
    let munich = gw.find(ids[1])?;
    assert_eq!(munich.city.as_deref(), Some("Munich"));

    let affected = gw.update(9_999i64, &ChangeSet::new().set("telcode", 1i64))?;
    assert_eq!(affected, 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_update_is_rejected() {
    test_empty_update_is_rejected_impl().unwrap();
}

fn test_empty_update_is_rejected_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let id = gw.insert(&Place::new("Italy", "Rome", 815))?;

    match gw.update(id, &ChangeSet::new()) {
        Err(Error::Build { .. }) => {}
        other => bail!("expected a build error, got {other:?}"),
    }
    assert_eq!(gw.find(id)?.telcode, 815);
    Ok(())
}

#[tokio::test]
async fn test_delete_reports_affected_rows() {
    test_delete_reports_affected_rows_impl().unwrap();
}

fn test_delete_reports_affected_rows_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let id = gw.insert(&Place::new("Italy", "Rome", 815))?;

    assert_eq!(gw.delete(id)?, 1);
    assert_eq!(gw.delete(id)?, 0);
    assert_eq!(gw.delete(12_345i64)?, 0);

    let err = gw.find(id).unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_auto_increment_key_omitted_and_explicit_key_honored() {
    test_auto_increment_key_omitted_and_explicit_key_honored_impl().unwrap();
}

fn test_auto_increment_key_omitted_and_explicit_key_honored_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);

    let unset = Place::new("Germany", "Stuttgart", 711);
    assert_eq!(gw.derive_columns(&unset)?, vec!["country", "city", "telcode"]);

    let explicit = Place::new("Germany", "Stuttgart", 711).with_id(23);
    assert_eq!(
        gw.derive_columns(&explicit)?,
        vec!["id", "country", "city", "telcode"]
    );

    assert_eq!(gw.insert(&explicit)?, 23);
    assert_eq!(gw.find(23i64)?.city.as_deref(), Some("Stuttgart"));

    // The database continues from the highest key it has seen.
    assert_eq!(gw.insert(&unset)?, 24);
    Ok(())
}

#[tokio::test]
async fn test_filter_query_composition() {
    test_filter_query_composition_impl().unwrap();
}

fn test_filter_query_composition_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    seed(&gw)?;

    let germany = gw.filter_query(
        &Filters::new().eq("country", "Germany"),
        &[OrderBy::asc("telcode")],
        0,
        10,
    )?;
    let cities: Vec<_> = germany.iter().filter_map(|p| p.city.as_deref()).collect();
    assert_eq!(cities, vec!["Berlin", "Munich", "Stuttgart"]);
    let telcodes: Vec<_> = germany.iter().map(|p| p.telcode).collect();
    assert_eq!(telcodes, vec![40, 89, 711]);

    let munich = gw.filter_query(
        &Filters::new().eq("country", "Germany").eq("city", "Munich"),
        &[OrderBy::asc("telcode")],
        0,
        10,
    )?;
    assert_eq!(munich.len(), 1);
    assert_eq!(munich[0].telcode, 89);

    let by_telcode: OrderBy = "telcode desc".parse()?;
    let descending = gw.filter_query(&Filters::new(), &[by_telcode], 0, 1)?;
    assert_eq!(descending.len(), 1);
    assert_eq!(descending[0].city.as_deref(), Some("Rome"));
    Ok(())
}

#[tokio::test]
async fn test_filter_query_paging() {
    test_filter_query_paging_impl().unwrap();
}

fn test_filter_query_paging_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    seed(&gw)?;
    let order = [OrderBy::asc("telcode")];

    // A limit of 0 means no limit.
    let all = gw.filter_query(&Filters::new(), &order, 0, 0)?;
    assert_eq!(all.len(), 4);

    let rest = gw.filter_query(&Filters::new(), &order, 1, 0)?;
    let telcodes: Vec<_> = rest.iter().map(|p| p.telcode).collect();
    assert_eq!(telcodes, vec![89, 711, 815]);

    let page = gw.filter_query(&Filters::new(), &order, 1, 2)?;
    let telcodes: Vec<_> = page.iter().map(|p| p.telcode).collect();
    assert_eq!(telcodes, vec![89, 711]);

    let beyond = gw.filter_query(&Filters::new(), &order, 10, 5)?;
    assert!(beyond.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_returning_and_last_insert_id_agree() {
    test_returning_and_last_insert_id_agree_impl().unwrap();
}

fn test_returning_and_last_insert_id_agree_impl() -> Result<()> {
    let last_id_conn = create_test_db()?;
    let returning_conn = create_test_db()?;

    let last_id = places(&last_id_conn);
    // SQLite understands RETURNING and `$n` placeholders, so the Postgres
    // rendering runs against it unchanged.
    let returning = places(&returning_conn).with_dialect(Dialect::Postgres);

    for place in seed_places() {
        let a = last_id.insert(&place)?;
        let b = returning.insert(&place)?;
        assert_eq!(a, b);
        assert_eq!(returning.find(b)?, place.clone().with_id(b));
    }

    let explicit = Place::new("Italy", "Milan", 2).with_id(100);
    assert_eq!(last_id.insert(&explicit)?, 100);
    assert_eq!(returning.insert(&explicit)?, 100);

    let changed = returning.update(100i64, &ChangeSet::new().set("telcode", 3i64))?;
    assert_eq!(changed, 1);
    assert_eq!(returning.find(100i64)?.telcode, 3);
    Ok(())
}

#[tokio::test]
async fn test_constraint_violation_keeps_driver_error() {
    test_constraint_violation_keeps_driver_error_impl().unwrap();
}

fn test_constraint_violation_keeps_driver_error_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let place = Place::new("Germany", "Berlin", 40).with_id(1);
    gw.insert(&place)?;

    let err = gw.insert(&place).unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));
    assert!(err.to_string().starts_with("insert on `places` failed"));
    let driver = err
        .source()
        .and_then(|source| source.downcast_ref::<rusqlite::Error>());
    assert!(matches!(driver, Some(rusqlite::Error::SqliteFailure(..))));
    Ok(())
}

#[tokio::test]
async fn test_unknown_filter_column_is_execution_error() {
    test_unknown_filter_column_is_execution_error_impl().unwrap();
}

fn test_unknown_filter_column_is_execution_error_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let err = gw
        .filter_query(&Filters::new().eq("planet", "Earth"), &[], 0, 0)
        .unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));

    let err = gw
        .filter_query(&Filters::new().eq("country; --", "x"), &[], 0, 0)
        .unwrap_err();
    assert!(matches!(err, Error::Build { .. }));
    Ok(())
}

/// Application-specific gateway adding a typed finder on top of the generic one.
struct PlaceGateway<'c> {
    inner: Gateway<Place, &'c Connection>,
}

impl<'c> PlaceGateway<'c> {
    fn new(conn: &'c Connection) -> Self {
        Self {
            inner: Gateway::new(conn, "places", "id"),
        }
    }

    fn find_by_country(&self, country: &str) -> table_gateway::Result<Vec<Place>> {
        let read = self.inner.select().where_eq("country", country).order_by("city");
        self.inner.query(&read)
    }
}

#[tokio::test]
async fn test_custom_queries() {
    test_custom_queries_impl().unwrap();
}

fn test_custom_queries_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = PlaceGateway::new(&conn);
    for place in seed_places() {
        gw.inner.insert(&place)?;
    }

    let germany = gw.find_by_country("Germany")?;
    let cities: Vec<_> = germany.iter().filter_map(|p| p.city.as_deref()).collect();
    assert_eq!(cities, vec!["Berlin", "Munich", "Stuttgart"]);

    let big = gw.inner.query(
        &gw.inner
            .select()
            .with_condition("telcode", QueryOperator::GreaterThan(Value::from(100i64)))
            .with_condition("city", QueryOperator::Like("S%".into())),
    )?;
    assert_eq!(big.len(), 1);
    assert_eq!(big[0].telcode, 711);

    let delete: CrudOperation = gw
        .inner
        .builder()
        .delete("places")
        .with_condition(
            "telcode",
            QueryOperator::In(vec![Value::from(40i64), Value::from(89i64)]),
        )
        .into();
    assert_eq!(gw.inner.exec(&delete)?, 2);
    assert_eq!(gw.find_by_country("Germany")?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_gateway_behind_trait() {
    test_gateway_behind_trait_impl().unwrap();
}

fn count_rows(gw: &dyn TableDataGateway<Place>) -> table_gateway::Result<usize> {
    Ok(gw.filter_query(&Filters::new(), &[], 0, 0)?.len())
}

fn test_gateway_behind_trait_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw = places(&conn);
    let dyn_gw: &dyn TableDataGateway<Place> = &gw;

    let id = dyn_gw.insert(&Place::new("Italy", "Rome", 815))?;
    assert_eq!(dyn_gw.find(Value::Integer(id))?.telcode, 815);
    assert_eq!(count_rows(dyn_gw)?, 1);
    assert_eq!(dyn_gw.delete(Value::Integer(id))?, 1);
    assert_eq!(count_rows(dyn_gw)?, 0);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct Event {
    id: Option<i64>,
    title: String,
    happened_at: chrono::DateTime<Utc>,
    done: bool,
    score: Option<f64>,
    payload: Option<Vec<u8>>,
}

impl Record for Event {
    fn fields(&self) -> Vec<Field> {
        vec![
            Field::column("id", &self.id),
            Field::column("title", &self.title),
            Field::column("happened_at", &self.happened_at),
            Field::column("done", &self.done),
            Field::column("score", &self.score),
            Field::column("payload", &self.payload),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Event {
            id: row.get("id")?,
            title: row.get("title")?,
            happened_at: row.get("happened_at")?,
            done: row.get("done")?,
            score: row.get("score")?,
            payload: row.get("payload")?,
        })
    }
}

#[tokio::test]
async fn test_timestamp_bool_and_blob_columns() {
    test_timestamp_bool_and_blob_columns_impl().unwrap();
}

fn test_timestamp_bool_and_blob_columns_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw: Gateway<Event, _> = Gateway::new(&conn, "events", "id");

    let launch = Event {
        id: None,
        title: "launch".into(),
        happened_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        done: true,
        score: Some(9.5),
        payload: Some(vec![0xde, 0xad]),
    };
    let review = Event {
        id: None,
        title: "review".into(),
        happened_at: Utc.with_ymd_and_hms(2024, 4, 2, 16, 0, 0).unwrap(),
        done: false,
        score: None,
        payload: None,
    };
    let launch_id = gw.insert(&launch)?;
    gw.insert(&review)?;

    assert_eq!(gw.find(launch_id)?, Event { id: Some(launch_id), ..launch });

    let chronological = gw.filter_query(&Filters::new(), &[OrderBy::asc("happened_at")], 0, 0)?;
    let titles: Vec<_> = chronological.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["review", "launch"]);

    let open = gw.filter_query(&Filters::new().eq("done", false), &[], 0, 0)?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].score, None);
    Ok(())
}

#[tokio::test]
async fn test_config_driven_gateway_on_file_database() {
    test_config_driven_gateway_on_file_database_impl().unwrap();
}

fn test_config_driven_gateway_on_file_database_impl() -> Result<()> {
    let (conn, _file) = create_temp_db()?;
    let config: GatewayConfig =
        serde_json::from_str(r#"{ "table": "places", "primary_key": "id", "dialect": "sqlite" }"#)?;
    assert_eq!(config.dialect, Some(Dialect::Sqlite));

    let gw = Gateway::<Place, _>::from_config(&conn, &config);
    let id = gw.insert(&Place::new("Italy", "Rome", 815))?;
    assert_eq!(gw.find(id)?.city.as_deref(), Some("Rome"));

    let config: GatewayConfig =
        serde_json::from_str(r#"{ "table": "places", "primary_key": "id" }"#)?;
    assert_eq!(config.dialect, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_inserts_share_one_layout() -> Result<()> {
    let conn = create_test_db()?;
    let shared = Arc::new(Mutex::new(conn));
    assert_eq!(shared.driver_name(), "sqlite3");
    let gw = Arc::new(Gateway::<Place, _>::new(Arc::clone(&shared), "places", "id"));

    let tasks = (0..16).map(|i| {
        let gw = Arc::clone(&gw);
        tokio::task::spawn_blocking(move || {
            let place = Place::new("Germany", &format!("Town {i}"), i);
            gw.insert(&place)
        })
    });
    let results = futures::future::try_join_all(tasks).await?;

    let mut ids = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);

    let all = gw.filter_query(&Filters::new(), &[], 0, 0)?;
    assert_eq!(all.len(), 16);
    for place in &all {
        assert_eq!(place.city, Some(format!("Town {}", place.telcode)));
    }

    // Whichever insert won the race, the layout is the full Place column list.
    let unset = Place::new("Italy", "Rome", 815);
    assert_eq!(gw.derive_columns(&unset)?, vec!["country", "city", "telcode"]);
    assert_eq!(
        gw.derive_columns(&unset.with_id(99))?,
        vec!["id", "country", "city", "telcode"]
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct Tag {
    code: String,
    label: String,
}

impl Record for Tag {
    fn fields(&self) -> Vec<Field> {
        vec![
            Field::column("code", &self.code),
            Field::column("label", &self.label),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Tag {
            code: row.get("code")?,
            label: row.get("label")?,
        })
    }
}

#[tokio::test]
async fn test_text_key_insert_writes_nothing() {
    test_text_key_insert_writes_nothing_impl().unwrap();
}

fn test_text_key_insert_writes_nothing_impl() -> Result<()> {
    let conn = create_test_db()?;
    let tag = Tag {
        code: "de".into(),
        label: "German".into(),
    };

    for dialect in [Dialect::Postgres, Dialect::Sqlite] {
        let gw: Gateway<Tag, _> = Gateway::new(&conn, "tags", "code").with_dialect(dialect);
        match gw.insert(&tag) {
            Err(Error::Mapping {
                source: MappingError::UnsupportedKeyType { column },
                ..
            }) => assert_eq!(column, "code"),
            other => bail!("expected an unsupported key type on {dialect:?}, got {other:?}"),
        }
        assert!(gw.find("de").unwrap_err().is_not_found());
    }

    let gw: Gateway<Tag, _> = Gateway::new(&conn, "tags", "code");
    assert!(gw.filter_query(&Filters::new(), &[], 0, 0)?.is_empty());
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    id: Option<i64>,
}

impl Record for Counter {
    fn fields(&self) -> Vec<Field> {
        vec![Field::column("id", &self.id)]
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Counter { id: row.get("id")? })
    }
}

#[tokio::test]
async fn test_insert_of_key_only_record_uses_default_values() {
    test_insert_of_key_only_record_uses_default_values_impl().unwrap();
}

fn test_insert_of_key_only_record_uses_default_values_impl() -> Result<()> {
    let conn = create_test_db()?;
    let gw: Gateway<Counter, _> = Gateway::new(&conn, "counters", "id");
    assert!(gw.derive_columns(&Counter { id: None })?.is_empty());

    assert_eq!(gw.insert(&Counter { id: None })?, 1);
    assert_eq!(gw.insert(&Counter { id: None })?, 2);
    assert_eq!(gw.find(2i64)?, Counter { id: Some(2) });

    let returning: Gateway<Counter, _> =
        Gateway::new(&conn, "counters", "id").with_dialect(Dialect::Postgres);
    assert_eq!(returning.insert(&Counter { id: None })?, 3);
    Ok(())
}
