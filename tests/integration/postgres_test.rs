//! End-to-end mapping against PostgreSQL.
//!
//! Skipped unless DATABASE_URL points at a reachable server.

use pretty_assertions::assert_eq;
use relation_to_struct::db::PostgresRunner;
use relation_to_struct::{
    CachingRunner, ConnectionConfig, Plucked, ResultMapper, RunnerConfig, SqlRunner, StructError,
    Value,
};

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct NumberRow {
        number: i32,
    }
}

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct NamesRow {
        names: Vec<String>,
    }
}

/// Helper to create a test runner.
async fn get_test_runner() -> Option<PostgresRunner> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresRunner::connect(&config, &RunnerConfig::default())
        .await
        .ok()
}

#[tokio::test]
async fn test_core_operations() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let mapper = ResultMapper::new(&runner);

    let rows: Vec<NumberRow> = mapper
        .structs_from_sql("SELECT 1 * 23 AS number")
        .await
        .unwrap();
    assert_eq!(rows, vec![NumberRow { number: 23 }]);

    assert_eq!(
        mapper.pluck_from_sql("SELECT 1 * 23, 25").await.unwrap(),
        vec![Plucked::Tuple(vec![Value::Int(23), Value::Int(25)])]
    );
    assert_eq!(
        mapper
            .value_from_sql(("SELECT 1 * ?", vec![5i64]))
            .await
            .unwrap(),
        Some(Value::Int(5))
    );
    assert_eq!(
        mapper.tuple_from_sql("SELECT 1, 23").await.unwrap(),
        Some(Plucked::Tuple(vec![Value::Int(1), Value::Int(23)]))
    );

    let err = mapper.value_from_sql("SELECT 1, 2").await.unwrap_err();
    assert!(matches!(err, StructError::ColumnCount { found: 2 }));

    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_arrays() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let mapper = ResultMapper::new(&runner);

    let rows: Vec<NamesRow> = mapper
        .structs_from_sql(
            "SELECT ARRAY_AGG(name ORDER BY id) AS names
             FROM (VALUES (1, 'F.A. Hayek'), (2, 'Ludwig von Mises')) AS e(id, name)",
        )
        .await
        .unwrap();
    assert_eq!(
        rows[0].names,
        vec!["F.A. Hayek".to_string(), "Ludwig von Mises".to_string()]
    );

    let value = mapper
        .value_from_sql(("SELECT ?::int8[]", vec![Value::Array(vec![Value::Int(1), Value::Null])]))
        .await
        .unwrap();
    assert_eq!(value, Some(Value::Array(vec![Value::Int(1), Value::Null])));

    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_run_sql_and_cache_bypass() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let runner = CachingRunner::new(runner);
    let mapper = ResultMapper::new(&runner);

    mapper
        .run_sql("CREATE TABLE IF NOT EXISTS relation_to_struct_schools (id SERIAL PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    let inserted = mapper
        .run_sql(
            "INSERT INTO relation_to_struct_schools (name) VALUES ('Chicago'), ('Distributism')",
        )
        .await
        .unwrap();
    assert_eq!(inserted, 2);
    mapper
        .run_sql("DROP TABLE relation_to_struct_schools")
        .await
        .unwrap();

    let (first, second) = runner
        .scoped(async {
            (
                mapper.pluck_from_sql("SELECT random()").await.unwrap(),
                mapper.pluck_from_sql("SELECT random()").await.unwrap(),
            )
        })
        .await;
    assert_ne!(first, second);

    runner.close().await.unwrap();
}

#[tokio::test]
async fn test_numeric_and_temporal_values_are_not_nulled() {
    let Some(runner) = get_test_runner().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let mapper = ResultMapper::new(&runner);

    assert_eq!(
        mapper.value_from_sql("SELECT 23.5::numeric").await.unwrap(),
        Some(Value::from("23.5"))
    );
    assert_eq!(
        mapper.value_from_sql("SELECT DATE '2020-01-02'").await.unwrap(),
        Some(Value::from("2020-01-02"))
    );
    assert_eq!(
        mapper.value_from_sql("SELECT '{\"a\":1}'::jsonb").await.unwrap(),
        Some(Value::from("{\"a\":1}"))
    );

    let now = mapper.value_from_sql("SELECT now()").await.unwrap();
    assert!(matches!(now, Some(Value::String(_))));

    assert_eq!(
        mapper
            .pluck_from_sql("SELECT DATE '2020-01-02', 1")
            .await
            .unwrap(),
        vec![Plucked::Tuple(vec![Value::from("2020-01-02"), Value::Int(1)])]
    );

    runner.close().await.unwrap();
}
