//! End-to-end mapping against an in-memory SQLite database.

use pretty_assertions::assert_eq;
use relation_to_struct::db::SqliteRunner;
use relation_to_struct::{
    CachingRunner, Plucked, ResultMapper, SelectQuery, ShapeDescriptor, SqlRunner, StructError,
    Value,
};

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct NumberRow {
        number: i64,
    }
}

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct IdRow {
        id: i64,
    }
}

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct IdPair {
        id: i64,
        id2: i64,
    }
}

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct NameSchool {
        name: String,
        school: String,
    }
}

relation_to_struct::record! {
    #[derive(Debug, PartialEq)]
    struct DateRow {
        date: Value,
    }
}

/// Opens an in-memory database with the economists schema.
async fn economists_db() -> SqliteRunner {
    let runner = SqliteRunner::in_memory().await.unwrap();
    let mapper = ResultMapper::new(&runner);

    mapper
        .run_sql("CREATE TABLE economic_schools (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    mapper
        .run_sql(
            "CREATE TABLE economists (
                id INTEGER PRIMARY KEY,
                name TEXT,
                economic_school_id INTEGER REFERENCES economic_schools(id)
            )",
        )
        .await
        .unwrap();

    runner
}

#[tokio::test]
async fn test_structs_from_sql() {
    let runner = SqliteRunner::in_memory().await.unwrap();
    let mapper = ResultMapper::new(&runner);

    let rows: Vec<NumberRow> = mapper
        .structs_from_sql("SELECT 1 * 23 AS number")
        .await
        .unwrap();
    assert_eq!(rows, vec![NumberRow { number: 23 }]);
}

#[tokio::test]
async fn test_structs_from_sql_validation() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);

    let err = mapper
        .structs_from_sql::<IdPair>("SELECT id, id FROM economists")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Expected column names to be unique");

    let err = mapper
        .structs_from_sql::<IdPair>("SELECT id2, id FROM (SELECT 1 AS id, 2 AS id2)")
        .await
        .unwrap_err();
    assert!(matches!(err, StructError::ShapeMismatch { .. }));

    let empty: Vec<IdRow> = mapper
        .structs_from_sql("SELECT id FROM economists")
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_records_from_sql_with_binds() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);
    mapper
        .run_sql(("INSERT INTO economists (name) VALUES (?)", vec!["F.A. Hayek"]))
        .await
        .unwrap();

    let shape = ShapeDescriptor::new(["id", "name"]).unwrap();
    let records = mapper
        .records_from_sql(
            &shape,
            ("SELECT id, name FROM economists WHERE name = ?", vec!["F.A. Hayek"]),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_as::<String>("name").unwrap(), "F.A. Hayek");
}

#[tokio::test]
async fn test_pluck_from_sql() {
    let runner = SqliteRunner::in_memory().await.unwrap();
    let mapper = ResultMapper::new(&runner);

    assert_eq!(
        mapper.pluck_from_sql("SELECT 1 * 23").await.unwrap(),
        vec![Plucked::Scalar(Value::Int(23))]
    );
    assert_eq!(
        mapper.pluck_from_sql("SELECT 1 * 23, 25").await.unwrap(),
        vec![Plucked::Tuple(vec![Value::Int(23), Value::Int(25)])]
    );
}

#[tokio::test]
async fn test_value_from_sql() {
    let runner = SqliteRunner::in_memory().await.unwrap();
    let mapper = ResultMapper::new(&runner);

    assert_eq!(
        mapper.value_from_sql("SELECT 1 * 23").await.unwrap(),
        Some(Value::Int(23))
    );
    assert_eq!(
        mapper
            .value_from_sql(("SELECT 1 * ?", vec![5i64]))
            .await
            .unwrap(),
        Some(Value::Int(5))
    );
    assert_eq!(
        mapper.value_from_sql("SELECT NULL").await.unwrap(),
        Some(Value::Null)
    );
    assert_eq!(
        mapper.value_from_sql("SELECT 1 WHERE 1 = 0").await.unwrap(),
        None
    );

    let err = mapper
        .value_from_sql("SELECT * FROM (VALUES (1), (2)) t")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Expected only a single result to be returned");

    let err = mapper.value_from_sql("SELECT 1, 2").await.unwrap_err();
    assert_eq!(err.to_string(), "Expected exactly one column to be selected");
}

#[tokio::test]
async fn test_tuple_from_sql() {
    let runner = SqliteRunner::in_memory().await.unwrap();
    let mapper = ResultMapper::new(&runner);

    assert_eq!(
        mapper.tuple_from_sql("SELECT 1").await.unwrap(),
        Some(Plucked::Scalar(Value::Int(1)))
    );
    assert_eq!(
        mapper.tuple_from_sql("SELECT 1, 23").await.unwrap(),
        Some(Plucked::Tuple(vec![Value::Int(1), Value::Int(23)]))
    );
    assert_eq!(
        mapper.tuple_from_sql("SELECT 1, 2 WHERE 1 = 0").await.unwrap(),
        None
    );

    let err = mapper
        .tuple_from_sql("SELECT * FROM (VALUES (1, 3), (2, 4)) t")
        .await
        .unwrap_err();
    assert!(matches!(err, StructError::Cardinality { found: 2 }));
}

#[tokio::test]
async fn test_run_sql_returns_affected_rows() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);

    let inserted = mapper
        .run_sql("INSERT INTO economic_schools (name) VALUES ('Chicago'), ('Distributism')")
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let count = mapper
        .value_as::<i64>("SELECT COUNT(*) FROM economic_schools")
        .await
        .unwrap();
    assert_eq!(count, Some(2));
}

#[tokio::test]
async fn test_operations_bypass_query_cache() {
    let runner = CachingRunner::new(SqliteRunner::in_memory().await.unwrap());
    let mapper = ResultMapper::new(&runner);
    let sql = "SELECT random() AS number";

    let (values, plucks, structs) = runner
        .scoped(async {
            let values = (
                mapper.value_from_sql(sql).await.unwrap(),
                mapper.value_from_sql(sql).await.unwrap(),
            );
            let plucks = (
                mapper.pluck_from_sql(sql).await.unwrap(),
                mapper.pluck_from_sql(sql).await.unwrap(),
            );
            let structs = (
                mapper.structs_from_sql::<NumberRow>(sql).await.unwrap(),
                mapper.structs_from_sql::<NumberRow>(sql).await.unwrap(),
            );
            (values, plucks, structs)
        })
        .await;

    assert_ne!(values.0, values.1);
    assert_ne!(plucks.0, plucks.1);
    assert_ne!(structs.0, structs.1);
    assert_eq!(runner.cached_len(), 0);
}

#[tokio::test]
async fn test_relation_loads_use_query_cache() {
    let runner = CachingRunner::new(economists_db().await);
    let mapper = ResultMapper::new(&runner);
    let relation = SelectQuery::table("economists").select(["id"]);

    runner
        .scoped(async {
            mapper.to_structs::<IdRow>(&relation).await.unwrap();
            assert_eq!(runner.cached_len(), 1);
        })
        .await;
    assert_eq!(runner.cached_len(), 0);
}

#[tokio::test]
async fn test_to_structs() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);

    let empty: Vec<IdRow> = mapper
        .to_structs(
            &SelectQuery::table("economists")
                .select(["id"])
                .filter("1 = 0", Vec::<Value>::new()),
        )
        .await
        .unwrap();
    assert!(empty.is_empty());

    mapper
        .run_sql("INSERT INTO economic_schools (id, name) VALUES (1, 'Austrian Economics')")
        .await
        .unwrap();
    mapper
        .run_sql(
            "INSERT INTO economists (id, name, economic_school_id) VALUES (1, 'F.A. Hayek', 1)",
        )
        .await
        .unwrap();

    let ids: Vec<IdRow> = mapper
        .to_structs(&SelectQuery::table("economists").select(["id"]))
        .await
        .unwrap();
    assert_eq!(ids, vec![IdRow { id: 1 }]);

    let joined: Vec<NameSchool> = mapper
        .to_structs(
            &SelectQuery::table("economists")
                .join("INNER JOIN economic_schools ON economic_schools.id = economists.economic_school_id")
                .select(["economists.name", "economic_schools.name AS school_name"])
                .where_eq("economists.id", 1i64),
        )
        .await
        .unwrap();
    assert_eq!(
        joined,
        vec![NameSchool {
            name: "F.A. Hayek".to_string(),
            school: "Austrian Economics".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_to_structs_validation() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);

    let err = mapper
        .to_structs::<IdRow>(&SelectQuery::table("economists"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Expected select_values to be present");

    let err = mapper
        .to_structs::<IdRow>(&SelectQuery::table("economists").select(["id", "name"]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expected struct fields and columns lengths to be equal"
    );

    let err = mapper
        .to_structs::<IdPair>(&SelectQuery::table("economists").select(["id", "id"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Expected column names to be unique");
}

#[tokio::test]
async fn test_calculated_columns_cast_alike() {
    let runner = economists_db().await;
    let mapper = ResultMapper::new(&runner);
    mapper
        .run_sql("INSERT INTO economists (name) VALUES ('F.A. Hayek')")
        .await
        .unwrap();

    let plucked = mapper
        .pluck_from_sql("SELECT date('now') FROM economists")
        .await
        .unwrap();
    let structs: Vec<DateRow> = mapper
        .to_structs(&SelectQuery::table("economists").select(["date('now')"]))
        .await
        .unwrap();

    let plucked = plucked[0].as_scalar().unwrap();
    assert_eq!(plucked.type_name(), structs[0].date.type_name());
    assert_eq!(plucked, &structs[0].date);
}

#[tokio::test]
async fn test_close() {
    let runner = SqliteRunner::in_memory().await.unwrap();
    runner.close().await.unwrap();

    let mapper = ResultMapper::new(&runner);
    assert!(mapper.value_from_sql("SELECT 1").await.is_err());
}
