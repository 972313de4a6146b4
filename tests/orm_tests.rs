use campus::orm::{Db, Model, apply_migration_files, auto_migrate};
use std::sync::Arc;

#[tokio::test]
async fn test_db_basic_crud() {
    use sqlx::FromRow;

    #[derive(Debug, FromRow, PartialEq, Eq)]
    struct Person {
        name: String,
    }

    let db = Db::connect("sqlite::memory:").await.unwrap();
    db.execute("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    db.execute("INSERT INTO person (name) VALUES ('Alice')")
        .await
        .unwrap();

    let people: Vec<Person> = db.fetch_all("SELECT name FROM person").await.unwrap();
    let names: Vec<String> = people.into_iter().map(|person| person.name).collect();
    assert_eq!(names, vec!["Alice"]);
}

#[tokio::test]
async fn test_execute_reports_sql_errors() {
    let db = Db::connect("sqlite::memory:").await.unwrap();
    assert!(db.execute("SELECT * FROM no_such_table").await.is_err());
}

#[tokio::test]
async fn test_separate_memory_databases_are_isolated() {
    let a = Db::connect("sqlite::memory:").await.unwrap();
    let b = Db::connect("sqlite::memory:").await.unwrap();
    a.execute("CREATE TABLE only_in_a (id INTEGER)").await.unwrap();
    assert!(b.execute("SELECT * FROM only_in_a").await.is_err());
}

#[tokio::test]
async fn test_file_database_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campus.db");
    let uri = format!("sqlite://{}", path.display());
    let db = Db::connect(&uri).await.unwrap();
    db.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_auto_migrate_creates_student_table_and_is_idempotent() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();
    auto_migrate(db.clone()).await.unwrap();

    let tables: Vec<(String,)> = db
        .fetch_all("SELECT table_name FROM __campus_migrations WHERE table_name IS NOT NULL")
        .await
        .unwrap();
    assert_eq!(tables, vec![("student".to_string(),)]);

    assert!(campus::models::student::list(&db).await.unwrap().is_empty());
}

struct GadgetV1;
struct GadgetV2;

#[async_trait::async_trait]
impl Model for GadgetV1 {
    fn table_name() -> &'static str {
        "gadget"
    }
    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS gadget (id INTEGER PRIMARY KEY, name TEXT)".to_string()
    }
    fn columns() -> Vec<(String, String)> {
        vec![("id".into(), "INTEGER".into()), ("name".into(), "TEXT".into())]
    }
}

#[async_trait::async_trait]
impl Model for GadgetV2 {
    fn table_name() -> &'static str {
        "gadget"
    }
    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS gadget (id INTEGER PRIMARY KEY, name TEXT, color TEXT)"
            .to_string()
    }
    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".into(), "INTEGER".into()),
            ("name".into(), "TEXT".into()),
            ("color".into(), "TEXT".into()),
        ]
    }
}

#[tokio::test]
async fn test_migrate_adds_new_columns_and_updates_hash() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    GadgetV1::migrate(db.clone()).await.unwrap();
    db.execute("INSERT INTO gadget (name) VALUES ('lamp')").await.unwrap();
    assert!(
        db.execute("INSERT INTO gadget (name, color) VALUES ('x', 'red')")
            .await
            .is_err()
    );

    let before: Vec<(String,)> = db
        .fetch_all("SELECT hash FROM __campus_migrations WHERE table_name = 'gadget'")
        .await
        .unwrap();

    GadgetV2::migrate(db.clone()).await.unwrap();
    db.execute("INSERT INTO gadget (name, color) VALUES ('desk', 'oak')")
        .await
        .unwrap();

    let after: Vec<(String,)> = db
        .fetch_all("SELECT hash FROM __campus_migrations WHERE table_name = 'gadget'")
        .await
        .unwrap();
    assert_ne!(before, after);

    let rows: Vec<(String, Option<String>)> = db
        .fetch_all("SELECT name, color FROM gadget ORDER BY id")
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("lamp".to_string(), None),
            ("desk".to_string(), Some("oak".to_string()))
        ]
    );
}

#[tokio::test]
async fn test_apply_migration_files_runs_each_file_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("0002_seed.sql"),
        "INSERT INTO note (body) VALUES ('second');",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("0001_note.sql"),
        "CREATE TABLE note (id INTEGER PRIMARY KEY, body TEXT);",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a migration").unwrap();

    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    let dir_str = dir.path().to_str().unwrap();

    let applied = apply_migration_files(db.clone(), dir_str).await.unwrap();
    assert_eq!(applied, 2);
    let applied = apply_migration_files(db.clone(), dir_str).await.unwrap();
    assert_eq!(applied, 0);

    let notes: Vec<(String,)> = db.fetch_all("SELECT body FROM note").await.unwrap();
    assert_eq!(notes, vec![("second".to_string(),)]);
}

#[tokio::test]
async fn test_file_and_model_migrations_share_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("0001_index.sql"),
        "CREATE INDEX IF NOT EXISTS student_name_idx ON student (name);",
    )
    .unwrap();

    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();
    assert!(campus::models::student::list(&db).await.unwrap().is_empty());
    apply_migration_files(db.clone(), dir.path().to_str().unwrap())
        .await
        .unwrap();

    let rows: Vec<(i64,)> = db
        .fetch_all("SELECT COUNT(*) FROM __campus_migrations")
        .await
        .unwrap();
    assert_eq!(rows[0].0, 2);
}
