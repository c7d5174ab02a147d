use course_core::model::{Actor, Context, CourseVerb, Statement, StatementObject};
use course_core::time::fixed_now;
use serde_json::json;
use storage::repository::{StateKey, StateStore, StatementSink, Storage, StorageError};
use storage::sqlite::SqliteRepository;

fn learner() -> Actor {
    Actor::with_account("Ada", "https://lms.example", "ada")
}

fn statement(verb: CourseVerb, object: &str) -> Statement {
    Statement {
        id: uuid::Uuid::new_v4(),
        actor: learner(),
        verb: verb.verb(),
        object: StatementObject::activity(object),
        result: None,
        context: Context {
            registration: Some("reg-1".into()),
            ..Context::default()
        },
        timestamp: fixed_now(),
    }
}

#[tokio::test]
async fn sqlite_state_documents_upsert_and_scope() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_state?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let key = StateKey::new(
        learner(),
        "https://course.example/au/1",
        "https://course.example/au/1/states/courseAUProgress",
        Some("reg-1".into()),
    );
    assert_eq!(repo.get_state(&key).await.unwrap(), None);

    repo.put_state(&key, &json!({"progress": {"auProgress": 10}}))
        .await
        .unwrap();
    repo.put_state(&key, &json!({"progress": {"auProgress": 40}}))
        .await
        .unwrap();

    let stored = repo.get_state(&key).await.unwrap().expect("document");
    assert_eq!(stored["progress"]["auProgress"], 40);

    let unregistered = StateKey {
        registration: None,
        ..key.clone()
    };
    assert_eq!(repo.get_state(&unregistered).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_statement_log_keeps_order_and_rejects_duplicates() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_statements?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let object = "https://course.example/au/1";
    let first = statement(CourseVerb::Initialized, object);
    let second = statement(CourseVerb::Terminated, object);
    repo.send_statement(&first).await.unwrap();
    repo.send_statement(&second).await.unwrap();

    let err = repo.send_statement(&first).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stored = repo.statements_for_object(object).await.unwrap();
    let verbs: Vec<_> = stored.iter().map(Statement::verb_display).collect();
    assert_eq!(verbs, vec!["initialized", "terminated"]);
    assert_eq!(stored[0], first);
    assert_eq!(repo.statement_count().await.unwrap(), 2);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first");
    repo.migrate().await.expect("second");
}

#[tokio::test]
async fn storage_builder_wires_sqlite_backends() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    let key = StateKey::new(learner(), "au", "state", None);
    storage.states.put_state(&key, &json!([1, 2])).await.unwrap();
    assert_eq!(storage.states.get_state(&key).await.unwrap(), Some(json!([1, 2])));
    storage
        .statements
        .send_statement(&statement(CourseVerb::Launched, "au"))
        .await
        .unwrap();
}
