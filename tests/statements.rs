use cql_crud::record::Record;
use cql_crud::statement::{delete, insert, select, update};
use cql_crud::Error;
use scylla_cql::frame::response::result::CqlValue;
use serde_json::json;

fn record(v: serde_json::Value) -> Record {
    serde_json::from_value(v).expect("object literal")
}

#[test]
fn insert_lists_columns_in_input_order() {
    let built = insert(
        "users",
        &record(json!({ "id": 1, "name": "John", "email": "j@x.com" })),
    )
    .unwrap();
    assert_eq!(built.cql, "INSERT INTO users (id, name, email) VALUES (?, ?, ?)");
    assert_eq!(
        built.values,
        vec![
            CqlValue::BigInt(1),
            CqlValue::Text("John".into()),
            CqlValue::Text("j@x.com".into()),
        ]
    );
}

#[test]
fn insert_rejects_empty_row() {
    assert!(matches!(
        insert("users", &Record::new()),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn select_defaults_to_star_without_conditions() {
    let built = select("users", None, None).unwrap();
    assert_eq!(built.cql, "SELECT * FROM users");
    assert!(built.values.is_empty());
}

#[test]
fn select_projects_columns_and_conjoins_conditions() {
    let cols = vec!["name".to_string(), "email".to_string()];
    let built = select(
        "users",
        Some(&record(json!({ "id": 1, "name": "John" }))),
        Some(&cols),
    )
    .unwrap();
    assert_eq!(
        built.cql,
        "SELECT name, email FROM users WHERE id = ? AND name = ?"
    );
    assert_eq!(built.values.len(), 2);
}

#[test]
fn sequence_condition_becomes_single_in_parameter() {
    let built = select("users", Some(&record(json!({ "id": [1, 2, 3] }))), None).unwrap();
    assert_eq!(built.cql, "SELECT * FROM users WHERE id IN ?");
    assert_eq!(built.values.len(), 1);
    assert_eq!(
        built.values[0],
        CqlValue::List(vec![
            CqlValue::BigInt(1),
            CqlValue::BigInt(2),
            CqlValue::BigInt(3),
        ])
    );
}

#[test]
fn select_rejects_empty_column_list() {
    let cols: Vec<String> = Vec::new();
    assert!(matches!(
        select("users", None, Some(&cols)),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn update_sets_then_filters() {
    let built = update(
        "users",
        &record(json!({ "email": "new@x.com" })),
        &record(json!({ "id": 1 })),
    )
    .unwrap();
    assert_eq!(built.cql, "UPDATE users SET email = ? WHERE id = ?");
    assert_eq!(
        built.values,
        vec![CqlValue::Text("new@x.com".into()), CqlValue::BigInt(1)]
    );
}

#[test]
fn update_requires_data_and_conditions() {
    let by_id = record(json!({ "id": 1 }));
    assert!(matches!(
        update("users", &Record::new(), &by_id),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        update("users", &by_id, &Record::new()),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn delete_filters_by_conditions() {
    let built = delete("users", &record(json!({ "id": 1 }))).unwrap();
    assert_eq!(built.cql, "DELETE FROM users WHERE id = ?");
    assert_eq!(built.values, vec![CqlValue::BigInt(1)]);
}

#[test]
fn unconditional_delete_is_never_built() {
    assert!(matches!(
        delete("users", &Record::new()),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn hostile_identifiers_are_rejected() {
    assert!(insert("users; DROP TABLE users", &record(json!({ "id": 1 }))).is_err());
    assert!(insert("users", &record(json!({ "id) VALUES (1); --": 1 }))).is_err());
    assert!(select("users", Some(&record(json!({ "1id": 1 }))), None).is_err());
}
