use cql_crud::crud::normalize_rows;
use cql_crud::Error;
use serde_json::json;

#[test]
fn single_object_is_one_row() {
    let rows = json!({ "id": 1, "name": "John" });
    assert_eq!(normalize_rows(&rows).unwrap().len(), 1);
}

#[test]
fn empty_array_is_zero_rows() {
    let rows = json!([]);
    assert!(normalize_rows(&rows).unwrap().is_empty());
}

#[test]
fn homogeneous_array_is_bulk() {
    let rows = json!([
        { "id": 1, "name": "John" },
        { "name": "Jane", "id": 2 },
    ]);
    assert_eq!(normalize_rows(&rows).unwrap().len(), 2);
}

#[test]
fn heterogeneous_key_sets_are_rejected() {
    let rows = json!([
        { "id": 1, "name": "John" },
        { "id": 2, "email": "jane@example.com" },
    ]);
    assert!(matches!(
        normalize_rows(&rows),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn non_object_elements_are_rejected() {
    let rows = json!([{ "id": 1 }, 2]);
    assert!(matches!(
        normalize_rows(&rows),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn scalar_input_is_rejected() {
    assert!(matches!(
        normalize_rows(&json!("id")),
        Err(Error::InvalidInput(_))
    ));
}
