use std::collections::HashMap;

use cql_crud::catalog::Catalog;
use cql_crud::record::{record_name, TableDescriptor};
use cql_crud::Error;

fn users_descriptor() -> TableDescriptor {
    let mut columns = HashMap::new();
    columns.insert("id".to_string(), "int".to_string());
    columns.insert("name".to_string(), "text".to_string());
    columns.insert("email".to_string(), "text".to_string());
    TableDescriptor {
        table_name: "users".to_string(),
        record_name: record_name("users"),
        partition_keys: vec!["id".to_string()],
        columns,
    }
}

#[test]
fn record_names_capitalize_each_segment() {
    assert_eq!(record_name("users"), "Users");
    assert_eq!(record_name("user_profile"), "UserProfile");
    assert_eq!(record_name("user__profile"), "UserProfile");
    assert_eq!(record_name("API_keys"), "ApiKeys");
}

#[test]
fn lookup_finds_inserted_descriptor() {
    let mut catalog = Catalog::new();
    catalog.insert(users_descriptor());
    let descriptor = catalog.lookup("users").expect("descriptor");
    assert_eq!(descriptor.record_name, "Users");
    assert_eq!(descriptor.primary_key(), Some("id"));
    assert!(descriptor.has_column("email"));
    // The partition key is always drawn from the column set.
    for key in &descriptor.partition_keys {
        assert!(descriptor.has_column(key));
    }
}

#[test]
fn lookup_on_unknown_table_is_not_found() {
    let mut catalog = Catalog::new();
    catalog.insert(users_descriptor());
    assert!(catalog.lookup("orders").is_none());
    assert!(matches!(
        catalog.require("orders"),
        Err(Error::TableNotFound(name)) if name == "orders"
    ));
}

#[test]
fn missing_partition_key_yields_none() {
    let descriptor = TableDescriptor {
        table_name: "events".to_string(),
        record_name: record_name("events"),
        partition_keys: Vec::new(),
        columns: HashMap::new(),
    };
    assert_eq!(descriptor.primary_key(), None);
}
