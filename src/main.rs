use anyhow::Result;
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use cql_crud::record::Record;
use cql_crud::{ConnectOptions, Crud};

// Hard-coded demonstration sequence against an env-configured cluster;
// expects a `users (id bigint PRIMARY KEY, name text, email text)` table
// in the target keyspace.
#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .try_init();

    let uri = std::env::var("SCYLLA_URI").unwrap_or_else(|_| "127.0.0.1:9042".to_string());
    let keyspace = std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "my_keyspace".to_string());
    let mut options = ConnectOptions::new(vec![uri], keyspace);
    if let (Ok(user), Ok(pass)) = (std::env::var("SCYLLA_USER"), std::env::var("SCYLLA_PASS")) {
        options = options.credentials(user, pass);
    }
    let crud = Crud::connect(options).await?;

    crud.create(
        "users",
        &json!([
            { "id": 1, "name": "John Doe", "email": "john@example.com" },
            { "id": 2, "name": "Jane Doe", "email": "jane@example.com" },
        ]),
    )
    .await?;

    let conditions: Record = serde_json::from_value(json!({ "id": [1, 2] }))?;
    let users = crud.read("users", Some(&conditions), None).await?;
    info!(rows = users.len(), "read users");
    for user in &users {
        info!(user = %serde_json::to_string(user)?, "row");
    }

    let data: Record = serde_json::from_value(json!({ "email": "johndoe@example.com" }))?;
    let by_id: Record = serde_json::from_value(json!({ "id": 1 }))?;
    crud.update("users", &data, &by_id).await?;

    let doomed: Record = serde_json::from_value(json!({ "id": 2 }))?;
    crud.delete("users", &doomed).await?;

    let raw = crud
        .execute_raw("SELECT * FROM users WHERE id = ?", &[json!(1)])
        .await?;
    info!(rows = raw.len(), "raw query");

    Ok(())
}
