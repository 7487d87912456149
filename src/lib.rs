pub use crud::{ConnectOptions, Crud};
pub use error::{Error, Result};

pub mod error {
    use scylla::transport::errors::{NewSessionError, QueryError};
    use thiserror::Error;

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug, Error)]
    pub enum Error {
        #[error("failed to connect after {attempts} attempts: {source}")]
        Connection {
            attempts: u32,
            #[source]
            source: NewSessionError,
        },
        #[error("table '{0}' not found in the discovered schema")]
        TableNotFound(String),
        #[error("invalid input: {0}")]
        InvalidInput(String),
        #[error("query failed: {source}")]
        Query {
            cql: String,
            #[source]
            source: QueryError,
        },
    }
}

pub mod record {
    use std::collections::HashMap;

    use serde::Serialize;

    /// Generic record shape: an ordered mapping from column name to value.
    /// Rows read from the driver and rows handed to `create` both use it.
    pub type Record = serde_json::Map<String, serde_json::Value>;

    #[derive(Debug, Clone, Serialize)]
    pub struct TableDescriptor {
        pub table_name: String,
        pub record_name: String,
        pub partition_keys: Vec<String>,
        pub columns: HashMap<String, String>,
    }

    impl TableDescriptor {
        /// Single-column view of the partition key; composite keys keep
        /// every column in `partition_keys`, metadata position order.
        pub fn primary_key(&self) -> Option<&str> {
            self.partition_keys.first().map(|s| s.as_str())
        }

        pub fn has_column(&self, name: &str) -> bool {
            self.columns.contains_key(name)
        }
    }

    /// Record-type name for a table: `user_profile` -> `UserProfile`.
    pub fn record_name(table: &str) -> String {
        table
            .split('_')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let mut chars = segment.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect()
    }
}

pub mod value {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine;
    use scylla_cql::frame::response::result::{ColumnSpec, CqlValue, Row};
    use serde_json::{Map, Value};

    use crate::error::{Error, Result};
    use crate::record::Record;

    /// Bind-side conversion. Column type strings from the catalog are never
    /// consulted; the driver performs any coercion against table metadata.
    pub fn json_to_cql(v: &Value) -> Result<CqlValue> {
        match v {
            Value::String(s) => Ok(CqlValue::Text(s.clone())),
            Value::Bool(b) => Ok(CqlValue::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CqlValue::BigInt(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CqlValue::Double(f))
                } else {
                    Err(Error::InvalidInput(format!("unsupported numeric value {n}")))
                }
            }
            Value::Array(items) => {
                let values = items.iter().map(json_to_cql).collect::<Result<Vec<_>>>()?;
                Ok(CqlValue::List(values))
            }
            Value::Null => Err(Error::InvalidInput(
                "null cannot be bound as a parameter; omit the column instead".into(),
            )),
            Value::Object(_) => Err(Error::InvalidInput(
                "nested objects cannot be bound as parameters".into(),
            )),
        }
    }

    pub fn cql_to_json(v: &CqlValue) -> Value {
        match v {
            CqlValue::Boolean(b) => Value::Bool(*b),
            CqlValue::Int(i) => Value::from(*i),
            CqlValue::BigInt(i) => Value::from(*i),
            CqlValue::Float(f) => Value::from(*f),
            CqlValue::Double(f) => Value::from(*f),
            CqlValue::Ascii(s) | CqlValue::Text(s) => Value::from(s.clone()),
            CqlValue::Uuid(u) => Value::from(u.to_string()),
            CqlValue::Timeuuid(u) => Value::from(u.to_string()),
            CqlValue::Blob(bytes) => Value::from(B64.encode(bytes)),
            CqlValue::List(items) => Value::Array(items.iter().map(cql_to_json).collect()),
            CqlValue::Set(items) => Value::Array(items.iter().map(cql_to_json).collect()),
            CqlValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (cql_map_key_to_string(k), cql_to_json(v)))
                    .collect(),
            ),
            CqlValue::Tuple(values) => Value::Array(
                values
                    .iter()
                    .map(|opt| opt.as_ref().map(cql_to_json).unwrap_or(Value::Null))
                    .collect(),
            ),
            _ => Value::from(format!("{:?}", v)),
        }
    }

    fn cql_map_key_to_string(k: &CqlValue) -> String {
        match k {
            CqlValue::Ascii(s) | CqlValue::Text(s) => s.clone(),
            CqlValue::Uuid(u) => u.to_string(),
            CqlValue::Int(i) => i.to_string(),
            CqlValue::BigInt(i) => i.to_string(),
            _ => format!("{:?}", k),
        }
    }

    /// Map one driver row to a record, column names taken from the result's
    /// column specs, order as returned by the driver.
    pub fn row_to_record(specs: &[ColumnSpec], row: &Row) -> Record {
        let mut record = Map::new();
        for (i, spec) in specs.iter().enumerate() {
            let val = row.columns.get(i).and_then(|o| o.as_ref());
            let json = match val {
                Some(c) => cql_to_json(c),
                None => Value::Null,
            };
            record.insert(spec.name.clone(), json);
        }
        record
    }
}

pub mod statement {
    use scylla_cql::frame::response::result::CqlValue;

    use crate::error::{Error, Result};
    use crate::record::Record;
    use crate::value::json_to_cql;

    /// One parameterized statement: CQL text with positional placeholders
    /// plus the bound values in placeholder order.
    #[derive(Debug, Clone)]
    pub struct BuiltStatement {
        pub cql: String,
        pub values: Vec<CqlValue>,
    }

    fn sanitize_ident(ident: &str) -> bool {
        let bytes = ident.as_bytes();
        if bytes.is_empty() {
            return false;
        }
        let first = bytes[0];
        let is_letter = |c: u8| c.is_ascii_alphabetic() || c == b'_';
        let is_alnum = |c: u8| c.is_ascii_alphanumeric() || c == b'_';
        if !is_letter(first) {
            return false;
        }
        bytes.iter().all(|&c| is_alnum(c))
    }

    fn check_ident(ident: &str) -> Result<()> {
        if sanitize_ident(ident) {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!("invalid identifier '{ident}'")))
        }
    }

    pub fn insert(table: &str, row: &Record) -> Result<BuiltStatement> {
        check_ident(table)?;
        if row.is_empty() {
            return Err(Error::InvalidInput(
                "insert requires at least one column".into(),
            ));
        }
        let mut columns: Vec<&str> = Vec::with_capacity(row.len());
        let mut values: Vec<CqlValue> = Vec::with_capacity(row.len());
        for (k, v) in row {
            check_ident(k)?;
            columns.push(k.as_str());
            values.push(json_to_cql(v)?);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let cql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        Ok(BuiltStatement { cql, values })
    }

    pub fn select(
        table: &str,
        conditions: Option<&Record>,
        columns: Option<&[String]>,
    ) -> Result<BuiltStatement> {
        check_ident(table)?;
        let projection = match columns {
            Some(cols) => {
                if cols.is_empty() {
                    return Err(Error::InvalidInput("columns must not be empty".into()));
                }
                for c in cols {
                    check_ident(c)?;
                }
                cols.join(", ")
            }
            None => "*".to_string(),
        };
        let mut values = Vec::new();
        let clause = match conditions {
            Some(conditions) => where_clause(conditions, &mut values)?,
            None => String::new(),
        };
        let cql = format!("SELECT {} FROM {}{}", projection, table, clause);
        Ok(BuiltStatement { cql, values })
    }

    pub fn update(table: &str, data: &Record, conditions: &Record) -> Result<BuiltStatement> {
        check_ident(table)?;
        if data.is_empty() {
            return Err(Error::InvalidInput(
                "update requires at least one column to set".into(),
            ));
        }
        if conditions.is_empty() {
            return Err(Error::InvalidInput(
                "update requires at least one condition".into(),
            ));
        }
        let mut values = Vec::new();
        let mut set_clause = String::new();
        for (i, (k, v)) in data.iter().enumerate() {
            check_ident(k)?;
            if i > 0 {
                set_clause.push_str(", ");
            }
            set_clause.push_str(k);
            set_clause.push_str(" = ?");
            values.push(json_to_cql(v)?);
        }
        let clause = where_clause(conditions, &mut values)?;
        let cql = format!("UPDATE {} SET {}{}", table, set_clause, clause);
        Ok(BuiltStatement { cql, values })
    }

    /// An unconditional delete can never be built here; callers wanting a
    /// full-table delete must issue a raw statement.
    pub fn delete(table: &str, conditions: &Record) -> Result<BuiltStatement> {
        check_ident(table)?;
        if conditions.is_empty() {
            return Err(Error::InvalidInput(
                "delete requires at least one condition".into(),
            ));
        }
        let mut values = Vec::new();
        let clause = where_clause(conditions, &mut values)?;
        let cql = format!("DELETE FROM {}{}", table, clause);
        Ok(BuiltStatement { cql, values })
    }

    // Conditions are conjoined with AND only. A sequence value becomes a
    // membership test, `col IN ?`, bound as one list parameter.
    fn where_clause(conditions: &Record, values: &mut Vec<CqlValue>) -> Result<String> {
        let mut clause = String::new();
        let mut first = true;
        for (k, v) in conditions {
            check_ident(k)?;
            clause.push_str(if first { " WHERE " } else { " AND " });
            first = false;
            clause.push_str(k);
            if v.is_array() {
                clause.push_str(" IN ?");
            } else {
                clause.push_str(" = ?");
            }
            values.push(json_to_cql(v)?);
        }
        Ok(clause)
    }
}

pub mod catalog {
    use std::collections::HashMap;

    use scylla::Session;
    use tracing::{info, warn};

    use crate::error::{Error, Result};
    use crate::record::{record_name, TableDescriptor};

    /// Per-keyspace mapping from table name to descriptor. Populated once by
    /// `discover`, read-only afterwards, so concurrent CRUD callers share it
    /// without synchronization.
    #[derive(Debug, Default)]
    pub struct Catalog {
        tables: HashMap<String, TableDescriptor>,
    }

    impl Catalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Query the keyspace's metadata and build one descriptor per table:
        /// one round trip for the table list, then two per table (columns,
        /// partition-key columns). A table whose metadata cannot be read is
        /// skipped with a warning; the catalog stays partial rather than
        /// failing discovery as a whole.
        pub async fn discover(session: &Session, keyspace: &str) -> Catalog {
            let mut catalog = Catalog::new();
            let names = match table_names(session, keyspace).await {
                Ok(names) => names,
                Err(err) => {
                    warn!(%keyspace, error = %err, "table discovery failed");
                    return catalog;
                }
            };
            for table in names {
                match describe(session, keyspace, &table).await {
                    Ok(Some(descriptor)) => catalog.insert(descriptor),
                    Ok(None) => {
                        warn!(%keyspace, %table, "no columns reported; skipping table");
                    }
                    Err(err) => {
                        warn!(%keyspace, %table, error = %err, "schema query failed; skipping table");
                    }
                }
            }
            info!(%keyspace, tables = catalog.len(), "catalog populated");
            catalog
        }

        pub fn insert(&mut self, descriptor: TableDescriptor) {
            self.tables.insert(descriptor.table_name.clone(), descriptor);
        }

        pub fn lookup(&self, table: &str) -> Option<&TableDescriptor> {
            self.tables.get(table)
        }

        /// Lookup for the CRUD entry points: absence is a caller-visible
        /// error, raised before any statement reaches the driver. The
        /// catalog is never refreshed to recover from it.
        pub fn require(&self, table: &str) -> Result<&TableDescriptor> {
            self.lookup(table)
                .ok_or_else(|| Error::TableNotFound(table.to_string()))
        }

        pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
            self.tables.values()
        }

        pub fn len(&self) -> usize {
            self.tables.len()
        }

        pub fn is_empty(&self) -> bool {
            self.tables.is_empty()
        }
    }

    async fn table_names(session: &Session, keyspace: &str) -> anyhow::Result<Vec<String>> {
        let result = session
            .query_unpaged(
                "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ?",
                (keyspace.to_string(),),
            )
            .await?;
        let mut names = Vec::new();
        for row in result.rows_typed::<(String,)>()? {
            let (name,) = row?;
            names.push(name);
        }
        Ok(names)
    }

    async fn describe(
        session: &Session,
        keyspace: &str,
        table: &str,
    ) -> anyhow::Result<Option<TableDescriptor>> {
        let result = session
            .query_unpaged(
                "SELECT column_name, type FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?",
                (keyspace.to_string(), table.to_string()),
            )
            .await?;
        let mut columns = HashMap::new();
        for row in result.rows_typed::<(String, String)>()? {
            let (name, ty) = row?;
            columns.insert(name, ty);
        }
        if columns.is_empty() {
            return Ok(None);
        }
        let result = session
            .query_unpaged(
                "SELECT column_name, position FROM system_schema.columns \
                 WHERE keyspace_name = ? AND table_name = ? AND kind = 'partition_key' ALLOW FILTERING",
                (keyspace.to_string(), table.to_string()),
            )
            .await?;
        let mut keyed: Vec<(i32, String)> = Vec::new();
        for row in result.rows_typed::<(String, i32)>()? {
            let (name, position) = row?;
            keyed.push((position, name));
        }
        // Metadata row order is not guaranteed for composite keys; sort by
        // the declared position so the key column order is deterministic.
        keyed.sort_by_key(|(position, _)| *position);
        let partition_keys = keyed.into_iter().map(|(_, name)| name).collect();
        Ok(Some(TableDescriptor {
            record_name: record_name(table),
            table_name: table.to_string(),
            partition_keys,
            columns,
        }))
    }
}

pub mod crud {
    use std::time::Duration;

    use scylla::batch::{Batch, BatchType};
    use scylla::statement::Consistency;
    use scylla::transport::errors::{NewSessionError, QueryError};
    use scylla::{ExecutionProfile, QueryResult, Session, SessionBuilder};
    use scylla_cql::frame::response::result::CqlValue;
    use serde_json::Value;
    use tokio::time::sleep;
    use tracing::{debug, error, info};

    use crate::catalog::Catalog;
    use crate::error::{Error, Result};
    use crate::record::Record;
    use crate::statement::{self, BuiltStatement};
    use crate::value::{json_to_cql, row_to_record};

    const CONNECT_ATTEMPTS: u32 = 3;
    const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

    pub struct ConnectOptions {
        pub nodes: Vec<String>,
        pub keyspace: String,
        pub username: Option<String>,
        pub password: Option<String>,
        pub consistency: Consistency,
        pub request_timeout: Duration,
        #[cfg(feature = "ssl")]
        pub ssl_context: Option<openssl::ssl::SslContext>,
    }

    impl ConnectOptions {
        pub fn new(nodes: Vec<String>, keyspace: impl Into<String>) -> Self {
            Self {
                nodes,
                keyspace: keyspace.into(),
                username: None,
                password: None,
                consistency: Consistency::LocalQuorum,
                request_timeout: Duration::from_secs(15),
                #[cfg(feature = "ssl")]
                ssl_context: None,
            }
        }

        pub fn credentials(
            mut self,
            username: impl Into<String>,
            password: impl Into<String>,
        ) -> Self {
            self.username = Some(username.into());
            self.password = Some(password.into());
            self
        }

        pub fn consistency(mut self, consistency: Consistency) -> Self {
            self.consistency = consistency;
            self
        }

        pub fn request_timeout(mut self, timeout: Duration) -> Self {
            self.request_timeout = timeout;
            self
        }
    }

    /// CRUD facade over one driver session and one read-only catalog. Every
    /// operation is a single-shot translation plus one driver round trip;
    /// retries, timeouts, and consistency belong to the driver.
    pub struct Crud {
        session: Session,
        catalog: Catalog,
    }

    impl Crud {
        /// Connect and discover the keyspace's schema. Session establishment
        /// is retried up to 3 times, 1s apart, then surfaces a fatal
        /// connection error.
        pub async fn connect(options: ConnectOptions) -> Result<Self> {
            let keyspace = options.keyspace.clone();
            let session = establish(&options).await?;
            let catalog = Catalog::discover(&session, &keyspace).await;
            Ok(Self::new(session, catalog))
        }

        /// Wire a pre-built session to a pre-built catalog. Several facades
        /// with independent catalogs can coexist in one process.
        pub fn new(session: Session, catalog: Catalog) -> Self {
            Self { session, catalog }
        }

        pub fn catalog(&self) -> &Catalog {
            &self.catalog
        }

        pub fn session(&self) -> &Session {
            &self.session
        }

        /// Insert one row (a JSON object) or many (an array of objects
        /// sharing one column set). Bulk input is sent as a single logged
        /// batch: one round trip, not a transaction. An empty array is a
        /// no-op.
        pub async fn create(&self, table: &str, rows: &Value) -> Result<()> {
            self.catalog.require(table)?;
            let rows = normalize_rows(rows)?;
            let Some(first) = rows.first() else {
                debug!(%table, "empty bulk insert; nothing to do");
                return Ok(());
            };
            let built = statement::insert(table, first)?;
            if rows.len() == 1 {
                self.execute(&built).await?;
                return Ok(());
            }
            let mut batch = Batch::new(BatchType::Logged);
            let mut values: Vec<Vec<CqlValue>> = Vec::with_capacity(rows.len());
            values.push(built.values.clone());
            for row in rows.iter().skip(1) {
                // Bind in the first row's column order; key sets are already
                // checked equal.
                let mut row_values = Vec::with_capacity(first.len());
                for k in first.keys() {
                    match row.get(k) {
                        Some(v) => row_values.push(json_to_cql(v)?),
                        None => {
                            return Err(Error::InvalidInput(
                                "bulk insert rows must share one column set".into(),
                            ))
                        }
                    }
                }
                values.push(row_values);
            }
            for _ in 0..values.len() {
                batch.append_statement(built.cql.as_str());
            }
            debug!(%table, cql = %built.cql, rows = values.len(), "executing batch insert");
            self.session
                .batch(&batch, values)
                .await
                .map_err(|source| fail(&built.cql, source))?;
            Ok(())
        }

        /// Select rows, optionally filtered and projected. Results come back
        /// in driver order; zero matches yield an empty vec.
        pub async fn read(
            &self,
            table: &str,
            conditions: Option<&Record>,
            columns: Option<&[String]>,
        ) -> Result<Vec<Record>> {
            self.catalog.require(table)?;
            let built = statement::select(table, conditions, columns)?;
            let result = self.execute(&built).await?;
            let specs = result.col_specs().to_owned();
            let rows = result.rows_or_empty();
            Ok(rows.iter().map(|row| row_to_record(&specs, row)).collect())
        }

        pub async fn update(&self, table: &str, data: &Record, conditions: &Record) -> Result<()> {
            self.catalog.require(table)?;
            let built = statement::update(table, data, conditions)?;
            self.execute(&built).await?;
            Ok(())
        }

        pub async fn delete(&self, table: &str, conditions: &Record) -> Result<()> {
            self.catalog.require(table)?;
            let built = statement::delete(table, conditions)?;
            self.execute(&built).await?;
            Ok(())
        }

        /// Pass a statement straight through to the driver, no catalog
        /// involvement; rows come back unmodified as records.
        pub async fn execute_raw(&self, query: &str, params: &[Value]) -> Result<Vec<Record>> {
            let values = params.iter().map(json_to_cql).collect::<Result<Vec<_>>>()?;
            let built = BuiltStatement {
                cql: query.to_string(),
                values,
            };
            let result = self.execute(&built).await?;
            let specs = result.col_specs().to_owned();
            let rows = result.rows_or_empty();
            Ok(rows.iter().map(|row| row_to_record(&specs, row)).collect())
        }

        async fn execute(&self, built: &BuiltStatement) -> Result<QueryResult> {
            debug!(cql = %built.cql, "executing");
            let prepared = self
                .session
                .prepare(built.cql.clone())
                .await
                .map_err(|source| fail(&built.cql, source))?;
            self.session
                .execute_unpaged(&prepared, &built.values[..])
                .await
                .map_err(|source| fail(&built.cql, source))
        }
    }

    fn fail(cql: &str, source: QueryError) -> Error {
        error!(%cql, error = %source, "query execution failed");
        Error::Query {
            cql: cql.to_string(),
            source,
        }
    }

    /// Shape check for `create` input: one object, or an array of objects
    /// sharing one key set. An empty array normalizes to zero rows.
    pub fn normalize_rows(rows: &Value) -> Result<Vec<&Record>> {
        match rows {
            Value::Object(row) => Ok(vec![row]),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(row) => out.push(row),
                        _ => {
                            return Err(Error::InvalidInput(
                                "bulk insert expects an array of objects".into(),
                            ))
                        }
                    }
                }
                if let Some((first, rest)) = out.split_first() {
                    for row in rest {
                        let same =
                            row.len() == first.len() && row.keys().all(|k| first.contains_key(k));
                        if !same {
                            return Err(Error::InvalidInput(
                                "bulk insert rows must share one column set".into(),
                            ));
                        }
                    }
                }
                Ok(out)
            }
            _ => Err(Error::InvalidInput(
                "rows must be an object or an array of objects".into(),
            )),
        }
    }

    async fn establish(options: &ConnectOptions) -> Result<Session> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build_session(options).await {
                Ok(session) => {
                    info!(keyspace = %options.keyspace, attempt, "connected");
                    return Ok(session);
                }
                Err(source) => {
                    error!(attempt, error = %source, "connection attempt failed");
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(Error::Connection {
                            attempts: attempt,
                            source,
                        });
                    }
                    sleep(CONNECT_BACKOFF).await;
                }
            }
        }
    }

    async fn build_session(
        options: &ConnectOptions,
    ) -> std::result::Result<Session, NewSessionError> {
        let profile = ExecutionProfile::builder()
            .consistency(options.consistency)
            .request_timeout(Some(options.request_timeout))
            .build();
        let mut sb = SessionBuilder::new().default_execution_profile_handle(profile.into_handle());
        for node in &options.nodes {
            sb = sb.known_node(node);
        }
        if let (Some(user), Some(pass)) = (&options.username, &options.password) {
            sb = sb.user(user.as_str(), pass.as_str());
        }
        #[cfg(feature = "ssl")]
        if let Some(ctx) = &options.ssl_context {
            sb = sb.ssl_context(Some(ctx.clone()));
        }
        sb.use_keyspace(&options.keyspace, false).build().await
    }
}
