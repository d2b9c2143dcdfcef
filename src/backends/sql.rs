//! MySQL backend
//!
//! Only read statements are accepted: a single `SELECT` (capped with a row
//! limit) or `SHOW`. The driver needs the `mysql` feature; the query guard is
//! always available.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::config::Access;
use crate::error::EyeError;
use crate::service::Backend;

const DISALLOWED_KEYWORDS: [&str; 3] = [" UNION ", " LIMIT ", ";"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub access_key: String,
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_row_limit() -> usize {
    5
}

fn default_max_connections() -> u32 {
    4
}

/// Accept read-only statements and cap SELECTs with `LIMIT row_limit`
pub fn guard_query(query: &str, row_limit: usize) -> Result<String, EyeError> {
    let trimmed = query.trim();
    let upper = trimmed.to_uppercase();
    let normalized = format!(" {} ", upper.split_whitespace().collect::<Vec<_>>().join(" "));

    let is_select = normalized.starts_with(" SELECT ");
    if !is_select && !normalized.starts_with(" SHOW ") {
        return Err(EyeError::InvalidRequest(
            "Only SELECT/SHOW queries allowed".into(),
        ));
    }
    for keyword in DISALLOWED_KEYWORDS {
        if normalized.contains(keyword) {
            return Err(EyeError::InvalidRequest(format!(
                "'{}' is not allowed in queries",
                keyword.trim()
            )));
        }
    }

    if !is_select {
        return Ok(trimmed.to_string());
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, trimmed)
        .map_err(|e| EyeError::InvalidRequest(format!("invalid SQL: {}", e)))?;
    match statements.as_slice() {
        [Statement::Query(_)] => Ok(format!("{} LIMIT {}", trimmed, row_limit)),
        _ => Err(EyeError::InvalidRequest(
            "expected a single SELECT statement".into(),
        )),
    }
}

#[cfg(feature = "mysql")]
pub(crate) fn build(
    config: MySqlConfig,
    access: Option<Access>,
) -> Result<Arc<dyn Backend>, EyeError> {
    Ok(Arc::new(driver::MySqlBackend::new(config, access.unwrap_or_default())))
}

#[cfg(not(feature = "mysql"))]
pub(crate) fn build(
    _config: MySqlConfig,
    _access: Option<Access>,
) -> Result<Arc<dyn Backend>, EyeError> {
    Err(EyeError::Config(
        "mysql services need the `mysql` feature".into(),
    ))
}

#[cfg(feature = "mysql")]
mod driver {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::RwLock;
    use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
    use sqlx::{Column, Row};

    use super::{guard_query, MySqlConfig};
    use crate::config::Access;
    use crate::data::QueryResult;
    use crate::error::EyeError;
    use crate::service::Backend;

    pub struct MySqlBackend {
        config: MySqlConfig,
        access: Access,
        pool: RwLock<Option<MySqlPool>>,
    }

    impl MySqlBackend {
        pub fn new(config: MySqlConfig, access: Access) -> Self {
            Self {
                config,
                access,
                pool: RwLock::new(None),
            }
        }

        fn pool(&self) -> Result<MySqlPool, EyeError> {
            self.pool
                .read()
                .clone()
                .ok_or_else(|| EyeError::Connection("mysql pool not connected".into()))
        }
    }

    fn column_value(row: &MySqlRow, idx: usize) -> serde_json::Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v.map(|t| t.to_string().into()).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned().into())
                .unwrap_or_default();
        }
        serde_json::Value::Null
    }

    fn to_record(row: &MySqlRow) -> QueryResult {
        let mut map = serde_json::Map::new();
        for (idx, column) in row.columns().iter().enumerate() {
            map.insert(column.name().to_string(), column_value(row, idx));
        }
        QueryResult::from_map(map)
    }

    #[async_trait]
    impl Backend for MySqlBackend {
        fn kind(&self) -> &'static str {
            "mysql"
        }

        async fn connect(&self) -> Result<(), EyeError> {
            let options = MySqlConnectOptions::new()
                .host(&self.config.host)
                .port(self.config.port)
                .username(&self.access.user)
                .password(&self.access.password)
                .database(&self.config.database);
            let pool = MySqlPoolOptions::new()
                .max_connections(self.config.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options)
                .await
                .map_err(|e| EyeError::Connection(e.to_string()))?;
            *self.pool.write() = Some(pool);
            Ok(())
        }

        async fn ping(&self) -> Result<(), EyeError> {
            let pool = self.pool()?;
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(|e| EyeError::Connection(e.to_string()))
        }

        async fn disconnect(&self) {
            let pool = self.pool.write().take();
            if let Some(pool) = pool {
                pool.close().await;
            }
        }

        fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
            guard_query(query, self.config.row_limit)
        }

        async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
            let pool = self.pool()?;
            let rows = sqlx::query(query)
                .fetch_all(&pool)
                .await
                .map_err(|e| EyeError::Backend(e.to_string()))?;
            Ok(rows.iter().map(to_record).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_gets_row_limit() {
        let query = guard_query("select id, name from users where id > 3", 5).unwrap();
        assert_eq!(query, "select id, name from users where id > 3 LIMIT 5");
    }

    #[test]
    fn test_show_is_passed_through() {
        assert_eq!(
            guard_query("SHOW SLAVE STATUS", 5).unwrap(),
            "SHOW SLAVE STATUS"
        );
    }

    #[test]
    fn test_rejects_writes() {
        for query in [
            "DELETE FROM users",
            "UPDATE users SET a = 1",
            "DROP TABLE users",
        ] {
            assert!(matches!(
                guard_query(query, 5),
                Err(EyeError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_rejects_disallowed_keywords() {
        for query in [
            "SELECT 1 UNION SELECT 2",
            "SELECT * FROM users LIMIT 10",
            "SELECT 1; DROP TABLE users",
            "SELECT *\nFROM users\tlimit 3",
        ] {
            assert!(guard_query(query, 5).is_err(), "{}", query);
        }
    }

    #[test]
    fn test_rejects_invalid_sql() {
        assert!(matches!(
            guard_query("SELECT * FROM", 5),
            Err(EyeError::InvalidRequest(_))
        ));
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_build_without_driver() {
        let config: MySqlConfig =
            serde_json::from_str(r#"{"database": "shop", "access_key": "db"}"#).unwrap();
        assert!(matches!(build(config, None), Err(EyeError::Config(_))));
    }
}
