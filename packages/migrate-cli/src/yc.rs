//! Database inventory via the `yc` CLI.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::cmd_builder::CmdBuilder;
use crate::context::AppContext;

/// Raw entry as printed by `yc ydb database list --format json`
#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
}

/// A YDB database the current profile can see.
#[derive(Debug, Clone)]
pub struct Database {
    pub id: String,
    pub name: String,
    /// `scheme://host:port`, with the database query parameter stripped
    pub endpoint: String,
    /// Absolute database path, e.g. `/ru-central1/b1gcloud/etn0db`
    pub database: String,
}

pub fn list_databases(ctx: &AppContext) -> Result<Vec<Database>> {
    let out = CmdBuilder::new("yc")
        .args(["ydb", "database", "list", "--format", "json"])
        .timeout(ctx.config.yc_timeout())
        .run_capture()?;
    ctx.debug_block("yc ydb database list", &out.combined());
    if !out.success() {
        bail!(
            "yc ydb database list failed: {}",
            out.stderr_string().trim()
        );
    }
    let databases = parse_database_list(&out.stdout_string())?;
    if databases.is_empty() {
        bail!("no YDB databases visible to the current yc profile");
    }
    Ok(databases)
}

/// Normalize the JSON listing. Entries without a parseable endpoint or an
/// absolute database path are skipped.
pub fn parse_database_list(json: &str) -> Result<Vec<Database>> {
    let raw: Vec<RawDatabase> =
        serde_json::from_str(json).context("unexpected `yc ydb database list` output")?;
    let mut databases = Vec::new();
    for item in raw {
        let RawDatabase { id, name, endpoint } = item;
        let resolved_id = id.clone().or_else(|| name.clone()).unwrap_or_default();
        let resolved_name = name.or(id).unwrap_or_default();
        let Some(full) = endpoint else { continue };
        let Some((endpoint, database)) = split_endpoint(&full) else {
            continue;
        };
        if !database.starts_with('/') {
            continue;
        }
        databases.push(Database {
            id: resolved_id,
            name: resolved_name,
            endpoint,
            database,
        });
    }
    Ok(databases)
}

/// Split a full endpoint URL like
/// `grpcs://ydb.serverless.yandexcloud.net:2135/?database=/ru-central1/a/b`
/// into the bare endpoint and the database path.
pub fn split_endpoint(full: &str) -> Option<(String, String)> {
    let url = Url::parse(full).ok()?;
    let database = url
        .query_pairs()
        .find(|(key, _)| key == "database")
        .map(|(_, value)| value.to_string())?;
    let host = url.host_str()?;
    let endpoint = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    Some((endpoint, database))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
      {
        "id": "etn0example1",
        "name": "orders-db",
        "endpoint": "grpcs://ydb.serverless.yandexcloud.net:2135/?database=/ru-central1/b1gcloud/etn0example1",
        "created_at": "2024-03-01T10:00:00Z",
        "status": "RUNNING"
      },
      {
        "name": "unnamed-endpointless"
      },
      {
        "id": "etn0example2",
        "endpoint": "grpcs://ydb.serverless.yandexcloud.net:2135?database=/ru-central1/b1gcloud/etn0example2"
      }
    ]"#;

    #[test]
    fn test_parse_database_list() {
        let databases = parse_database_list(LISTING).unwrap();
        assert_eq!(databases.len(), 2);

        assert_eq!(databases[0].id, "etn0example1");
        assert_eq!(databases[0].name, "orders-db");
        assert_eq!(
            databases[0].endpoint,
            "grpcs://ydb.serverless.yandexcloud.net:2135"
        );
        assert_eq!(
            databases[0].database,
            "/ru-central1/b1gcloud/etn0example1"
        );

        // id doubles as the name when yc omits one
        assert_eq!(databases[1].name, "etn0example2");
    }

    #[test]
    fn test_parse_database_list_rejects_garbage() {
        assert!(parse_database_list("not json").is_err());
    }

    #[test]
    fn test_split_endpoint_without_database_param() {
        assert!(split_endpoint("grpcs://ydb.serverless.yandexcloud.net:2135").is_none());
    }

    #[test]
    fn test_split_endpoint_without_port() {
        let (endpoint, database) =
            split_endpoint("grpc://localhost?database=/local/dev/db1").unwrap();
        assert_eq!(endpoint, "grpc://localhost");
        assert_eq!(database, "/local/dev/db1");
    }
}
