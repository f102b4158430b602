use std::collections::BTreeMap;

use mlw_core::errors::{ErrorInfo, MlwError};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::model::RegisteredModel;

pub const SCHEMA_VERSION: i64 = 1;

pub(crate) fn db_error(code: &str, err: impl ToString) -> MlwError {
    MlwError::Storage(ErrorInfo::new(code, err.to_string()))
}

/// Creates the tables and checks the schema version in one `IMMEDIATE`
/// transaction; nothing stays open on `conn` when this fails.
pub fn init_schema(conn: &mut Connection) -> Result<(), MlwError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| db_error("registry.schema", err))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
        CREATE TABLE IF NOT EXISTS model_counters(
            name TEXT PRIMARY KEY,
            next_version INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS model_versions(
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            run_id TEXT NOT NULL,
            experiment TEXT NOT NULL,
            source_path TEXT NOT NULL,
            stored_path TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            tags TEXT NOT NULL,
            properties TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY(name, version)
        );",
    )
    .map_err(|err| db_error("registry.schema", err))?;
    set_version(&tx, SCHEMA_VERSION)?;
    tx.commit().map_err(|err| db_error("registry.schema", err))
}

fn set_version(conn: &Connection, version: i64) -> Result<(), MlwError> {
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| db_error("registry.schema", err))?;
    match existing {
        Some(current) if current == version => Ok(()),
        Some(current) => Err(MlwError::Storage(
            ErrorInfo::new(
                "registry.schema_version",
                format!("registry schema {current} incompatible with expected {version}"),
            ),
        )),
        None => {
            conn.execute("INSERT INTO meta(version) VALUES (?)", params![version])
                .map_err(|err| db_error("registry.schema", err))?;
            Ok(())
        }
    }
}

/// Reserves the next version for `name`. Must run inside an immediate
/// transaction so concurrent writers serialize on it.
pub fn reserve_version(tx: &Transaction<'_>, name: &str) -> Result<u32, MlwError> {
    let next: Option<u32> = tx
        .query_row(
            "SELECT next_version FROM model_counters WHERE name = ?",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error("registry.counter", err))?;
    let version = next.unwrap_or(1);
    tx.execute(
        "INSERT INTO model_counters(name, next_version) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET next_version = excluded.next_version",
        params![name, version + 1],
    )
    .map_err(|err| db_error("registry.counter", err))?;
    Ok(version)
}

fn to_json(map: &BTreeMap<String, String>) -> Result<String, MlwError> {
    mlw_core::to_canonical_json_string(map)
}

pub fn insert_model(conn: &Connection, model: &RegisteredModel) -> Result<(), MlwError> {
    conn.execute(
        "INSERT INTO model_versions(name, version, run_id, experiment, source_path, stored_path, sha256, tags, properties, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            model.name,
            model.version,
            model.run_id,
            model.experiment,
            model.source_path,
            model.stored_path.to_string_lossy().into_owned(),
            model.sha256,
            to_json(&model.tags)?,
            to_json(&model.properties)?,
            model.created_at,
        ],
    )
    .map_err(|err| db_error("registry.insert", err))?;
    Ok(())
}

const SELECT_MODEL: &str = "SELECT name, version, run_id, experiment, source_path, stored_path, sha256, tags, properties, created_at FROM model_versions";

fn row_to_model(row: &Row<'_>) -> rusqlite::Result<(RegisteredModel, String, String)> {
    let stored: String = row.get(5)?;
    Ok((
        RegisteredModel {
            name: row.get(0)?,
            version: row.get(1)?,
            run_id: row.get(2)?,
            experiment: row.get(3)?,
            source_path: row.get(4)?,
            stored_path: stored.into(),
            sha256: row.get(6)?,
            tags: BTreeMap::new(),
            properties: BTreeMap::new(),
            created_at: row.get(9)?,
        },
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode(
    (mut model, tags, properties): (RegisteredModel, String, String),
) -> Result<RegisteredModel, MlwError> {
    model.tags = mlw_core::from_json_slice(tags.as_bytes())?;
    model.properties = mlw_core::from_json_slice(properties.as_bytes())?;
    Ok(model)
}

fn query_models(
    conn: &Connection,
    clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<RegisteredModel>, MlwError> {
    let sql = format!("{SELECT_MODEL} {clause}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| db_error("registry.query", err))?;
    let rows = stmt
        .query_map(args, row_to_model)
        .map_err(|err| db_error("registry.query", err))?;
    let raw = rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| db_error("registry.query", err))?;
    raw.into_iter().map(decode).collect()
}

pub fn load_models(conn: &Connection) -> Result<Vec<RegisteredModel>, MlwError> {
    query_models(conn, "ORDER BY name, version", &[])
}

pub fn load_versions(conn: &Connection, name: &str) -> Result<Vec<RegisteredModel>, MlwError> {
    query_models(conn, "WHERE name = ? ORDER BY version", params![name])
}

pub fn load_model(
    conn: &Connection,
    name: &str,
    version: u32,
) -> Result<Option<RegisteredModel>, MlwError> {
    Ok(query_models(conn, "WHERE name = ? AND version = ?", params![name, version])?
        .into_iter()
        .next())
}

pub fn delete_model(conn: &Connection, name: &str, version: u32) -> Result<bool, MlwError> {
    let removed = conn
        .execute(
            "DELETE FROM model_versions WHERE name = ? AND version = ?",
            params![name, version],
        )
        .map_err(|err| db_error("registry.delete", err))?;
    Ok(removed > 0)
}
