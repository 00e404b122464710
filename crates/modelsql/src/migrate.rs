//! Schema versioning: history snapshots, migration stubs, and the runner
//! that applies `*-up.sql` scripts in version order.

use crate::db::ExecutionChannel;
use crate::error::{ModelError, ModelResult};
use crate::load::{load_database_config, save_version};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a successful [`generate`] run.
#[derive(Debug)]
pub struct GeneratedMigration {
    pub version: u32,
    pub history_dir: PathBuf,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
    /// Entity files snapshotted because they differ from the previous version.
    pub changed: Vec<String>,
}

fn parse_history_version(name: &str) -> Option<u32> {
    let (_, tail) = name.rsplit_once('v')?;
    tail.parse().ok()
}

fn parse_migration_version(name: &str) -> Option<u32> {
    let stem = name.strip_suffix("-up.sql")?;
    parse_history_version(stem)
}

/// Latest snapshot under `history/`, if any.
fn previous_version(schema_dir: &Path) -> ModelResult<Option<(u32, PathBuf)>> {
    let history = schema_dir.join("history");
    if !history.is_dir() {
        return Ok(None);
    }
    let mut latest: Option<(u32, PathBuf)> = None;
    for entry in fs::read_dir(&history)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(version) = parse_history_version(&name) {
            if latest.as_ref().is_none_or(|(v, _)| version > *v) {
                latest = Some((version, entry.path()));
            }
        }
    }
    Ok(latest)
}

/// Schema files worth snapshotting: `*.json` including dot files like
/// `.database.json` and `.types.json`.
fn schema_files(schema_dir: &Path) -> ModelResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(schema_dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Structural comparison: formatting-only edits do not count as a change.
fn definition_changed(current: &str, previous: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(current),
        serde_json::from_str::<serde_json::Value>(previous),
    ) {
        (Ok(a), Ok(b)) => a != b,
        _ => current != previous,
    }
}

fn copy_snapshot(schema_dir: &Path, dest: &Path, names: &[String]) -> ModelResult<()> {
    fs::create_dir_all(dest)?;
    for name in names {
        fs::copy(schema_dir.join(name), dest.join(name))?;
    }
    Ok(())
}

/// Create a new schema version: snapshot changed entity files under
/// `history/<yyyy-mm-dd>-v<N>/`, write empty `migration/<yyyy-mm-dd>-v<N>-up.sql`
/// and `-dn.sql` stubs, and persist the bumped version into `.database.json`.
///
/// The first run writes a baseline snapshot and no migration stubs. Returns
/// `Ok(None)` when nothing changed since the latest snapshot.
pub fn generate(schema_dir: &Path) -> ModelResult<Option<GeneratedMigration>> {
    let config = load_database_config(schema_dir)?;
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let names = schema_files(schema_dir)?;

    let Some((prev_version, prev_dir)) = previous_version(schema_dir)? else {
        let version = config.version.max(1);
        let dest = schema_dir
            .join("history")
            .join(format!("{date}-v{version}"));
        copy_snapshot(schema_dir, &dest, &names)?;
        if config.version != version {
            save_version(schema_dir, version)?;
        }
        info!(version, path = %dest.display(), "baseline snapshot written");
        return Ok(None);
    };

    let mut changed = Vec::new();
    for name in &names {
        let current = fs::read_to_string(schema_dir.join(name))?;
        let previous = fs::read_to_string(prev_dir.join(name)).unwrap_or_default();
        if definition_changed(&current, &previous) {
            changed.push(name.clone());
        }
    }
    if changed.is_empty() && config.version <= prev_version {
        info!("schema is unchanged, migration is not needed");
        return Ok(None);
    }

    let version = config.version.max(prev_version + 1);
    save_version(schema_dir, version)?;

    let history_dir = schema_dir
        .join("history")
        .join(format!("{date}-v{version}"));
    // re-read names so the snapshot carries the bumped .database.json
    let mut snapshot = changed.clone();
    if !snapshot.contains(&".database.json".to_string()) {
        snapshot.push(".database.json".to_string());
        snapshot.sort();
    }
    copy_snapshot(schema_dir, &history_dir, &snapshot)?;

    let migration_dir = schema_dir.join("migration");
    fs::create_dir_all(&migration_dir)?;
    let up_path = migration_dir.join(format!("{date}-v{version}-up.sql"));
    let down_path = migration_dir.join(format!("{date}-v{version}-dn.sql"));
    fs::write(&up_path, "")?;
    fs::write(&down_path, "")?;
    info!(version, changed = changed.len(), "migration stubs written");

    Ok(Some(GeneratedMigration {
        version,
        history_dir,
        up_path,
        down_path,
        changed,
    }))
}

fn migration_dir(schema_dir: &Path) -> Option<PathBuf> {
    ["migrations", "migration"]
        .iter()
        .map(|name| schema_dir.join(name))
        .find(|path| path.is_dir())
}

/// Apply every `*-up.sql` script with a version at or below `target`
/// (all of them when `target` is `None`), ascending.
pub async fn migrate<C: ExecutionChannel>(
    channel: &C,
    schema_dir: &Path,
    target: Option<u32>,
) -> ModelResult<()> {
    let dir = migration_dir(schema_dir).ok_or_else(|| {
        ModelError::migration(format!(
            "no migration directory in {}",
            schema_dir.display()
        ))
    })?;
    let mut scripts: Vec<(u32, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(version) = parse_migration_version(&name) {
            scripts.push((version, entry.path()));
        }
    }
    scripts.sort();
    for (version, path) in scripts {
        if target.is_some_and(|t| version > t) {
            continue;
        }
        let sql = fs::read_to_string(&path)?;
        if sql.trim().is_empty() {
            debug!(version, path = %path.display(), "skip empty migration");
            continue;
        }
        info!(version, path = %path.display(), "apply migration");
        channel.run_script(&sql).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{definition_changed, generate, migrate, parse_history_version, parse_migration_version};
    use crate::db::{ExecutionChannel, RowData};
    use crate::error::ModelResult;
    use crate::value::SqlValue;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("{prefix}-{nonce}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn write_schema(dir: &PathBuf, version: u32) {
        fs::write(
            dir.join(".database.json"),
            format!(
                "{{\n  \"name\": \"example\",\n  \"driver\": \"pg\",\n  \"version\": {version}\n}}\n"
            ),
        )
        .expect("write config");
        fs::write(
            dir.join("City.json"),
            "{\n  \"Dictionary\": {},\n  \"name\": \"string\"\n}\n",
        )
        .expect("write entity");
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_history_version("2023-10-08-v5"), Some(5));
        assert_eq!(parse_history_version("notes"), None);
        assert_eq!(parse_migration_version("2023-10-08-v5-up.sql"), Some(5));
        assert_eq!(parse_migration_version("2023-10-08-v5-dn.sql"), None);
    }

    #[test]
    fn reformatting_is_not_a_change() {
        assert!(!definition_changed(
            "{\"a\": 1}",
            "{\n  \"a\": 1\n}\n"
        ));
        assert!(definition_changed("{\"a\": 1}", "{\"a\": 2}"));
    }

    #[test]
    fn first_generate_writes_baseline() {
        let dir = make_temp_dir("modelsql-baseline");
        write_schema(&dir, 1);

        let generated = generate(&dir).expect("generate");
        assert!(generated.is_none());
        let history: Vec<_> = fs::read_dir(dir.join("history"))
            .expect("history")
            .collect();
        assert_eq!(history.len(), 1);
        let snapshot = history[0].as_ref().expect("entry").path();
        assert!(snapshot.join("City.json").is_file());
        assert!(snapshot.join(".database.json").is_file());

        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn changed_entity_bumps_version_and_writes_stubs() {
        let dir = make_temp_dir("modelsql-generate");
        write_schema(&dir, 1);
        generate(&dir).expect("baseline");

        // unchanged schema is a no-op
        assert!(generate(&dir).expect("noop").is_none());

        fs::write(
            dir.join("City.json"),
            "{\n  \"Dictionary\": {},\n  \"name\": \"string\",\n  \"code\": \"string\"\n}\n",
        )
        .expect("change entity");
        let generated = generate(&dir).expect("generate").expect("some");
        assert_eq!(generated.version, 2);
        assert!(generated.changed.contains(&"City.json".to_string()));
        assert!(generated.up_path.is_file());
        assert!(generated.down_path.is_file());
        assert!(generated.history_dir.join("City.json").is_file());

        let config = crate::load::load_database_config(&dir).expect("config");
        assert_eq!(config.version, 2);

        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[derive(Default)]
    struct ScriptChannel {
        scripts: Mutex<Vec<String>>,
    }

    impl ExecutionChannel for ScriptChannel {
        async fn execute(&self, _sql: &str, _args: &[SqlValue]) -> ModelResult<Vec<RowData>> {
            Ok(Vec::new())
        }

        async fn run_script(&self, sql: &str) -> ModelResult<()> {
            self.scripts.lock().expect("lock").push(sql.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn runner_applies_up_scripts_in_order() {
        let dir = make_temp_dir("modelsql-migrate");
        let migrations = dir.join("migrations");
        fs::create_dir_all(&migrations).expect("mkdir");
        fs::write(migrations.join("2023-10-08-v2-up.sql"), "ALTER v2;").expect("write");
        fs::write(migrations.join("2023-10-01-v1-up.sql"), "ALTER v1;").expect("write");
        fs::write(migrations.join("2023-10-09-v3-up.sql"), "ALTER v3;").expect("write");
        fs::write(migrations.join("2023-10-08-v2-dn.sql"), "DROP v2;").expect("write");

        let channel = ScriptChannel::default();
        migrate(&channel, &dir, Some(2)).await.expect("migrate");
        let scripts = channel.scripts.lock().expect("lock").clone();
        assert_eq!(scripts, vec!["ALTER v1;".to_string(), "ALTER v2;".to_string()]);

        fs::remove_dir_all(&dir).expect("cleanup");
    }
}
