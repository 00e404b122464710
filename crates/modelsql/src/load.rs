//! Schema source directory loading.
//!
//! A schema directory holds one `<Name>.json` file per entity (UpperCamel
//! stems), a `.database.json` config, and an optional `.types.json` with
//! custom scalar types layered over the driver defaults.

use crate::error::{ModelError, ModelResult};
use crate::model::{DatabaseConfig, DomainModel};
use crate::pg::DriverRegistry;
use crate::schema::{Schema, is_entity_name};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read `.database.json`; a missing file yields the default config.
pub fn load_database_config(dir: &Path) -> ModelResult<DatabaseConfig> {
    let path = dir.join(".database.json");
    if !path.exists() {
        return Ok(DatabaseConfig::default());
    }
    let text = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

fn custom_type(name: &str, value: &Value) -> ModelResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        // long form may carry per-target columns; the column type is under "pg"
        Value::Object(map) => map
            .get("pg")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ModelError::compile(format!("custom type {name} has no pg mapping"))),
        _ => Err(ModelError::compile(format!(
            "custom type {name} must be a string or object"
        ))),
    }
}

fn load_types(dir: &Path, driver: &str) -> ModelResult<BTreeMap<String, String>> {
    let registry = DriverRegistry::default();
    let mut types = registry
        .types(driver)
        .cloned()
        .ok_or_else(|| ModelError::compile(format!("unknown driver: {driver}")))?;
    let path = dir.join(".types.json");
    if path.exists() {
        let text = fs::read_to_string(&path)?;
        let raw: Value = serde_json::from_str(&text)?;
        let map = raw
            .as_object()
            .ok_or_else(|| ModelError::compile(".types.json must be a JSON object"))?;
        for (name, value) in map {
            types.insert(name.clone(), custom_type(name, value)?);
        }
    }
    Ok(types)
}

/// Load a schema directory into a compiled [`DomainModel`].
pub fn load_model(dir: impl AsRef<Path>) -> ModelResult<DomainModel> {
    let dir = dir.as_ref();
    let database = load_database_config(dir)?;
    let types = load_types(dir, &database.driver)?;

    let mut entities = BTreeMap::new();
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().is_some_and(|ext| ext == "json")
                && p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(is_entity_name)
        })
        .collect();
    paths.sort();

    for path in paths {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ModelError::compile(format!("bad file name: {}", path.display())))?
            .to_string();
        let text = fs::read_to_string(&path)?;
        let raw: Value = serde_json::from_str(&text)?;
        let schema = Schema::from_value(&name, &raw)?;
        debug!(entity = %name, kind = schema.kind.as_str(), "entity loaded");
        entities.insert(name, schema);
    }

    Ok(DomainModel::new(database, types, entities))
}

/// Persist a bumped version back into `.database.json`, keeping the rest of
/// the file intact.
pub fn save_version(dir: &Path, version: u32) -> ModelResult<()> {
    let path = dir.join(".database.json");
    let mut raw: Value = if path.exists() {
        serde_json::from_str(&fs::read_to_string(&path)?)?
    } else {
        serde_json::json!({})
    };
    let obj = raw
        .as_object_mut()
        .ok_or_else(|| ModelError::compile(".database.json must be a JSON object"))?;
    obj.insert("version".to_string(), serde_json::json!(version));
    fs::write(&path, serde_json::to_string_pretty(&raw)? + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_model, save_version};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_temp_dir() -> std::path::PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("modelsql-load-test-{nonce}"));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn loads_entities_and_config() {
        let dir = make_temp_dir();
        std::fs::write(
            dir.join(".database.json"),
            r#"{ "name": "example", "driver": "pg", "version": 3 }"#,
        )
        .expect("write");
        std::fs::write(
            dir.join("Country.json"),
            r#"{ "Country": "dictionary global", "name": "string" }"#,
        )
        .expect("write");
        std::fs::write(
            dir.join("City.json"),
            r#"{ "City": "dictionary global", "country": "Country", "name": "string" }"#,
        )
        .expect("write");

        let model = load_model(&dir).expect("load");
        assert_eq!(model.database.name, "example");
        assert_eq!(model.database.version, 3);
        assert_eq!(model.order, vec!["Country".to_string(), "City".to_string()]);

        std::fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn custom_types_override_driver_defaults() {
        let dir = make_temp_dir();
        std::fs::write(dir.join(".database.json"), r#"{ "driver": "pg" }"#).expect("write");
        std::fs::write(dir.join(".types.json"), r#"{ "slug": "varchar" }"#).expect("write");
        std::fs::write(
            dir.join("Post.json"),
            r#"{ "Post": "entity", "slug": "slug", "body": "text" }"#,
        )
        .expect("write");

        let model = load_model(&dir).expect("load");
        assert_eq!(model.types.get("slug").map(String::as_str), Some("varchar"));
        assert!(model.entities["Post"].fields.contains_key("slug"));

        std::fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn save_version_updates_config() {
        let dir = make_temp_dir();
        std::fs::write(
            dir.join(".database.json"),
            r#"{ "name": "example", "version": 1 }"#,
        )
        .expect("write");

        save_version(&dir, 2).expect("save");
        let model = load_model(&dir).expect("load");
        assert_eq!(model.database.version, 2);
        assert_eq!(model.database.name, "example");

        std::fs::remove_dir_all(dir).expect("cleanup");
    }
}
