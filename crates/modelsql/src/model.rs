//! Compiled domain model: database config, type map, entities, and the
//! dependency-resolved generation order.

use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, warn};

fn default_driver() -> String {
    "pg".to_string()
}

/// Contents of `.database.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub version: u32,
    /// Optional connection string for the migration runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            driver: default_driver(),
            version: 0,
            connection: None,
        }
    }
}

/// The whole compiled model. Immutable after construction.
#[derive(Clone, Debug)]
pub struct DomainModel {
    pub database: DatabaseConfig,
    /// Scalar type name -> column type for the active driver.
    pub types: BTreeMap<String, String>,
    pub entities: BTreeMap<String, Schema>,
    /// Entity names in dependency (post-order DFS) order: referenced
    /// entities come before the entities that reference them.
    pub order: Vec<String>,
}

impl DomainModel {
    /// Build a model, dropping fields with unknown types and resolving the
    /// generation order.
    pub fn new(
        database: DatabaseConfig,
        types: BTreeMap<String, String>,
        mut entities: BTreeMap<String, Schema>,
    ) -> Self {
        Self::preprocess(&types, &mut entities);
        let order = Self::resolve_order(&entities);
        Self {
            database,
            types,
            entities,
            order,
        }
    }

    /// Drop fields whose type is neither a known scalar nor a known entity.
    fn preprocess(types: &BTreeMap<String, String>, entities: &mut BTreeMap<String, Schema>) {
        let names: BTreeSet<String> = entities.keys().cloned().collect();
        for schema in entities.values_mut() {
            let entity = schema.name.clone();
            schema.fields.retain(|field, def| {
                let known = if def.is_reference() {
                    names.contains(&def.field_type)
                } else {
                    types.contains_key(&def.field_type)
                };
                if !known {
                    error!(
                        entity = %entity,
                        field = %field,
                        field_type = %def.field_type,
                        "unknown type, field dropped"
                    );
                }
                known
            });
        }
    }

    fn resolve_order(entities: &BTreeMap<String, Schema>) -> Vec<String> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        let mut in_progress = BTreeSet::new();
        for name in entities.keys() {
            Self::visit(name, entities, &mut done, &mut in_progress, &mut order);
        }
        order
    }

    fn visit(
        name: &str,
        entities: &BTreeMap<String, Schema>,
        done: &mut BTreeSet<String>,
        in_progress: &mut BTreeSet<String>,
        order: &mut Vec<String>,
    ) {
        if done.contains(name) {
            return;
        }
        if in_progress.contains(name) {
            warn!(entity = name, "dependency cycle, reference skipped");
            return;
        }
        let Some(schema) = entities.get(name) else {
            return;
        };
        in_progress.insert(name.to_string());
        for target in schema.references() {
            Self::visit(target, entities, done, in_progress, order);
        }
        in_progress.remove(name);
        done.insert(name.to_string());
        order.push(name.to_string());
    }
}
