//! Entity schema model and raw-record parsing.
//!
//! An entity definition is a JSON record: one directive entry (the first
//! UpperCamel key) naming the entity kind and scope, followed by field and
//! index entries. Parsing is deliberately lenient: entries with an
//! unrecognized shape are dropped with an error log and compilation
//! continues, while hard contract violations (unknown kind, unknown scope,
//! unknown operator strings) fail the load.

use crate::error::{ModelError, ModelResult};
use heck::ToUpperCamelCase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::error;

/// Storage placement of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    System,
    Local,
    Memory,
}

impl FromStr for Scope {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "global" => Ok(Self::Global),
            "system" => Ok(Self::System),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            _ => Err(ModelError::compile(format!("unknown scope: {s}"))),
        }
    }
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::System => "system",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }
}

/// Structural role of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Dictionary,
    Registry,
    Entity,
    Details,
    Relation,
    Log,
    Struct,
    View,
    Projection,
    Form,
}

impl FromStr for Kind {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_lowercase().as_str() {
            "dictionary" => Ok(Self::Dictionary),
            "registry" => Ok(Self::Registry),
            "entity" => Ok(Self::Entity),
            "details" => Ok(Self::Details),
            "relation" => Ok(Self::Relation),
            "log" => Ok(Self::Log),
            "struct" => Ok(Self::Struct),
            "view" => Ok(Self::View),
            "projection" => Ok(Self::Projection),
            "form" => Ok(Self::Form),
            _ => Err(ModelError::compile(format!("unknown kind: {s}"))),
        }
    }
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Registry => "registry",
            Self::Entity => "entity",
            Self::Details => "details",
            Self::Relation => "relation",
            Self::Log => "log",
            Self::Struct => "struct",
            Self::View => "view",
            Self::Projection => "projection",
            Self::Form => "form",
        }
    }

    /// Stored kinds produce tables; the rest only participate in the model.
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            Self::Dictionary
                | Self::Registry
                | Self::Entity
                | Self::Details
                | Self::Relation
                | Self::Log
        )
    }

    /// Scope used when the directive does not name one.
    pub fn default_scope(&self) -> Scope {
        match self {
            Self::Struct => Scope::Memory,
            Self::Log => Scope::Local,
            _ => Scope::System,
        }
    }
}

/// Referential action on a foreign key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl RefAction {
    /// Parse a case-insensitive action name.
    pub fn parse(s: &str) -> ModelResult<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" => Ok(Self::NoAction),
            "RESTRICT" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            _ => Err(ModelError::compile(format!(
                "unknown referential action: {s}"
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Normalized length constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Length {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl Length {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => Self {
                min: None,
                max: n.as_u64(),
            },
            Value::Array(items) => Self {
                min: items.first().and_then(Value::as_u64),
                max: items.get(1).and_then(Value::as_u64),
            },
            Value::Object(map) => Self {
                min: map.get("min").and_then(Value::as_u64),
                max: map.get("max").and_then(Value::as_u64),
            },
            _ => Self::default(),
        }
    }
}

/// A single normalized field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    /// Scalar type name, or an entity name (UpperCamel) for relations.
    pub field_type: String,
    pub required: bool,
    pub length: Length,
    /// Default literal; the string `"now"` on datetime fields means
    /// `CURRENT_TIMESTAMP`.
    pub default: Option<Value>,
    pub unique: bool,
    pub index: bool,
    pub on_delete: Option<RefAction>,
    pub on_update: Option<RefAction>,
}

impl FieldDefinition {
    /// Parse the short string form; a leading `?` marks the field optional.
    pub fn from_type(type_str: &str) -> Self {
        let (required, field_type) = match type_str.strip_prefix('?') {
            Some(rest) => (false, rest),
            None => (true, type_str),
        };
        Self {
            field_type: field_type.to_string(),
            required,
            length: Length::default(),
            default: None,
            unique: false,
            index: false,
            on_delete: None,
            on_update: None,
        }
    }

    fn from_object(map: &serde_json::Map<String, Value>) -> ModelResult<Self> {
        let type_str = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::compile("field type must be a string"))?;
        let mut field = Self::from_type(type_str);
        if let Some(required) = map.get("required").and_then(Value::as_bool) {
            field.required = required;
        }
        if let Some(length) = map.get("length") {
            field.length = Length::from_value(length);
        }
        field.default = map.get("default").cloned();
        field.unique = map.get("unique").and_then(Value::as_bool).unwrap_or(false);
        field.index = map.get("index").and_then(Value::as_bool).unwrap_or(false);
        if let Some(action) = map.get("delete").and_then(Value::as_str) {
            field.on_delete = Some(RefAction::parse(action)?);
        }
        if let Some(action) = map.get("update").and_then(Value::as_str) {
            field.on_update = Some(RefAction::parse(action)?);
        }
        Ok(field)
    }

    /// True when the type names another entity rather than a scalar.
    pub fn is_reference(&self) -> bool {
        is_entity_name(&self.field_type)
    }
}

/// Fields or a raw expression (a string containing `(`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexSpec {
    Fields(Vec<String>),
    Raw(String),
}

impl IndexSpec {
    fn from_value(value: &Value) -> ModelResult<Self> {
        match value {
            Value::Array(items) => {
                let fields: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if fields.len() != items.len() {
                    return Err(ModelError::compile("index fields must be strings"));
                }
                Ok(Self::Fields(fields))
            }
            Value::String(s) if s.contains('(') => Ok(Self::Raw(s.clone())),
            Value::String(s) => Ok(Self::Fields(
                s.split(',').map(|f| f.trim().to_string()).collect(),
            )),
            _ => Err(ModelError::compile("invalid index definition")),
        }
    }
}

/// A composite index, key, or junction marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexDefinition {
    Unique(IndexSpec),
    Index(IndexSpec),
    Primary(Vec<String>),
    /// Many-to-many marker; generates a junction table to the named entity.
    Many(String),
}

/// A parsed entity definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    pub name: String,
    pub scope: Scope,
    pub kind: Kind,
    pub fields: BTreeMap<String, FieldDefinition>,
    pub indexes: BTreeMap<String, IndexDefinition>,
}

/// Entity names are UpperCamel; everything else is a scalar type name.
pub fn is_entity_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn parse_directive(key: &str, value: &Value) -> ModelResult<Option<(Kind, Option<Scope>)>> {
    match value {
        Value::String(s) => {
            let mut tokens = s.split_whitespace();
            let Some(first) = tokens.next() else {
                return Err(ModelError::compile(format!("empty directive for {key}")));
            };
            let kind = Kind::from_str(first)?;
            let scope = tokens.next().map(Scope::from_str).transpose()?;
            Ok(Some((kind, scope)))
        }
        Value::Object(map) => {
            let kind = match map.get("kind") {
                Some(v) => {
                    let name = v
                        .as_str()
                        .ok_or_else(|| ModelError::compile("directive kind must be a string"))?;
                    Kind::from_str(name)?
                }
                // `"Registry": {}` names the kind by the key itself
                None => match Kind::from_str(key) {
                    Ok(kind) => kind,
                    Err(_) => return Ok(None),
                },
            };
            let scope = match map.get("scope") {
                Some(v) => {
                    let name = v
                        .as_str()
                        .ok_or_else(|| ModelError::compile("directive scope must be a string"))?;
                    Some(Scope::from_str(name)?)
                }
                None => None,
            };
            Ok(Some((kind, scope)))
        }
        _ => Ok(None),
    }
}

fn is_field_shaped(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Object(map) => map.get("type").is_some_and(Value::is_string),
        _ => false,
    }
}

impl Schema {
    /// Parse a raw entity record.
    pub fn from_value(name: &str, raw: &Value) -> ModelResult<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            ModelError::compile(format!("entity {name} must be a JSON object"))
        })?;

        let mut directive: Option<(Kind, Option<Scope>)> = None;
        let mut fields = BTreeMap::new();
        let mut indexes = BTreeMap::new();

        for (key, value) in obj {
            if directive.is_none() && is_entity_name(key) {
                if let Some(parsed) = parse_directive(key, value)? {
                    directive = Some(parsed);
                    continue;
                }
            }
            Self::classify_entry(name, key, value, &mut fields, &mut indexes)?;
        }

        let (kind, scope) = directive
            .ok_or_else(|| ModelError::compile(format!("entity {name} has no directive")))?;
        let scope = scope.unwrap_or_else(|| kind.default_scope());

        Ok(Self {
            name: name.to_string(),
            scope,
            kind,
            fields,
            indexes,
        })
    }

    fn classify_entry(
        entity: &str,
        key: &str,
        value: &Value,
        fields: &mut BTreeMap<String, FieldDefinition>,
        indexes: &mut BTreeMap<String, IndexDefinition>,
    ) -> ModelResult<()> {
        match value {
            Value::String(type_str) => {
                fields.insert(key.to_string(), FieldDefinition::from_type(type_str));
            }
            Value::Object(map) => {
                if let Some(target) = map.get("many") {
                    let target = target.as_str().ok_or_else(|| {
                        ModelError::compile(format!("{entity}.{key}: many target must be a string"))
                    })?;
                    indexes.insert(key.to_string(), IndexDefinition::Many(target.to_string()));
                } else if map.contains_key("type") {
                    fields.insert(key.to_string(), FieldDefinition::from_object(map)?);
                } else if let Some(spec) = map.get("unique") {
                    indexes.insert(
                        key.to_string(),
                        IndexDefinition::Unique(IndexSpec::from_value(spec)?),
                    );
                } else if let Some(spec) = map.get("index") {
                    indexes.insert(
                        key.to_string(),
                        IndexDefinition::Index(IndexSpec::from_value(spec)?),
                    );
                } else if let Some(spec) = map.get("primary") {
                    let fields_spec = match IndexSpec::from_value(spec)? {
                        IndexSpec::Fields(f) => f,
                        IndexSpec::Raw(_) => {
                            return Err(ModelError::compile(format!(
                                "{entity}.{key}: primary key must list fields"
                            )));
                        }
                    };
                    indexes.insert(key.to_string(), IndexDefinition::Primary(fields_spec));
                } else if !map.is_empty() && map.values().all(is_field_shaped) {
                    // nested group: flatten into camelCase field names
                    for (sub_key, sub_value) in map {
                        let flat = format!("{key}{}", sub_key.to_upper_camel_case());
                        Self::classify_entry(entity, &flat, sub_value, fields, indexes)?;
                    }
                } else {
                    error!(entity, field = key, "unrecognized field shape, dropped");
                }
            }
            _ => {
                error!(entity, field = key, "unrecognized field shape, dropped");
            }
        }
        Ok(())
    }

    /// Relation targets referenced by this entity's fields.
    pub fn references(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|f| f.is_reference())
            .map(|f| f.field_type.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldDefinition, IndexDefinition, IndexSpec, Kind, Schema, Scope};

    #[test]
    fn short_directive_kind_then_scope() {
        let raw = serde_json::json!({
            "Company": "dictionary global",
            "name": { "type": "string", "unique": true }
        });
        let schema = Schema::from_value("Company", &raw).expect("parse");
        assert_eq!(schema.kind, Kind::Dictionary);
        assert_eq!(schema.scope, Scope::Global);
        assert!(schema.fields["name"].unique);
    }

    #[test]
    fn single_token_directive_defaults_scope() {
        let raw = serde_json::json!({ "Session": "struct" });
        let schema = Schema::from_value("Session", &raw).expect("parse");
        assert_eq!(schema.kind, Kind::Struct);
        assert_eq!(schema.scope, Scope::Memory);
    }

    #[test]
    fn kind_named_by_directive_key() {
        let raw = serde_json::json!({ "Registry": {}, "name": "string" });
        let schema = Schema::from_value("Division", &raw).expect("parse");
        assert_eq!(schema.kind, Kind::Registry);
        assert_eq!(schema.scope, Scope::System);
    }

    #[test]
    fn log_defaults_to_local_scope() {
        let raw = serde_json::json!({ "Journal": "log", "message": "string" });
        let schema = Schema::from_value("Journal", &raw).expect("parse");
        assert_eq!(schema.scope, Scope::Local);
    }

    #[test]
    fn unknown_kind_rejected() {
        let raw = serde_json::json!({ "Company": "blob global" });
        assert!(Schema::from_value("Company", &raw).is_err());
    }

    #[test]
    fn optional_shorthand() {
        let field = FieldDefinition::from_type("?string");
        assert!(!field.required);
        assert_eq!(field.field_type, "string");
    }

    #[test]
    fn nested_group_flattens() {
        let raw = serde_json::json!({
            "Person": "entity",
            "fullName": { "given": "string", "surname": "string" }
        });
        let schema = Schema::from_value("Person", &raw).expect("parse");
        assert!(schema.fields.contains_key("fullNameGiven"));
        assert!(schema.fields.contains_key("fullNameSurname"));
        assert!(!schema.fields.contains_key("fullName"));
    }

    #[test]
    fn many_lands_in_indexes() {
        let raw = serde_json::json!({
            "Company": "dictionary global",
            "name": "string",
            "addresses": { "many": "Address" }
        });
        let schema = Schema::from_value("Company", &raw).expect("parse");
        assert_eq!(
            schema.indexes["addresses"],
            IndexDefinition::Many("Address".to_string())
        );
        assert!(!schema.fields.contains_key("addresses"));
    }

    #[test]
    fn composite_unique_index() {
        let raw = serde_json::json!({
            "Account": "registry",
            "login": "string",
            "realm": "string",
            "naturalKey": { "unique": ["realm", "login"] }
        });
        let schema = Schema::from_value("Account", &raw).expect("parse");
        assert_eq!(
            schema.indexes["naturalKey"],
            IndexDefinition::Unique(IndexSpec::Fields(vec![
                "realm".to_string(),
                "login".to_string()
            ]))
        );
    }

    #[test]
    fn length_forms() {
        let raw = serde_json::json!({
            "Account": "registry",
            "login": { "type": "string", "length": [3, 32] },
            "password": { "type": "string", "length": 64 },
            "note": { "type": "string", "length": { "min": 1, "max": 250 } }
        });
        let schema = Schema::from_value("Account", &raw).expect("parse");
        assert_eq!(schema.fields["login"].length.min, Some(3));
        assert_eq!(schema.fields["login"].length.max, Some(32));
        assert_eq!(schema.fields["password"].length.max, Some(64));
        assert_eq!(schema.fields["note"].length.min, Some(1));
    }

    #[test]
    fn relation_detected_by_case() {
        let raw = serde_json::json!({
            "City": "dictionary global",
            "country": "Country",
            "name": "string"
        });
        let schema = Schema::from_value("City", &raw).expect("parse");
        assert!(schema.fields["country"].is_reference());
        assert!(!schema.fields["name"].is_reference());
        assert_eq!(schema.references(), vec!["Country"]);
    }
}
