//! Postgres DDL generation from a compiled [`DomainModel`].
//!
//! Every stored entity becomes a `CREATE TABLE` block followed by its
//! constraints and indexes. Referenced tables always precede their
//! referents because generation follows `model.order`.

use crate::error::{ModelError, ModelResult};
use crate::model::DomainModel;
use crate::schema::{FieldDefinition, IndexDefinition, IndexSpec, Kind, RefAction, Schema};
use heck::{ToLowerCamelCase, ToUpperCamelCase};
use serde_json::Value;
use std::collections::BTreeMap;

fn foreign_key(
    entity: &str,
    index_name: &str,
    target: &str,
    on_delete: Option<RefAction>,
    on_update: Option<RefAction>,
    target_is_registry: bool,
) -> String {
    let fk = format!("fk{}{}", entity, index_name.to_upper_camel_case());
    let from = if index_name == "id" {
        "id".to_string()
    } else {
        format!("{index_name}Id")
    };
    let to = if target == "Identifier" || target_is_registry {
        "id".to_string()
    } else {
        format!("{}Id", target.to_lower_camel_case())
    };
    let on_delete = on_delete
        .map(|a| format!(" ON DELETE {}", a.as_sql()))
        .unwrap_or_default();
    let on_update = on_update
        .map(|a| format!(" ON UPDATE {}", a.as_sql()))
        .unwrap_or_default();
    format!(
        "ALTER TABLE \"{entity}\" ADD CONSTRAINT \"{fk}\" \
         FOREIGN KEY (\"{from}\") REFERENCES \"{target}\" (\"{to}\"){on_delete}{on_update};"
    )
}

/// Column name for an index member: relation fields get the `Id` suffix.
fn column_name(schema: &Schema, field: &str) -> String {
    match schema.fields.get(field) {
        Some(def) if def.is_reference() => format!("{field}Id"),
        _ => field.to_string(),
    }
}

fn primary_custom(entity: &str, fields: &[String], schema: Option<&Schema>) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| match schema {
            Some(schema) => column_name(schema, f),
            None => f.clone(),
        })
        .collect();
    format!(
        "ALTER TABLE \"{entity}\" ADD CONSTRAINT \"pk{entity}\" PRIMARY KEY (\"{}\");",
        columns.join("\", \"")
    )
}

fn create_index(
    entity: &str,
    index_name: &str,
    spec: &IndexSpec,
    schema: &Schema,
    unique: bool,
) -> ModelResult<String> {
    let uni = if unique { "UNIQUE " } else { "" };
    let prefix = if unique { "ak" } else { "idx" };
    let idx_name = format!("{prefix}{entity}{}", index_name.to_upper_camel_case());
    let target = match spec {
        IndexSpec::Fields(fields) => {
            let mut names = Vec::with_capacity(fields.len());
            for field in fields {
                if !schema.fields.contains_key(field) {
                    return Err(ModelError::compile(format!(
                        "Field not found: {entity}.{field}"
                    )));
                }
                names.push(column_name(schema, field));
            }
            format!("(\"{}\")", names.join("\", \""))
        }
        IndexSpec::Raw(expr) => format!("USING {expr}"),
    };
    Ok(format!(
        "CREATE {uni}INDEX \"{idx_name}\" ON \"{entity}\" {target};"
    ))
}

fn default_sql(def: &FieldDefinition, default: &Value) -> String {
    if def.field_type == "datetime" && default.as_str() == Some("now") {
        return "CURRENT_TIMESTAMP".to_string();
    }
    match default {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{other}'"),
    }
}

/// Synthesize the junction entity for a `many` marker and generate it.
fn create_many(model: &DomainModel, schema: &Schema, target: &str) -> ModelResult<String> {
    let from_field = schema.name.to_lower_camel_case();
    let to_field = target.to_lower_camel_case();
    let cross_name = format!("{}{}", schema.name, target);
    let mut fields = BTreeMap::new();
    fields.insert(from_field.clone(), FieldDefinition::from_type(&schema.name));
    fields.insert(to_field.clone(), FieldDefinition::from_type(target));
    let mut indexes = BTreeMap::new();
    indexes.insert(
        cross_name.clone(),
        IndexDefinition::Primary(vec![from_field, to_field]),
    );
    let junction = Schema {
        name: cross_name,
        scope: schema.scope,
        kind: Kind::Relation,
        fields,
        indexes,
    };
    create_entity(model, &junction)
}

/// Generate the DDL block for one entity: table, primary key, foreign keys
/// and indexes, plus any synthesized junction tables.
pub fn create_entity(model: &DomainModel, schema: &Schema) -> ModelResult<String> {
    let name = schema.name.as_str();
    let mut sql = vec![format!("CREATE TABLE \"{name}\" (")];
    let mut idx: Vec<String> = Vec::new();

    let registry = schema.kind == Kind::Registry;
    let pk = if registry || name == "Identifier" {
        "id".to_string()
    } else {
        format!("{}Id", name.to_lower_camel_case())
    };
    let generated = if registry {
        "NOT NULL"
    } else {
        "generated always as identity"
    };
    sql.push(format!("  \"{pk}\" bigint {generated},"));
    idx.push(primary_custom(name, std::slice::from_ref(&pk), None));
    if registry {
        idx.push(foreign_key(name, &pk, "Identifier", None, None, false));
    }

    for (field, def) in &schema.fields {
        let reference = def.is_reference();
        let mut pg_type = if reference {
            "bigint".to_string()
        } else {
            model.types.get(&def.field_type).cloned().ok_or_else(|| {
                ModelError::compile(format!("Unknown type: {} in {name}.{field}", def.field_type))
            })?
        };
        if let Some(max) = def.length.max {
            pg_type = format!("{pg_type}({max})");
        }
        let pg_field = if reference {
            format!("{field}Id")
        } else {
            field.clone()
        };
        let nullable = if def.required { " NOT NULL" } else { " NULL" };
        let default = match &def.default {
            Some(value) => format!(" DEFAULT {}", default_sql(def, value)),
            None => String::new(),
        };
        sql.push(format!("  \"{pg_field}\" {pg_type}{nullable}{default},"));

        if reference {
            let target = model.entities.get(&def.field_type).ok_or_else(|| {
                ModelError::compile(format!("Unknown schema: {}", def.field_type))
            })?;
            idx.push(foreign_key(
                name,
                field,
                &def.field_type,
                def.on_delete,
                def.on_update,
                target.kind == Kind::Registry,
            ));
        }
        if def.unique || def.index {
            let spec = IndexSpec::Fields(vec![field.clone()]);
            idx.push(create_index(name, field, &spec, schema, def.unique)?);
        }
    }

    for (index_name, def) in &schema.indexes {
        match def {
            IndexDefinition::Unique(spec) => {
                idx.push(create_index(name, index_name, spec, schema, true)?);
            }
            IndexDefinition::Index(spec) => {
                idx.push(create_index(name, index_name, spec, schema, false)?);
            }
            IndexDefinition::Primary(fields) => {
                idx[0] = primary_custom(name, fields, Some(schema));
                // composite key replaces the synthesized pk column
                sql.remove(1);
            }
            IndexDefinition::Many(target) => {
                idx.push(format!("\n{}", create_many(model, schema, target)?));
            }
        }
    }

    let last = sql.len() - 1;
    sql[last] = sql[last].trim_end_matches(',').to_string();
    sql.push(");".to_string());
    Ok(format!("{}\n\n{}", sql.join("\n"), idx.join("\n")))
}

/// Bootstrap rows registering an entity and its fields in the shared
/// `Identifier` table.
fn register_entity(schema: &Schema) -> (String, String) {
    let name = &schema.name;
    let mut inserts = vec![format!(
        "INSERT INTO \"Identifier\" (\"kind\", \"name\") VALUES ('entity', '{name}');"
    )];
    for field in schema.fields.keys() {
        inserts.push(format!(
            "INSERT INTO \"Identifier\" (\"kind\", \"name\") VALUES ('field', '{name}.{field}');"
        ));
    }
    let update = format!(
        "UPDATE \"Identifier\" SET \"parentId\" = \
         (SELECT \"id\" FROM \"Identifier\" WHERE \"name\" = '{name}') \
         WHERE \"name\" LIKE '{name}.%';"
    );
    (inserts.join("\n"), update)
}

/// Generate the full `database.sql` script: stored entities in dependency
/// order, with identifier-registry bootstrap rows appended when the model
/// defines an `Identifier` entity.
pub fn generate_database_sql(model: &DomainModel) -> ModelResult<String> {
    let mut script = Vec::new();
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let has_identifier = model.entities.contains_key("Identifier");

    for name in &model.order {
        let Some(schema) = model.entities.get(name) else {
            continue;
        };
        if !schema.kind.is_stored() {
            continue;
        }
        script.push(create_entity(model, schema)?);
        script.push(String::new());
        if has_identifier {
            let (ins, upd) = register_entity(schema);
            inserts.push(ins);
            updates.push(upd);
        }
    }

    if !inserts.is_empty() {
        script.extend(inserts);
        script.push(String::new());
        script.extend(updates);
        script.push(String::new());
    }
    Ok(script.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::{create_entity, generate_database_sql};
    use crate::model::{DatabaseConfig, DomainModel};
    use crate::schema::Schema;
    use std::collections::BTreeMap;

    fn model_from(raws: Vec<(&str, serde_json::Value)>) -> DomainModel {
        let entities: BTreeMap<String, Schema> = raws
            .into_iter()
            .map(|(name, raw)| {
                (
                    name.to_string(),
                    Schema::from_value(name, &raw).expect("parse"),
                )
            })
            .collect();
        DomainModel::new(DatabaseConfig::default(), crate::pg::pg_types(), entities)
    }

    #[test]
    fn plain_table_with_identity_pk() {
        let model = model_from(vec![(
            "Country",
            serde_json::json!({
                "Country": "dictionary global",
                "name": { "type": "string", "length": 80, "unique": true }
            }),
        )]);
        let sql = create_entity(&model, &model.entities["Country"]).expect("ddl");
        assert!(sql.contains("CREATE TABLE \"Country\" ("));
        assert!(sql.contains("  \"countryId\" bigint generated always as identity,"));
        assert!(sql.contains("  \"name\" varchar(80) NOT NULL"));
        assert!(sql.contains(
            "ALTER TABLE \"Country\" ADD CONSTRAINT \"pkCountry\" PRIMARY KEY (\"countryId\");"
        ));
        assert!(sql.contains("CREATE UNIQUE INDEX \"akCountryName\" ON \"Country\" (\"name\");"));
    }

    #[test]
    fn relation_field_becomes_fk() {
        let model = model_from(vec![
            (
                "Country",
                serde_json::json!({ "Country": "dictionary global", "name": "string" }),
            ),
            (
                "City",
                serde_json::json!({
                    "City": "dictionary global",
                    "country": { "type": "Country", "delete": "cascade" },
                    "name": "string"
                }),
            ),
        ]);
        let sql = create_entity(&model, &model.entities["City"]).expect("ddl");
        assert!(sql.contains("  \"countryId\" bigint NOT NULL,"));
        assert!(sql.contains(
            "ALTER TABLE \"City\" ADD CONSTRAINT \"fkCityCountry\" \
             FOREIGN KEY (\"countryId\") REFERENCES \"Country\" (\"countryId\") ON DELETE CASCADE;"
        ));
    }

    #[test]
    fn registry_pk_references_identifier() {
        let model = model_from(vec![
            (
                "Identifier",
                serde_json::json!({
                    "Identifier": "dictionary global",
                    "kind": "string",
                    "name": "string",
                    "parent": "?Identifier"
                }),
            ),
            (
                "Division",
                serde_json::json!({ "Registry": {}, "name": "string" }),
            ),
        ]);
        let sql = create_entity(&model, &model.entities["Division"]).expect("ddl");
        assert!(sql.contains("  \"id\" bigint NOT NULL,"));
        assert!(sql.contains(
            "ALTER TABLE \"Division\" ADD CONSTRAINT \"fkDivisionId\" \
             FOREIGN KEY (\"id\") REFERENCES \"Identifier\" (\"id\");"
        ));
    }

    #[test]
    fn datetime_now_default() {
        let model = model_from(vec![(
            "Journal",
            serde_json::json!({
                "Journal": "log",
                "created": { "type": "datetime", "default": "now" }
            }),
        )]);
        let sql = create_entity(&model, &model.entities["Journal"]).expect("ddl");
        assert!(sql.contains(
            "  \"created\" timestamp with time zone NOT NULL DEFAULT CURRENT_TIMESTAMP"
        ));
    }

    #[test]
    fn many_generates_junction() {
        let model = model_from(vec![
            (
                "Company",
                serde_json::json!({
                    "Company": "dictionary global",
                    "name": "string",
                    "addresses": { "many": "Address" }
                }),
            ),
            (
                "Address",
                serde_json::json!({ "Address": "entity", "line": "string" }),
            ),
        ]);
        let sql = create_entity(&model, &model.entities["Company"]).expect("ddl");
        assert!(sql.contains("CREATE TABLE \"CompanyAddress\" ("));
        assert!(sql.contains("  \"companyId\" bigint NOT NULL,"));
        assert!(sql.contains("  \"addressId\" bigint NOT NULL"));
        assert!(sql.contains(
            "ALTER TABLE \"CompanyAddress\" ADD CONSTRAINT \"pkCompanyAddress\" \
             PRIMARY KEY (\"companyId\", \"addressId\");"
        ));
        assert!(sql.contains("\"fkCompanyAddressCompany\""));
        assert!(sql.contains("\"fkCompanyAddressAddress\""));
    }

    #[test]
    fn composite_primary_replaces_identity() {
        let model = model_from(vec![(
            "Rate",
            serde_json::json!({
                "Rate": "entity",
                "source": "string",
                "target": "string",
                "rateKey": { "primary": ["source", "target"] }
            }),
        )]);
        let sql = create_entity(&model, &model.entities["Rate"]).expect("ddl");
        assert!(!sql.contains("generated always as identity"));
        assert!(sql.contains(
            "ALTER TABLE \"Rate\" ADD CONSTRAINT \"pkRate\" PRIMARY KEY (\"source\", \"target\");"
        ));
    }

    #[test]
    fn database_script_bootstraps_identifier_registry() {
        let model = model_from(vec![
            (
                "Identifier",
                serde_json::json!({
                    "Identifier": "dictionary global",
                    "kind": "string",
                    "name": "string"
                }),
            ),
            (
                "Division",
                serde_json::json!({ "Registry": {}, "name": "string" }),
            ),
        ]);
        let script = generate_database_sql(&model).expect("script");
        assert!(script.contains(
            "INSERT INTO \"Identifier\" (\"kind\", \"name\") VALUES ('entity', 'Division');"
        ));
        assert!(script.contains(
            "INSERT INTO \"Identifier\" (\"kind\", \"name\") VALUES ('field', 'Division.name');"
        ));
        assert!(script.contains("WHERE \"name\" LIKE 'Division.%';"));
        // tables precede bootstrap rows
        let table_pos = script.find("CREATE TABLE \"Division\"").expect("table");
        let insert_pos = script.find("VALUES ('entity', 'Division')").expect("insert");
        assert!(table_pos < insert_pos);
    }

    #[test]
    fn views_produce_no_tables() {
        let model = model_from(vec![
            (
                "Country",
                serde_json::json!({ "Country": "dictionary global", "name": "string" }),
            ),
            (
                "CountryView",
                serde_json::json!({ "CountryView": "view", "name": "string" }),
            ),
        ]);
        let script = generate_database_sql(&model).expect("script");
        assert!(script.contains("CREATE TABLE \"Country\""));
        assert!(!script.contains("CREATE TABLE \"CountryView\""));
    }
}
