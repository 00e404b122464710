//! TypeScript interface declarations (`database.d.ts`) for client code
//! sharing the schema.

use crate::model::DomainModel;
use heck::ToLowerCamelCase;

fn ts_type(scalar: &str) -> &str {
    match scalar {
        "number" | "string" | "boolean" => scalar,
        _ => "string",
    }
}

/// Render one `interface` per entity, in dependency order.
///
/// The synthesized primary key comes first; relation fields appear with the
/// `Id` suffix and a numeric type; optional fields carry `?`.
pub fn to_interfaces(model: &DomainModel) -> String {
    let mut out = String::new();
    for name in &model.order {
        let Some(schema) = model.entities.get(name) else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("interface ");
        out.push_str(name);
        out.push_str(" {\n");
        out.push_str(&format!("  {}Id: number;\n", name.to_lower_camel_case()));
        for (field, def) in &schema.fields {
            let opt = if def.required { "" } else { "?" };
            if def.is_reference() {
                out.push_str(&format!("  {field}Id{opt}: number;\n"));
            } else {
                out.push_str(&format!(
                    "  {field}{opt}: {};\n",
                    ts_type(&def.field_type)
                ));
            }
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::to_interfaces;
    use crate::model::{DatabaseConfig, DomainModel};
    use crate::schema::Schema;
    use std::collections::BTreeMap;

    #[test]
    fn interfaces_follow_order_and_optionality() {
        let raw = serde_json::json!({
            "City": "dictionary global",
            "country": "Country",
            "name": "string",
            "founded": "?datetime"
        });
        let country = serde_json::json!({ "Country": "dictionary global", "name": "string" });
        let entities = BTreeMap::from([
            (
                "City".to_string(),
                Schema::from_value("City", &raw).expect("parse"),
            ),
            (
                "Country".to_string(),
                Schema::from_value("Country", &country).expect("parse"),
            ),
        ]);
        let model = DomainModel::new(DatabaseConfig::default(), crate::pg::pg_types(), entities);
        let out = to_interfaces(&model);

        let country_pos = out.find("interface Country").expect("country");
        let city_pos = out.find("interface City").expect("city");
        assert!(country_pos < city_pos);
        assert!(out.contains("  cityId: number;\n"));
        assert!(out.contains("  countryId: number;\n"));
        assert!(out.contains("  founded?: string;\n"));
        assert!(out.contains("  name: string;\n"));
    }
}
