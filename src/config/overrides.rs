//! Environment-variable overrides and required-field enforcement.
//!
//! Every field gets candidate variable names synthesized from its name path,
//! e.g. `Configor_db_password` and `CONFIGOR_DB_PASSWORD`, unless the schema
//! names the variable explicitly. Sequences of records that are still empty can
//! be populated element by element from indexed names such as
//! `CONFIGOR_CONTACTS_0_EMAIL`.

use super::defaults::apply_defaults;
use super::merge::merge_into;
use crate::env::EnvSource;
use crate::error::{ConfigError, Result};
use crate::logging::Diagnostics;
use crate::schema::{NamePath, Schema, Slot, SlotShape, same_value};
use serde_json::{Map, Value};

/// Where override values come from and how their names are built.
pub(crate) struct EnvContext<'a> {
    pub env: &'a dyn EnvSource,
    pub prefix: Option<&'a str>,
    pub separator: &'a str,
    pub diagnostics: &'a Diagnostics,
}

impl EnvContext<'_> {
    fn candidates(&self, slot: &Slot<'_>, path: &NamePath) -> (Vec<String>, bool) {
        if let Some(name) = slot.env_override() {
            return (vec![name.to_string()], false);
        }
        let name = path.env_name(self.prefix, self.separator);
        let upper = name.to_uppercase();
        let mut names = vec![name];
        if upper != names[0] {
            names.push(upper);
        }
        (names, true)
    }
}

/// Apply overrides to every field of `record`, then enforce required fields
/// when `check_required` is set.
///
/// Returns how many values came from synthesized names. Explicitly named
/// variables do not depend on the path and are not counted.
pub(crate) fn apply_env(
    record: &mut Value,
    schema: &Schema,
    zero: &Map<String, Value>,
    path: &NamePath,
    ctx: &EnvContext<'_>,
    check_required: bool,
) -> Result<usize> {
    let Value::Object(map) = record else {
        return Ok(0);
    };

    let mut synthesized_hits = 0;
    for slot in schema.slots(zero) {
        let field_path = path.child(slot.name);
        let current = map
            .entry(slot.name.to_string())
            .or_insert_with(|| slot.zero.clone());

        let (names, synthesized) = ctx.candidates(&slot, &field_path);
        ctx.diagnostics.probing_env(&names);
        for name in &names {
            let Some(raw) = ctx.env.non_empty(name) else {
                continue;
            };
            ctx.diagnostics.env_hit(name, &field_path.dotted());
            let invalid = |message: String| ConfigError::InvalidEnv {
                var: name.clone(),
                message,
            };
            match slot.shape {
                SlotShape::Record { .. } => {
                    let value: Value =
                        serde_yaml::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
                    merge_into(current, value);
                }
                SlotShape::List { .. } => {
                    *current = serde_yaml::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
                }
                SlotShape::Value => {
                    *current = slot.leaf_kind().parse_env(&raw).map_err(invalid)?;
                }
            }
            if synthesized {
                synthesized_hits += 1;
            }
            break;
        }

        match slot.shape {
            SlotShape::Value => {}
            SlotShape::Record { schema, .. } => {
                let empty = Map::new();
                let child_zero = slot.record_zero().unwrap_or(&empty);
                let base = slot.child_base(path);
                synthesized_hits +=
                    apply_env(current, schema, child_zero, &base, ctx, check_required)?;
            }
            SlotShape::List {
                schema,
                zero: element,
            } => {
                let empty = Map::new();
                let element_zero = element.as_object().unwrap_or(&empty);
                synthesized_hits += match current {
                    Value::Array(items) if !items.is_empty() => {
                        let mut hits = 0;
                        for (idx, item) in items.iter_mut().enumerate() {
                            hits += apply_env(
                                item,
                                schema,
                                element_zero,
                                &field_path.index(idx),
                                ctx,
                                check_required,
                            )?;
                        }
                        hits
                    }
                    Value::Array(_) | Value::Null => {
                        let (items, hits) =
                            probe_elements(element, schema, element_zero, &field_path, ctx, check_required)?;
                        if !items.is_empty() {
                            *current = Value::Array(items);
                        }
                        hits
                    }
                    _ => 0,
                };
            }
        }

        if check_required && slot.is_required() && same_value(current, slot.zero) {
            return Err(ConfigError::RequiredBlank {
                path: field_path.dotted(),
            });
        }
    }
    Ok(synthesized_hits)
}

/// Build elements of an empty sequence from indexed variables.
///
/// Each candidate starts as the blank element with its declared defaults.
/// Probing stops at the first index whose candidate is left unchanged, or that
/// was only touched by explicitly named variables, which would match every
/// index alike.
fn probe_elements(
    element: &Value,
    schema: &Schema,
    element_zero: &Map<String, Value>,
    path: &NamePath,
    ctx: &EnvContext<'_>,
    check_required: bool,
) -> Result<(Vec<Value>, usize)> {
    let mut template = element.clone();
    apply_defaults(&mut template, schema, element_zero, path)?;

    let mut items = Vec::new();
    let mut total_hits = 0;
    loop {
        let element_path = path.index(items.len());
        let mut candidate = template.clone();
        let hits = apply_env(&mut candidate, schema, element_zero, &element_path, ctx, false)?;
        if hits == 0 || same_value(&candidate, &template) {
            break;
        }
        if check_required {
            apply_env(&mut candidate, schema, element_zero, &element_path, ctx, true)?;
        }
        total_hits += hits;
        items.push(candidate);
    }
    Ok((items, total_hits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Configurable, Field, zero_value};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Db {
        name: String,
        password: String,
        port: u16,
    }

    impl Configurable for Db {
        fn schema() -> Schema {
            Schema::new().field(Field::new("password").required())
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Contact {
        name: String,
        email: String,
        active: bool,
    }

    impl Configurable for Contact {
        fn schema() -> Schema {
            Schema::new()
                .field(Field::new("email").required())
                .field(Field::new("active").default_value("true"))
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Common {
        region: String,
    }

    impl Configurable for Common {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct App {
        app_name: String,
        debug: bool,
        hosts: Vec<String>,
        secret: String,
        db: Db,
        contacts: Vec<Contact>,
        #[serde(flatten)]
        common: Common,
    }

    impl Configurable for App {
        fn schema() -> Schema {
            Schema::new()
                .field(Field::new("secret").env("APP_SECRET"))
                .field(Field::record::<Db>("db"))
                .field(Field::list::<Contact>("contacts"))
                .field(Field::record::<Common>("common").flatten())
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn run(tree: &mut Value, env: &HashMap<String, String>, prefix: Option<&str>) -> Result<usize> {
        let diagnostics = Diagnostics::default();
        let ctx = EnvContext {
            env,
            prefix,
            separator: "_",
            diagnostics: &diagnostics,
        };
        let zero = zero_value::<App>();
        apply_env(
            tree,
            &App::schema(),
            zero.as_object().unwrap(),
            &NamePath::root(),
            &ctx,
            true,
        )
    }

    fn seeded() -> Value {
        let mut tree = zero_value::<App>();
        tree["db"]["password"] = json!("secret");
        tree
    }

    #[test]
    fn test_synthesized_names_as_written_and_upper() {
        let mut tree = seeded();
        let env = vars(&[
            ("Configor_app_name", "written"),
            ("CONFIGOR_DB_NAME", "upper"),
            ("CONFIGOR_DEBUG", "yes"),
            ("CONFIGOR_HOSTS", "[a, b]"),
            ("CONFIGOR_DB_PORT", "5432"),
        ]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["app_name"], json!("written"));
        assert_eq!(tree["db"]["name"], json!("upper"));
        assert_eq!(tree["debug"], json!(true));
        assert_eq!(tree["hosts"], json!(["a", "b"]));
        assert_eq!(tree["db"]["port"], json!(5432));
    }

    #[test]
    fn test_as_written_name_wins() {
        let mut tree = seeded();
        let env = vars(&[("Configor_app_name", "first"), ("CONFIGOR_APP_NAME", "second")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["app_name"], json!("first"));
    }

    #[test]
    fn test_explicit_name_replaces_synthesized() {
        let mut tree = seeded();
        let env = vars(&[("CONFIGOR_SECRET", "ignored"), ("APP_SECRET", "used")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["secret"], json!("used"));
    }

    #[test]
    fn test_no_prefix_and_flatten() {
        let mut tree = seeded();
        let env = vars(&[("APP_NAME", "bare"), ("REGION", "eu")]);
        run(&mut tree, &env, None).unwrap();
        assert_eq!(tree["app_name"], json!("bare"));
        assert_eq!(tree["region"], json!("eu"));
    }

    #[test]
    fn test_strings_are_taken_raw() {
        let mut tree = seeded();
        let env = vars(&[("CONFIGOR_APP_NAME", "007"), ("CONFIGOR_DB_NAME", "[x]")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["app_name"], json!("007"));
        assert_eq!(tree["db"]["name"], json!("[x]"));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let mut tree = seeded();
        tree["app_name"] = json!("kept");
        let env = vars(&[("CONFIGOR_APP_NAME", "")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["app_name"], json!("kept"));
    }

    #[test]
    fn test_record_literal_merges() {
        let mut tree = seeded();
        let env = vars(&[("CONFIGOR_DB", "{name: main}")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["db"], json!({"name": "main", "password": "secret", "port": 0}));
    }

    #[test]
    fn test_required_reports_full_path() {
        let mut tree = zero_value::<App>();
        let err = run(&mut tree, &vars(&[]), Some("Configor")).unwrap_err();
        assert_eq!(err.to_string(), "db.password is required, but blank");

        let mut tree = seeded();
        tree["contacts"] = json!([{"name": "a", "email": "", "active": true}]);
        let err = run(&mut tree, &vars(&[]), Some("Configor")).unwrap_err();
        assert_eq!(err.to_string(), "contacts.0.email is required, but blank");
    }

    #[test]
    fn test_required_satisfied_by_env() {
        let mut tree = zero_value::<App>();
        let env = vars(&[("CONFIGOR_DB_PASSWORD", "pw")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["db"]["password"], json!("pw"));
    }

    #[test]
    fn test_existing_elements_use_indexed_names() {
        let mut tree = seeded();
        tree["contacts"] = json!([
            {"name": "a", "email": "a@x", "active": true},
            {"name": "b", "email": "b@x", "active": true}
        ]);
        let env = vars(&[("CONFIGOR_CONTACTS_1_EMAIL", "new@x")]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(tree["contacts"][0]["email"], json!("a@x"));
        assert_eq!(tree["contacts"][1]["email"], json!("new@x"));
    }

    #[test]
    fn test_elements_probed_from_env() {
        let mut tree = seeded();
        let env = vars(&[
            ("CONFIGOR_CONTACTS_0_NAME", "a"),
            ("CONFIGOR_CONTACTS_0_EMAIL", "a@x"),
            ("CONFIGOR_CONTACTS_1_EMAIL", "b@x"),
            ("CONFIGOR_CONTACTS_1_ACTIVE", "false"),
            ("CONFIGOR_CONTACTS_3_EMAIL", "skipped@x"),
        ]);
        run(&mut tree, &env, Some("Configor")).unwrap();
        assert_eq!(
            tree["contacts"],
            json!([
                {"name": "a", "email": "a@x", "active": true},
                {"name": "", "email": "b@x", "active": false}
            ])
        );
    }

    #[test]
    fn test_probed_element_must_satisfy_required() {
        let mut tree = seeded();
        let env = vars(&[("CONFIGOR_CONTACTS_0_NAME", "a")]);
        let err = run(&mut tree, &env, Some("Configor")).unwrap_err();
        assert_eq!(err.to_string(), "contacts.0.email is required, but blank");
    }

    #[test]
    fn test_invalid_literal_names_variable() {
        let mut tree = seeded();
        let env = vars(&[("CONFIGOR_HOSTS", "[a, b")]);
        let err = run(&mut tree, &env, Some("Configor")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "CONFIGOR_HOSTS"));
    }
}
