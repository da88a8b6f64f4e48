//! Field metadata for configuration records.
//!
//! A record's shape is discovered from its serialized `Default` value. A
//! [`Schema`] adds what serde cannot express: default literals, required
//! fields, explicit environment variable names, flattening, and which fields
//! hold nested records or sequences of records.
//!
//! ```
//! use configor::{Configurable, Field, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Db {
//!     name: String,
//!     user: String,
//!     password: String,
//!     port: u16,
//! }
//!
//! impl Configurable for Db {
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field(Field::new("user").default_value("root"))
//!             .field(Field::new("password").required().env("DB_PASSWORD"))
//!             .field(Field::new("port").default_value("3306"))
//!     }
//! }
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct App {
//!     app_name: String,
//!     db: Db,
//! }
//!
//! impl Configurable for App {
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field(Field::new("app_name").default_value("configor"))
//!             .field(Field::record::<Db>("db"))
//!     }
//! }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// A record that can be loaded by [`Configor`](crate::Configor).
///
/// The blank (zero) value of every field is taken from `Default`.
pub trait Configurable: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Per-field annotations. Fields left out are still loaded, just without
    /// defaults, required checks or custom names.
    fn schema() -> Schema {
        Schema::new()
    }
}

static EMPTY_SCHEMA: Schema = Schema::new();
static NULL: Value = Value::Null;

/// Ordered list of annotated fields for one record type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
    /// Keys whose blank value is `null` but which only hold text, such as
    /// `Option<String>`. Filled in from the record type, never by hand.
    text_fields: Vec<String>,
}

impl Schema {
    pub const fn new() -> Self {
        Self {
            fields: Vec::new(),
            text_fields: Vec::new(),
        }
    }

    /// `R::schema()` completed with what only `R` itself can tell.
    pub(crate) fn of<R: Configurable>(zero: &Value) -> Self {
        let mut schema = R::schema();
        schema.text_fields = optional_text_fields::<R>(zero);
        schema
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every field of a record, in visiting order.
    ///
    /// Declared fields come first. Flattened records embedded with
    /// `#[serde(flatten)]` have their fields spliced in place; flattened records
    /// under their own key stay nested. Keys of the zero tree that no
    /// declaration covers follow, so a record with an empty schema is still
    /// walked completely.
    pub(crate) fn slots<'a>(&'a self, zero: &'a Map<String, Value>) -> Vec<Slot<'a>> {
        let mut slots = Vec::new();
        let mut seen = HashSet::new();
        self.collect_declared(zero, &mut slots, &mut seen);

        for (name, value) in zero {
            if seen.contains(name.as_str()) {
                continue;
            }
            let shape = match value {
                Value::Object(map) if !map.is_empty() => SlotShape::Record {
                    schema: &EMPTY_SCHEMA,
                    zero: value,
                },
                _ => SlotShape::Value,
            };
            slots.push(Slot {
                name: name.as_str(),
                field: None,
                zero: value,
                shape,
                text: self.is_text(name),
                flatten: false,
            });
        }
        slots
    }

    fn collect_declared<'a>(
        &'a self,
        zero: &'a Map<String, Value>,
        slots: &mut Vec<Slot<'a>>,
        seen: &mut HashSet<&'a str>,
    ) {
        for field in &self.fields {
            if field.flatten
                && !zero.contains_key(&field.name)
                && let Shape::Record { schema, .. } = &field.shape
            {
                schema.collect_declared(zero, slots, seen);
                continue;
            }
            if !seen.insert(field.name.as_str()) {
                continue;
            }
            let shape = match &field.shape {
                Shape::Value => SlotShape::Value,
                Shape::Record { schema, zero: own } => SlotShape::Record { schema, zero: own },
                Shape::List { schema, zero: element } => SlotShape::List {
                    schema,
                    zero: element,
                },
            };
            slots.push(Slot {
                name: field.name.as_str(),
                field: Some(field),
                zero: zero.get(&field.name).unwrap_or(&NULL),
                shape,
                text: self.is_text(&field.name),
                flatten: field.flatten,
            });
        }
    }

    fn is_text(&self, name: &str) -> bool {
        self.text_fields.iter().any(|t| t == name)
    }

    /// The zero tree with text-only optional fields set to `""`, so that
    /// format decoders keep their values as strings.
    pub(crate) fn format_hint(&self, zero: &Map<String, Value>) -> Value {
        let mut hint = Map::new();
        for slot in self.slots(zero) {
            let value = match slot.shape {
                SlotShape::Record { schema, .. } => match slot.record_zero() {
                    Some(child) => schema.format_hint(child),
                    None => slot.zero.clone(),
                },
                SlotShape::Value if slot.text && slot.zero.is_null() => {
                    Value::String(String::new())
                }
                _ => slot.zero.clone(),
            };
            hint.insert(slot.name.to_string(), value);
        }
        Value::Object(hint)
    }

    /// Keys in `value` that match no field of this record, as dotted paths.
    pub(crate) fn unmatched_keys(&self, zero: &Map<String, Value>, value: &Value) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_unmatched(zero, value, &NamePath::root(), &mut keys);
        keys
    }

    fn collect_unmatched(
        &self,
        zero: &Map<String, Value>,
        value: &Value,
        path: &NamePath,
        keys: &mut Vec<String>,
    ) {
        let Value::Object(map) = value else {
            return;
        };
        let slots = self.slots(zero);
        for (key, child) in map {
            let child_path = path.child(key);
            let Some(slot) = slots.iter().find(|s| s.name == key) else {
                keys.push(child_path.dotted());
                continue;
            };
            match &slot.shape {
                SlotShape::Value => {}
                SlotShape::Record { schema, .. } => {
                    let empty = Map::new();
                    let child_zero = slot.record_zero().unwrap_or(&empty);
                    schema.collect_unmatched(child_zero, child, &child_path, keys);
                }
                SlotShape::List { schema, zero } => {
                    let Value::Array(items) = child else {
                        continue;
                    };
                    let empty = Map::new();
                    let element_zero = zero.as_object().unwrap_or(&empty);
                    for (idx, item) in items.iter().enumerate() {
                        schema.collect_unmatched(element_zero, item, &child_path.index(idx), keys);
                    }
                }
            }
        }
    }
}

/// Annotation for a single field, addressed by its serialized name.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    shape: Shape,
    default: Option<String>,
    required: bool,
    env: Option<String>,
    flatten: bool,
}

#[derive(Debug, Clone)]
enum Shape {
    Value,
    Record { schema: Schema, zero: Value },
    List { schema: Schema, zero: Value },
}

impl Field {
    /// A field holding a plain value (scalar, map, or sequence of scalars).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Value,
            default: None,
            required: false,
            env: None,
            flatten: false,
        }
    }

    /// A field holding a nested record.
    pub fn record<R: Configurable>(name: impl Into<String>) -> Self {
        Self {
            shape: {
                let zero = zero_value::<R>();
                Shape::Record {
                    schema: Schema::of::<R>(&zero),
                    zero,
                }
            },
            ..Self::new(name)
        }
    }

    /// A field holding a sequence of records. Sequences left empty by files can
    /// be filled from indexed environment variables.
    pub fn list<R: Configurable>(name: impl Into<String>) -> Self {
        Self {
            shape: {
                let zero = zero_value::<R>();
                Shape::List {
                    schema: Schema::of::<R>(&zero),
                    zero,
                }
            },
            ..Self::new(name)
        }
    }

    /// Literal installed when the field is blank, decoded as YAML unless the
    /// field holds a string.
    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// Fail the load if the field is still blank after every layer.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Read overrides from exactly this variable instead of a synthesized name.
    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.env = Some(name.into());
        self
    }

    /// Name the nested record's fields as if they belonged to the parent:
    /// override variables omit the record's own name. Only naming changes; the
    /// value stays under its key unless the field is `#[serde(flatten)]`.
    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_literal(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn env_override(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn is_flatten(&self) -> bool {
        self.flatten
    }
}

/// `R::default()` as a value tree, the blank value for every field of `R`.
pub(crate) fn zero_value<R: Serialize + Default>() -> Value {
    serde_json::to_value(R::default()).unwrap_or(Value::Null)
}

/// Top-level keys of `zero` that are blank as `null` and accept a string but
/// not a number, i.e. `Option<String>` and the like.
pub(crate) fn optional_text_fields<R: DeserializeOwned>(zero: &Value) -> Vec<String> {
    let Value::Object(map) = zero else {
        return Vec::new();
    };
    let accepts = |name: &str, sample: Value| {
        let mut tree = map.clone();
        tree.insert(name.to_string(), sample);
        serde_json::from_value::<R>(Value::Object(tree)).is_ok()
    };
    map.iter()
        .filter(|(_, value)| value.is_null())
        .map(|(name, _)| name)
        .filter(|name| accepts(name, Value::String(String::new())) && !accepts(name, Value::from(0)))
        .cloned()
        .collect()
}

/// Tree equality that compares an integer and a float by value, so an
/// override of `0` on an `f64` field still counts as blank.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || ((x.is_f64() || y.is_f64()) && x.as_f64() == y.as_f64())
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, v)| y.get(key).is_some_and(|w| same_value(v, w)))
        }
        _ => a == b,
    }
}

/// One field of a record as seen by the tree walkers.
#[derive(Debug)]
pub(crate) struct Slot<'a> {
    pub name: &'a str,
    pub field: Option<&'a Field>,
    /// Blank value at this location.
    pub zero: &'a Value,
    pub shape: SlotShape<'a>,
    /// Optional text field; literals are taken raw.
    pub text: bool,
    /// Nested record whose fields are named without this slot's name.
    pub flatten: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotShape<'a> {
    Value,
    Record { schema: &'a Schema, zero: &'a Value },
    /// `zero` is the blank element.
    List { schema: &'a Schema, zero: &'a Value },
}

impl<'a> Slot<'a> {
    pub fn default_literal(&self) -> Option<&'a str> {
        self.field.and_then(|f| f.default.as_deref())
    }

    pub fn is_required(&self) -> bool {
        self.field.is_some_and(|f| f.required)
    }

    pub fn env_override(&self) -> Option<&'a str> {
        self.field.and_then(|f| f.env.as_deref())
    }

    /// Zero map for the fields of a nested record. The parent's `Default`
    /// takes precedence over the nested type's own.
    pub fn record_zero(&self) -> Option<&'a Map<String, Value>> {
        match self.shape {
            SlotShape::Record { zero, .. } => self.zero.as_object().or_else(|| zero.as_object()),
            _ => None,
        }
    }

    pub fn leaf_kind(&self) -> LeafKind {
        LeafKind::of(self.zero, self.text)
    }

    /// Base path for the fields of a nested record in this slot.
    pub fn child_base(&self, parent: &NamePath) -> NamePath {
        if self.flatten {
            parent.flattened(self.name)
        } else {
            parent.child(self.name)
        }
    }
}

/// How a string literal is turned into a value for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafKind {
    Bool,
    String,
    Literal,
}

impl LeafKind {
    pub fn of(zero: &Value, text: bool) -> Self {
        match zero {
            Value::Bool(_) => LeafKind::Bool,
            Value::String(_) => LeafKind::String,
            Value::Null if text => LeafKind::String,
            _ => LeafKind::Literal,
        }
    }

    /// Decode a declared default.
    pub fn parse_default(self, raw: &str) -> Result<Value, String> {
        match self {
            LeafKind::String => Ok(Value::String(raw.to_string())),
            LeafKind::Bool | LeafKind::Literal => parse_yaml(raw),
        }
    }

    /// Decode an environment variable value.
    pub fn parse_env(self, raw: &str) -> Result<Value, String> {
        match self {
            LeafKind::Bool => Ok(Value::Bool(parse_lenient_bool(raw))),
            LeafKind::String => Ok(Value::String(raw.to_string())),
            LeafKind::Literal => parse_yaml(raw),
        }
    }
}

fn parse_yaml(raw: &str) -> Result<Value, String> {
    serde_yaml::from_str(raw).map_err(|e| e.to_string())
}

/// `""`, `"0"`, `"f"` and `"false"` (any case) are false, anything else is true.
pub(crate) fn parse_lenient_bool(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    !matches!(lower.as_str(), "" | "0" | "f" | "false")
}

/// Location of a field from the root record, e.g. `db.password` or `contacts.0.email`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
    /// A flattened record: part of the location, absent from override names.
    Flattened(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) | Segment::Flattened(name) => f.write_str(name),
            Segment::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl NamePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Field(name.to_string()));
        Self { segments }
    }

    pub fn flattened(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Flattened(name.to_string()));
        Self { segments }
    }

    pub fn index(&self, idx: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(idx));
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Dotted form used in error messages.
    pub fn dotted(&self) -> String {
        self.join(None, ".", true)
    }

    /// Environment variable name for this path, as written (not upper-cased).
    pub fn env_name(&self, prefix: Option<&str>, separator: &str) -> String {
        self.join(prefix, separator, false)
    }

    fn join(&self, prefix: Option<&str>, separator: &str, flattened: bool) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.segments.len() + 1);
        if let Some(prefix) = prefix {
            parts.push(prefix.to_string());
        }
        parts.extend(
            self.segments
                .iter()
                .filter(|s| flattened || !matches!(s, Segment::Flattened(_)))
                .map(Segment::to_string),
        );
        parts.join(separator)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Contact {
        name: String,
        email: String,
    }

    impl Configurable for Contact {
        fn schema() -> Schema {
            Schema::new().field(Field::new("email").required())
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Common {
        region: String,
        zone: u8,
    }

    impl Configurable for Common {
        fn schema() -> Schema {
            Schema::new().field(Field::new("region").default_value("eu"))
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Tls {
        enabled: bool,
        cert: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Server {
        host: String,
        tls: Tls,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct App {
        app_name: String,
        server: Server,
        contacts: Vec<Contact>,
        #[serde(flatten)]
        common: Common,
    }

    impl Configurable for App {
        fn schema() -> Schema {
            Schema::new()
                .field(Field::new("app_name").default_value("configor").env("APP_NAME"))
                .field(Field::list::<Contact>("contacts"))
                .field(Field::record::<Common>("common").flatten())
        }
    }

    fn zero_map<R: Serialize + Default>() -> Map<String, Value> {
        match zero_value::<R>() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_slots_declared_then_discovered() {
        let schema = App::schema();
        let zero = zero_map::<App>();
        let slots = schema.slots(&zero);
        let names: Vec<&str> = slots.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["app_name", "contacts", "region", "server", "zone"]);

        let app_name = &slots[0];
        assert_eq!(app_name.default_literal(), Some("configor"));
        assert_eq!(app_name.env_override(), Some("APP_NAME"));
        assert_eq!(app_name.leaf_kind(), LeafKind::String);

        assert!(matches!(slots[1].shape, SlotShape::List { .. }));
        assert_eq!(slots[2].default_literal(), Some("eu"));
        assert!(matches!(slots[3].shape, SlotShape::Record { .. }));
        assert!(matches!(slots[4].shape, SlotShape::Value));
    }

    #[test]
    fn test_discovered_record_is_walked() {
        let schema = App::schema();
        let zero = zero_map::<App>();
        let slots = schema.slots(&zero);
        let server = slots.iter().find(|s| s.name == "server").unwrap();
        let SlotShape::Record { schema, .. } = server.shape else {
            panic!("server should be a record");
        };
        let inner = schema.slots(server.record_zero().unwrap());
        let names: Vec<&str> = inner.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["host", "tls"]);
        assert!(matches!(inner[1].shape, SlotShape::Record { .. }));
    }

    #[test]
    fn test_unmatched_keys_are_dotted() {
        let schema = App::schema();
        let zero = zero_map::<App>();
        let value = json!({
            "app_name": "x",
            "region": "us",
            "verbose": true,
            "server": {"host": "h", "tls": {"enabled": true, "key": "k"}},
            "contacts": [{"name": "a", "email": "e"}, {"phone": "1"}]
        });
        let keys = schema.unmatched_keys(&zero, &value);
        assert_eq!(keys, vec!["verbose", "server.tls.key", "contacts.1.phone"]);
    }

    #[test]
    fn test_name_path_rendering() {
        let path = NamePath::root().child("contacts").index(0).child("email");
        assert_eq!(path.dotted(), "contacts.0.email");
        assert_eq!(path.env_name(Some("Configor"), "_"), "Configor_contacts_0_email");
        assert_eq!(path.env_name(None, "__"), "contacts__0__email");
        assert_eq!(path.to_string(), "contacts.0.email");
        assert!(NamePath::root().is_root());
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Site {
        name: String,
        token: Option<String>,
        limit: Option<u32>,
        extra: Option<Value>,
        common: Common,
    }

    impl Configurable for Site {
        fn schema() -> Schema {
            Schema::new().field(Field::record::<Common>("common").flatten())
        }
    }

    #[test]
    fn test_flatten_under_own_key_stays_nested() {
        let zero_tree = zero_value::<Site>();
        let schema = Schema::of::<Site>(&zero_tree);
        let zero = zero_tree.as_object().unwrap();
        let slots = schema.slots(zero);
        let names: Vec<&str> = slots.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["common", "name", "token", "limit", "extra"]);

        let common = &slots[0];
        assert!(common.flatten);
        let SlotShape::Record { schema: inner, .. } = common.shape else {
            panic!("common should be a record");
        };
        let inner_slots = inner.slots(common.record_zero().unwrap());
        assert_eq!(inner_slots[0].name, "region");
        assert_eq!(inner_slots[0].default_literal(), Some("eu"));

        let base = common.child_base(&NamePath::root());
        let region = base.child("region");
        assert_eq!(region.dotted(), "common.region");
        assert_eq!(region.env_name(Some("Configor"), "_"), "Configor_region");
    }

    #[test]
    fn test_optional_text_fields_detected() {
        let zero_tree = zero_value::<Site>();
        assert_eq!(optional_text_fields::<Site>(&zero_tree), vec!["token"]);

        let schema = Schema::of::<Site>(&zero_tree);
        let slots = schema.slots(zero_tree.as_object().unwrap());
        let kind = |name: &str| slots.iter().find(|s| s.name == name).unwrap().leaf_kind();
        assert_eq!(kind("token"), LeafKind::String);
        assert_eq!(kind("limit"), LeafKind::Literal);
        assert_eq!(kind("extra"), LeafKind::Literal);

        let hint = schema.format_hint(zero_tree.as_object().unwrap());
        assert_eq!(hint["token"], json!(""));
        assert_eq!(hint["limit"], Value::Null);
        assert_eq!(hint["common"], json!({"region": "", "zone": 0}));
    }

    #[test]
    fn test_same_value_compares_numbers_by_value() {
        assert!(same_value(&json!(0), &json!(0.0)));
        assert!(same_value(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!same_value(&json!(1), &json!(0.0)));
        assert!(!same_value(&json!(u64::MAX), &json!(u64::MAX - 1)));
        assert!(!same_value(&json!({"a": 0}), &json!({"a": 0, "b": 0})));
    }

    #[test]
    fn test_lenient_bool() {
        for raw in ["", "0", "f", "F", "false", "FALSE", "False"] {
            assert!(!parse_lenient_bool(raw), "{raw:?} should be false");
        }
        for raw in ["1", "t", "true", "yes", "no", "off"] {
            assert!(parse_lenient_bool(raw), "{raw:?} should be true");
        }
    }

    #[test]
    fn test_leaf_literals() {
        assert_eq!(LeafKind::String.parse_env("007"), Ok(json!("007")));
        assert_eq!(LeafKind::Literal.parse_env("3306"), Ok(json!(3306)));
        assert_eq!(LeafKind::Literal.parse_env("[a, b]"), Ok(json!(["a", "b"])));
        assert_eq!(LeafKind::Literal.parse_env("- a\n- b"), Ok(json!(["a", "b"])));
        assert_eq!(LeafKind::Bool.parse_env("no"), Ok(json!(true)));
        assert_eq!(LeafKind::Bool.parse_default("false"), Ok(json!(false)));
        assert!(LeafKind::Literal.parse_default("[a, b").is_err());
    }
}
