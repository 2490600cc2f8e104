use crate::{Error, Result, Value};
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt::{self, Display},
    str::FromStr,
    sync::RwLock,
};

/// Reserved field carrying aggregate counts.
pub const COUNT_FIELD: &str = "$count";

/// Declared type of a field, drives the projection coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Timestamp,
    Uuid,
    /// JSON object
    Json,
    /// JSON array of objects
    JsonArray,
    /// Native array of the inner type
    Array(Box<FieldType>),
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let inner = inner.parse::<FieldType>()?;
            return Ok(match inner {
                FieldType::Json => FieldType::JsonArray,
                inner => FieldType::Array(Box::new(inner)),
            });
        }
        Ok(match s.to_ascii_lowercase().as_str() {
            "" | "any" => FieldType::Any,
            "bool" | "boolean" => FieldType::Bool,
            "int" | "integer" | "int8" | "int16" | "int32" | "int64" | "bigint" | "serial" => {
                FieldType::Int
            }
            "float" | "double" | "number" | "decimal" | "numeric" => FieldType::Float,
            "string" | "text" | "varchar" | "char" | "enum" => FieldType::String,
            "datetime" | "timestamp" | "timestamptz" | "date" | "time" => FieldType::Timestamp,
            "uuid" => FieldType::Uuid,
            "json" | "jsonb" | "map" | "object" => FieldType::Json,
            _ => return Err(Error::msg(format!("Unknown field type `{}`", s))),
        })
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => f.write_str("any"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::Timestamp => f.write_str("datetime"),
            FieldType::Uuid => f.write_str("uuid"),
            FieldType::Json => f.write_str("json"),
            FieldType::JsonArray => f.write_str("[json]"),
            FieldType::Array(inner) => write!(f, "[{}]", inner),
        }
    }
}

/// Declared metadata of one field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub kind: FieldType,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Human readable name
    pub name: Cow<'static, str>,
}

impl FieldDef {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            nullable: false,
            default: None,
            name: Cow::Borrowed(""),
        }
    }
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

pub type Fields = BTreeMap<String, FieldDef>;

/// Which kind of relation an [`EntitySpec`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Table,
    View,
    Model,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Table => "table",
            EntityKind::View => "view",
            EntityKind::Model => "model",
        })
    }
}

/// Configuration of a table, view or model as declared in the registry.
///
/// Empty `schema`, `relation` and `key` fall back to the session schema, the
/// entity name and `id`.
#[derive(Debug, Clone, Default)]
pub struct EntityConfig {
    pub schema: String,
    pub relation: String,
    pub key: String,
    pub fields: Fields,
}

impl EntityConfig {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
    pub fn field(mut self, name: impl Into<String>, field: FieldDef) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

/// Resolved, immutable description of the relation an operation runs against.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub name: String,
    pub schema: String,
    pub relation: String,
    pub key: String,
    pub fields: Fields,
}

impl EntitySpec {
    /// Apply the fallbacks to `config` and add the synthetic count field.
    pub fn resolve(name: &str, default_schema: &str, config: &EntityConfig) -> Self {
        let schema = if config.schema.is_empty() {
            default_schema
        } else {
            &config.schema
        };
        let relation = if config.relation.is_empty() {
            name
        } else {
            &config.relation
        };
        let key = if config.key.is_empty() {
            "id"
        } else {
            &config.key
        };
        let mut fields = Fields::new();
        fields.insert(
            COUNT_FIELD.into(),
            FieldDef::new(FieldType::Int).nullable().named("count"),
        );
        fields.extend(config.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            name: name.into(),
            schema: schema.into(),
            relation: relation.replace('.', "_"),
            key: key.into(),
            fields,
        }
    }
}

/// Source of entity declarations.
pub trait Registry: Send + Sync {
    fn entity(&self, kind: EntityKind, key: &str) -> Option<EntityConfig>;
}

/// Registry kept in memory, filled at startup.
#[derive(Default)]
pub struct MemoryRegistry {
    entities: RwLock<HashMap<(EntityKind, String), EntityConfig>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn register(&self, kind: EntityKind, key: impl Into<String>, config: EntityConfig) {
        match self.entities.write() {
            Ok(mut entities) => {
                entities.insert((kind, key.into()), config);
            }
            Err(e) => log::error!("Registry lock is poisoned: {}", e),
        }
    }
    pub fn table(self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::Table, key, config);
        self
    }
    pub fn view(self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::View, key, config);
        self
    }
    pub fn model(self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::Model, key, config);
        self
    }
}

impl Registry for MemoryRegistry {
    fn entity(&self, kind: EntityKind, key: &str) -> Option<EntityConfig> {
        self.entities
            .read()
            .ok()?
            .get(&(kind, key.to_string()))
            .cloned()
    }
}
