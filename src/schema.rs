//! Column types, fields and schemas.
//!
//! A [`Schema`] is an ordered list of uniquely named [`Field`]s. It is written
//! once at training time (see [`Schema::save`]) and re-read verbatim to declare
//! the shape of files arriving on a stream.

use crate::error::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Semantic type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Array of strings, e.g. tokens.
    StringList,
    /// Sparse `f64` vector.
    Vector,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::StringList => "string_list",
            Self::Vector => "vector",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

const fn default_nullable() -> bool {
    true
}

impl Field {
    /// A nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    #[must_use]
    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(Error::schema_mismatch(&f.name, "is declared twice"));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Look up a column that must exist.
    pub fn require(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| Error::missing_column(name))
    }

    /// Look up a column that must exist with one of `expected` types.
    pub fn require_type(&self, name: &str, expected: &[DataType]) -> Result<&Field> {
        let field = self.require(name)?;
        if expected.contains(&field.data_type) {
            Ok(field)
        } else {
            let wanted: Vec<_> = expected.iter().map(|t| t.name()).collect();
            Err(Error::schema_mismatch(
                name,
                format!(
                    "has type {}, expected {}",
                    field.data_type,
                    wanted.join(" or ")
                ),
            ))
        }
    }

    /// Fail on the first of `names` that is absent.
    pub fn require_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            self.require(name)?;
        }
        Ok(())
    }

    /// A copy with `field` appended, or replacing a field of the same name in place.
    #[must_use]
    pub fn with_field(&self, field: Field) -> Self {
        let mut fields = self.fields.clone();
        match fields.iter_mut().find(|f| f.name == field.name) {
            Some(slot) => *slot = field,
            None => fields.push(field),
        }
        Self { fields }
    }

    /// Projection in the order of `names`.
    pub fn project(&self, names: &[&str]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|n| self.require(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    /// A copy without the named columns; unknown names are ignored.
    #[must_use]
    pub fn without(&self, names: &[&str]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| !names.contains(&f.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Write the schema as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Read a schema file written by [`Schema::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = fs::read_to_string(path).map_err(|e| Error::serialization(path, e.to_string()))?;
        let parsed: Self =
            serde_json::from_str(&body).map_err(|e| Error::serialization(path, e.to_string()))?;
        Self::new(parsed.fields).map_err(|e| Error::serialization(path, e.to_string()))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root")?;
        for field in &self.fields {
            writeln!(
                f,
                " |-- {}: {} (nullable = {})",
                field.name, field.data_type, field.nullable
            )?;
        }
        Ok(())
    }
}
