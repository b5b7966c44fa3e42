//! Schema authoring types: models, fields, relations and the schema registry.

use std::mem::discriminant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ScalarType, SchemaError, Value};

/// Default value expression for a field (`@default(...)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// `autoincrement()`: the store generates an increasing integer.
    Autoincrement,
    /// `now()`: evaluated at write time.
    Now,
    /// `uuid()`: a random v4 UUID, evaluated at write time.
    GeneratedUuid,
    /// A constant.
    Literal(Value),
}

/// A field-level attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// `@id`
    Id,
    /// `@default(...)`
    Default(DefaultValue),
    /// `@unique`
    Unique,
    /// `@updatedAt`
    UpdatedAt,
    /// `@map("column_name")`
    Map(String),
}

impl Attribute {
    fn label(&self) -> &'static str {
        match self {
            Attribute::Id => "@id",
            Attribute::Default(_) => "@default",
            Attribute::Unique => "@unique",
            Attribute::UpdatedAt => "@updatedAt",
            Attribute::Map(_) => "@map",
        }
    }
}

/// How many records sit on each side of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

/// A link from one model to another (`@relation(...)`).
///
/// The owning side lists its foreign-key fields in `fields` and the target's
/// key fields in `references`. The other side of the link leaves both empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub name: Option<String>,
    pub target: String,
    pub fields: Vec<String>,
    pub references: Vec<String>,
    pub cardinality: Cardinality,
    pub on_delete: ReferentialAction,
}

impl Relation {
    pub fn new(target: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: None,
            target: target.into(),
            fields: Vec::new(),
            references: Vec::new(),
            cardinality,
            on_delete: ReferentialAction::NoAction,
        }
    }

    pub fn one_to_one(target: impl Into<String>) -> Self {
        Self::new(target, Cardinality::OneToOne)
    }

    pub fn one_to_many(target: impl Into<String>) -> Self {
        Self::new(target, Cardinality::OneToMany)
    }

    pub fn many_to_many(target: impl Into<String>) -> Self {
        Self::new(target, Cardinality::ManyToMany)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Whether this side holds the foreign key.
    pub fn is_owning(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// What a field holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A stored column.
    Scalar(ScalarType),
    /// A navigation to another model; owns no column.
    Relation(Relation),
}

/// One field of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub attributes: Vec<Attribute>,
}

impl Field {
    /// A required scalar field.
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar(ty),
            nullable: false,
            attributes: Vec::new(),
        }
    }

    /// A relation (navigation) field.
    pub fn relation(name: impl Into<String>, relation: Relation) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation(relation),
            nullable: false,
            attributes: Vec::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn id(self) -> Self {
        self.attribute(Attribute::Id)
    }

    pub fn unique(self) -> Self {
        self.attribute(Attribute::Unique)
    }

    pub fn default(self, value: DefaultValue) -> Self {
        self.attribute(Attribute::Default(value))
    }

    pub fn updated_at(self) -> Self {
        self.attribute(Attribute::UpdatedAt)
    }

    pub fn map(self, column: impl Into<String>) -> Self {
        self.attribute(Attribute::Map(column.into()))
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            FieldKind::Scalar(ty) => Some(*ty),
            FieldKind::Relation(_) => None,
        }
    }

    pub fn relation_info(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Relation(rel) => Some(rel),
            FieldKind::Scalar(_) => None,
        }
    }

    pub fn is_id(&self) -> bool {
        self.attributes.iter().any(|a| matches!(a, Attribute::Id))
    }

    pub fn is_unique(&self) -> bool {
        self.attributes.iter().any(|a| matches!(a, Attribute::Unique))
    }

    pub fn is_updated_at(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, Attribute::UpdatedAt))
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Default(d) => Some(d),
            _ => None,
        })
    }

    /// The physical column name: the `@map` override or the field name.
    pub fn column_name(&self) -> &str {
        self.attributes
            .iter()
            .find_map(|a| match a {
                Attribute::Map(name) => Some(name.as_str()),
                _ => None,
            })
            .unwrap_or(&self.name)
    }
}

/// A model-level constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelConstraint {
    /// `@@id([a, b])`: composite primary key.
    Id(Vec<String>),
    /// `@@unique([a, b])`
    Unique {
        name: Option<String>,
        fields: Vec<String>,
    },
    /// `@@index([a, b])`
    Index {
        name: Option<String>,
        fields: Vec<String>,
    },
}

impl ModelConstraint {
    pub fn id<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModelConstraint::Id(fields.into_iter().map(Into::into).collect())
    }

    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModelConstraint::Unique {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModelConstraint::Index {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// A declarative entity definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub fields: Vec<Field>,
    pub constraints: Vec<ModelConstraint>,
    /// `@@map("table_name")`
    pub table_name: Option<String>,
}

impl Model {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<Field>,
        constraints: Vec<ModelConstraint>,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            constraints,
            table_name: None,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// The physical table name: the `@@map` override or the model name.
    pub fn physical_name(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the primary-key fields, from `@id` or `@@id`.
    pub fn primary_key_fields(&self) -> Vec<&str> {
        if let Some(field) = self.fields.iter().find(|f| f.is_id()) {
            return vec![field.name.as_str()];
        }
        self.constraints
            .iter()
            .find_map(|c| match c {
                ModelConstraint::Id(fields) => {
                    Some(fields.iter().map(String::as_str).collect())
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Check the structural rules a model must satisfy on its own.
    fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidAttributeCombination {
            model: self.name.clone(),
            reason,
        };

        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    model: self.name.clone(),
                    field: field.name.clone(),
                });
            }

            for (i, attr) in field.attributes.iter().enumerate() {
                if field.attributes[..i]
                    .iter()
                    .any(|prev| discriminant(prev) == discriminant(attr))
                {
                    return Err(invalid(format!(
                        "`{}` is repeated on field `{}`",
                        attr.label(),
                        field.name
                    )));
                }
            }

            if let FieldKind::Relation(_) = field.kind
                && let Some(attr) = field.attributes.first()
            {
                return Err(invalid(format!(
                    "`{}` is not allowed on relation field `{}`",
                    attr.label(),
                    field.name
                )));
            }

            if field.default_value().is_some() && field.is_updated_at() {
                return Err(invalid(format!(
                    "field `{}` cannot have both `@default` and `@updatedAt`",
                    field.name
                )));
            }

            if field.is_id() && field.nullable {
                return Err(invalid(format!(
                    "primary key field `{}` cannot be nullable",
                    field.name
                )));
            }
        }

        let id_fields: Vec<&Field> = self.fields.iter().filter(|f| f.is_id()).collect();
        let composite_ids: Vec<&Vec<String>> = self
            .constraints
            .iter()
            .filter_map(|c| match c {
                ModelConstraint::Id(fields) => Some(fields),
                _ => None,
            })
            .collect();

        if id_fields.len() > 1 {
            return Err(invalid(format!(
                "fields `{}` and `{}` are both marked `@id`; use `@@id` for a composite key",
                id_fields[0].name, id_fields[1].name
            )));
        }
        if composite_ids.len() > 1 {
            return Err(invalid("`@@id` is declared more than once".to_string()));
        }
        match (id_fields.first(), composite_ids.first()) {
            (Some(field), Some(_)) => {
                return Err(invalid(format!(
                    "field `{}` is marked `@id` but the model also declares `@@id`",
                    field.name
                )));
            }
            (None, None) => {
                return Err(invalid("model has no primary key".to_string()));
            }
            (None, Some(fields)) if fields.is_empty() => {
                return Err(invalid("`@@id` needs at least one field".to_string()));
            }
            _ => {}
        }

        Ok(())
    }
}

/// The registry of models of one schema document.
///
/// Built once at startup, then resolved into a [`PhysicalSchema`](crate::PhysicalSchema).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: IndexMap<String, Model>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define and register a model.
    pub fn define_model(
        &mut self,
        name: impl Into<String>,
        fields: Vec<Field>,
        constraints: Vec<ModelConstraint>,
    ) -> Result<&Model, SchemaError> {
        self.add_model(Model::new(name, fields, constraints))
    }

    /// Register an already-built model (e.g. one with a table name override).
    pub fn add_model(&mut self, model: Model) -> Result<&Model, SchemaError> {
        if self.models.contains_key(&model.name) {
            return Err(SchemaError::DuplicateModel { name: model.name });
        }
        model.validate()?;

        let name = model.name.clone();
        self.models.insert(name.clone(), model);
        Ok(&self.models[&name])
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }
}
