//! Attribute and constraint resolution: [`Schema`] → [`PhysicalSchema`].

use std::collections::{HashMap, HashSet};

use tabula_sql::{foreign_key_name, index_name, primary_key_name, unique_index_name};

use crate::{
    Cardinality, Column, DefaultValue, Field, FieldKind, ForeignKey, Index, Model,
    ModelConstraint, PhysicalSchema, PrimaryKey, ReferentialAction, Relation, ScalarType, Schema,
    SchemaError, Table, UniqueConstraint,
};

impl Schema {
    /// Resolve every model into a validated physical schema.
    ///
    /// Deterministic: the same schema always resolves to the same snapshot.
    /// Implicit many-to-many join tables follow the model tables.
    pub fn resolve(&self) -> Result<PhysicalSchema, SchemaError> {
        let mut physical = PhysicalSchema::new();
        let mut table_names = HashSet::new();

        for model in self.models() {
            let table = resolve_model(self, model)?;
            if !table_names.insert(table.name.clone()) {
                return Err(SchemaError::DuplicateModel { name: table.name });
            }
            physical.tables.insert(model.name.clone(), table);
        }

        // each join table is claimed by exactly the two sides of one relation
        let mut sides: HashMap<String, usize> = HashMap::new();
        for model in self.models() {
            for field in &model.fields {
                let Some(relation) = field.relation_info() else {
                    continue;
                };
                if relation.cardinality != Cardinality::ManyToMany || relation.is_owning() {
                    continue;
                }

                let join = join_table(self, model, relation)?;
                let claimed = sides.entry(join.name.clone()).or_insert(0);
                *claimed += 1;
                if let Some(existing) = physical.tables.get(&join.model) {
                    if *existing == join && *claimed <= 2 {
                        continue;
                    }
                    return Err(SchemaError::DuplicateModel { name: join.name });
                }
                if !table_names.insert(join.name.clone()) {
                    return Err(SchemaError::DuplicateModel { name: join.name });
                }
                physical.tables.insert(join.model.clone(), join);
            }
        }

        Ok(physical)
    }
}

/// Resolve a single model into its table.
pub fn resolve_model(schema: &Schema, model: &Model) -> Result<Table, SchemaError> {
    let table_name = model.physical_name().to_string();

    let mut columns: Vec<Column> = Vec::new();
    for field in &model.fields {
        let FieldKind::Scalar(ty) = field.kind else {
            continue;
        };
        let column = resolve_column(model, field, ty)?;
        if columns.iter().any(|c| c.name == column.name) {
            return Err(SchemaError::DuplicateField {
                model: model.name.clone(),
                field: column.name,
            });
        }
        columns.push(column);
    }

    let pk_fields = model.primary_key_fields();
    let pk_columns = column_names(model, &pk_fields)?;
    let primary_key = PrimaryKey {
        name: primary_key_name(&table_name),
        columns: pk_columns,
    };

    let mut uniques = Vec::new();
    for field in model.fields.iter().filter(|f| f.is_unique()) {
        let cols = vec![field.column_name().to_string()];
        uniques.push(UniqueConstraint {
            name: unique_index_name(&table_name, &cols),
            columns: cols,
        });
    }

    let mut indexes = Vec::new();
    for constraint in &model.constraints {
        match constraint {
            ModelConstraint::Id(_) => {}
            ModelConstraint::Unique { name, fields } => {
                let cols = non_empty_columns(model, fields, "@@unique")?;
                uniques.push(UniqueConstraint {
                    name: name
                        .clone()
                        .unwrap_or_else(|| unique_index_name(&table_name, &cols)),
                    columns: cols,
                });
            }
            ModelConstraint::Index { name, fields } => {
                let cols = non_empty_columns(model, fields, "@@index")?;
                indexes.push(Index {
                    name: name
                        .clone()
                        .unwrap_or_else(|| index_name(&table_name, &cols)),
                    columns: cols,
                });
            }
        }
    }

    let mut table = Table {
        model: model.name.clone(),
        name: table_name,
        columns,
        primary_key,
        uniques,
        indexes,
        foreign_keys: Vec::new(),
        relations: model
            .fields
            .iter()
            .filter(|f| f.relation_info().is_some())
            .map(|f| f.name.clone())
            .collect(),
    };

    for field in &model.fields {
        if let Some(fk) = resolve_relation(schema, model, &table, field)? {
            table.foreign_keys.push(fk);
        }
    }

    Ok(table)
}

fn resolve_column(model: &Model, field: &Field, ty: ScalarType) -> Result<Column, SchemaError> {
    let mismatch = |reason: String| SchemaError::TypeMismatch {
        model: model.name.clone(),
        field: field.name.clone(),
        reason,
    };

    let default = match field.default_value() {
        None => None,
        Some(DefaultValue::Autoincrement) if !ty.is_integer() => {
            return Err(mismatch(format!(
                "autoincrement() needs an integer or large integer field, not {ty}"
            )));
        }
        Some(DefaultValue::Now) if ty != ScalarType::Timestamp => {
            return Err(mismatch(format!("now() needs a timestamp field, not {ty}")));
        }
        Some(DefaultValue::GeneratedUuid) if !matches!(ty, ScalarType::Uuid | ScalarType::Text) => {
            return Err(mismatch(format!("uuid() needs a uuid or text field, not {ty}")));
        }
        Some(DefaultValue::Literal(value)) => {
            if value.is_null() && !field.nullable {
                return Err(mismatch(
                    "a NULL default needs a nullable field".to_string(),
                ));
            }
            let coerced = value
                .coerce_to(ty)
                .map_err(|err| mismatch(err.to_string()))?;
            Some(DefaultValue::Literal(coerced))
        }
        Some(other) => Some(other.clone()),
    };

    if field.is_updated_at() && ty != ScalarType::Timestamp {
        return Err(mismatch(format!(
            "@updatedAt needs a timestamp field, not {ty}"
        )));
    }

    Ok(Column {
        field: field.name.clone(),
        name: field.column_name().to_string(),
        ty,
        nullable: field.nullable,
        default,
        updated_at: field.is_updated_at(),
    })
}

/// Column names of the given scalar fields.
fn column_names(model: &Model, fields: &[&str]) -> Result<Vec<String>, SchemaError> {
    fields
        .iter()
        .map(|name| {
            scalar_field(model, name).map(|field| field.column_name().to_string())
        })
        .collect()
}

fn non_empty_columns(
    model: &Model,
    fields: &[String],
    what: &str,
) -> Result<Vec<String>, SchemaError> {
    if fields.is_empty() {
        return Err(SchemaError::InvalidAttributeCombination {
            model: model.name.clone(),
            reason: format!("`{what}` needs at least one field"),
        });
    }
    let names: Vec<&str> = fields.iter().map(String::as_str).collect();
    column_names(model, &names)
}

fn scalar_field<'m>(model: &'m Model, name: &str) -> Result<&'m Field, SchemaError> {
    model
        .field(name)
        .filter(|f| f.scalar_type().is_some())
        .ok_or_else(|| SchemaError::UnknownField {
            model: model.name.clone(),
            field: name.to_string(),
        })
}

fn resolve_relation(
    schema: &Schema,
    model: &Model,
    table: &Table,
    field: &Field,
) -> Result<Option<ForeignKey>, SchemaError> {
    let Some(relation) = field.relation_info() else {
        return Ok(None);
    };
    let invalid = |reason: String| SchemaError::InvalidAttributeCombination {
        model: model.name.clone(),
        reason,
    };

    let target = schema
        .model(&relation.target)
        .ok_or_else(|| SchemaError::UnknownModel {
            model: model.name.clone(),
            target: relation.target.clone(),
        })?;

    if !relation.is_owning() {
        if !relation.references.is_empty() {
            return Err(invalid(format!(
                "relation `{}` lists `references` without `fields`",
                field.name
            )));
        }
        return Ok(None);
    }

    if relation.cardinality == Cardinality::ManyToMany {
        return Err(invalid(format!(
            "many-to-many relation `{}` cannot declare foreign key fields",
            field.name
        )));
    }
    if relation.fields.len() != relation.references.len() {
        return Err(invalid(format!(
            "relation `{}` has {} fields but {} references",
            field.name,
            relation.fields.len(),
            relation.references.len()
        )));
    }

    let mut local_columns = Vec::new();
    let mut target_columns = Vec::new();
    let mut all_nullable = true;
    for (local, remote) in relation.fields.iter().zip(&relation.references) {
        let local_field = scalar_field(model, local)?;
        let remote_field = scalar_field(target, remote)?;
        let (local_ty, remote_ty) = (local_field.scalar_type(), remote_field.scalar_type());
        if local_ty != remote_ty {
            return Err(SchemaError::TypeMismatch {
                model: model.name.clone(),
                field: local.clone(),
                reason: format!(
                    "references `{}.{}` of a different type",
                    target.name, remote
                ),
            });
        }
        all_nullable &= local_field.nullable;
        local_columns.push(local_field.column_name().to_string());
        target_columns.push(remote_field.column_name().to_string());
    }

    let target_is_key = {
        let pk = target.primary_key_fields();
        let refs: Vec<&str> = relation.references.iter().map(String::as_str).collect();
        same_set(&pk, &refs)
            || (refs.len() == 1
                && target.field(refs[0]).is_some_and(|f| f.is_unique()))
            || target.constraints.iter().any(|c| match c {
                ModelConstraint::Unique { fields, .. } => {
                    same_set(&fields.iter().map(String::as_str).collect::<Vec<_>>(), &refs)
                }
                _ => false,
            })
    };
    if !target_is_key {
        return Err(invalid(format!(
            "relation `{}` must reference the primary key or a unique field set of `{}`",
            field.name, target.name
        )));
    }

    if relation.cardinality == Cardinality::OneToOne && !table.is_unique_set(&local_columns) {
        return Err(invalid(format!(
            "one-to-one relation `{}` needs its fields to be unique",
            field.name
        )));
    }

    if relation.on_delete == ReferentialAction::SetNull && !all_nullable {
        return Err(invalid(format!(
            "relation `{}` uses SetNull on non-nullable fields",
            field.name
        )));
    }

    Ok(Some(ForeignKey {
        name: foreign_key_name(&table.name, &local_columns),
        columns: local_columns,
        references_table: target.physical_name().to_string(),
        references_columns: target_columns,
        on_delete: relation.on_delete,
    }))
}

fn same_set(a: &[&str], b: &[&str]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

/// Build the implicit join table for a many-to-many relation: `_<Name>` for a
/// named relation, `_<A>To<B>` otherwise.
fn join_table(schema: &Schema, model: &Model, relation: &Relation) -> Result<Table, SchemaError> {
    let other = schema
        .model(&relation.target)
        .ok_or_else(|| SchemaError::UnknownModel {
            model: model.name.clone(),
            target: relation.target.clone(),
        })?;

    let (a, b) = if model.name <= other.name {
        (model, other)
    } else {
        (other, model)
    };
    let name = match &relation.name {
        Some(name) => format!("_{name}"),
        None => format!("_{}To{}", a.name, b.name),
    };

    let key_column = |side: &Model| -> Result<(String, ScalarType), SchemaError> {
        let pk = side.primary_key_fields();
        match pk.as_slice() {
            [single] => {
                let field = scalar_field(side, single)?;
                let ty = field.scalar_type().unwrap_or(ScalarType::BigInt);
                Ok((field.column_name().to_string(), ty))
            }
            _ => Err(SchemaError::InvalidAttributeCombination {
                model: side.name.clone(),
                reason: format!(
                    "implicit many-to-many relation with `{}` needs a single-field primary key",
                    if side.name == a.name { &b.name } else { &a.name }
                ),
            }),
        }
    };
    let (a_key, a_ty) = key_column(a)?;
    let (b_key, b_ty) = key_column(b)?;

    let column = |col: &str, ty: ScalarType| Column {
        field: col.to_string(),
        name: col.to_string(),
        ty,
        nullable: false,
        default: None,
        updated_at: false,
    };

    Ok(Table {
        model: name.clone(),
        name: name.clone(),
        columns: vec![column("A", a_ty), column("B", b_ty)],
        primary_key: PrimaryKey {
            name: primary_key_name(&name),
            columns: vec!["A".to_string(), "B".to_string()],
        },
        uniques: Vec::new(),
        indexes: vec![Index {
            name: index_name(&name, &["B"]),
            columns: vec!["B".to_string()],
        }],
        foreign_keys: vec![
            ForeignKey {
                name: foreign_key_name(&name, &["A"]),
                columns: vec!["A".to_string()],
                references_table: a.physical_name().to_string(),
                references_columns: vec![a_key],
                on_delete: ReferentialAction::Cascade,
            },
            ForeignKey {
                name: foreign_key_name(&name, &["B"]),
                columns: vec!["B".to_string()],
                references_table: b.physical_name().to_string(),
                references_columns: vec![b_key],
                on_delete: ReferentialAction::Cascade,
            },
        ],
        relations: Vec::new(),
    })
}
