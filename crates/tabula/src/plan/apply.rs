//! Step simulation against a [`PhysicalSchema`].
//!
//! Applying a step checks its preconditions the way the database would
//! (the table exists, the column does not, the foreign key target is there)
//! and then updates the schema in place. Plan verification and the memory
//! store both go through here.

use tabula_schema::{PhysicalSchema, PrimaryKey, Table};

use super::{Constraint, MigrationStep, StepKind};

/// A step whose preconditions do not hold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("{step}: table `{table}` does not exist")]
    TableNotFound { step: String, table: String },

    #[error("{step}: table `{table}` already exists")]
    TableAlreadyExists { step: String, table: String },

    #[error("{step}: column `{table}.{column}` does not exist")]
    ColumnNotFound {
        step: String,
        table: String,
        column: String,
    },

    #[error("{step}: column `{table}.{column}` already exists")]
    ColumnAlreadyExists {
        step: String,
        table: String,
        column: String,
    },

    #[error("{step}: constraint `{name}` does not exist on `{table}`")]
    ConstraintNotFound {
        step: String,
        table: String,
        name: String,
    },

    #[error("{step}: constraint `{name}` already exists on `{table}`")]
    ConstraintAlreadyExists {
        step: String,
        table: String,
        name: String,
    },

    #[error("{step}: `{source_table}` references missing table `{target_table}`")]
    ForeignKeyTargetNotFound {
        step: String,
        source_table: String,
        target_table: String,
    },
}

/// Apply migration steps to an in-memory schema.
pub trait ApplyStep {
    fn apply_step(&mut self, step: &MigrationStep) -> Result<(), PlanError>;
}

impl ApplyStep for PhysicalSchema {
    fn apply_step(&mut self, step: &MigrationStep) -> Result<(), PlanError> {
        let desc = step.kind.to_string();

        match &step.kind {
            StepKind::AddTable { table } => {
                if self.table_by_name(&table.name).is_some() {
                    return Err(PlanError::TableAlreadyExists {
                        step: desc,
                        table: table.name.clone(),
                    });
                }
                for fk in &table.foreign_keys {
                    if fk.references_table != table.name
                        && self.table_by_name(&fk.references_table).is_none()
                    {
                        return Err(PlanError::ForeignKeyTargetNotFound {
                            step: desc,
                            source_table: table.name.clone(),
                            target_table: fk.references_table.clone(),
                        });
                    }
                }
                self.tables.insert(table.model.clone(), table.clone());
            }

            StepKind::DropTable { table } => {
                let key = self
                    .tables
                    .iter()
                    .find(|(_, t)| t.name == *table)
                    .map(|(key, _)| key.clone())
                    .ok_or_else(|| PlanError::TableNotFound {
                        step: desc,
                        table: table.clone(),
                    })?;
                self.tables.shift_remove(&key);
            }

            StepKind::AddColumn { table, column } => {
                let t = table_mut(self, table, &desc)?;
                if t.column(&column.name).is_some() {
                    return Err(PlanError::ColumnAlreadyExists {
                        step: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                t.columns.push(column.clone());
            }

            StepKind::DropColumn { table, column } => {
                let t = table_mut(self, table, &desc)?;
                let Some(pos) = t.columns.iter().position(|c| c.name == *column) else {
                    return Err(PlanError::ColumnNotFound {
                        step: desc,
                        table: table.clone(),
                        column: column.clone(),
                    });
                };
                t.columns.remove(pos);
                // Postgres drops same-table constraints that cover the column.
                let covers = |cols: &[String]| cols.iter().any(|c| c == column);
                if covers(&t.primary_key.columns) {
                    t.primary_key = PrimaryKey {
                        name: String::new(),
                        columns: Vec::new(),
                    };
                }
                t.uniques.retain(|u| !covers(&u.columns));
                t.indexes.retain(|i| !covers(&i.columns));
                t.foreign_keys.retain(|fk| !covers(&fk.columns));
            }

            StepKind::AlterColumn { table, from, to } => {
                let t = table_mut(self, table, &desc)?;
                let Some(column) = t.columns.iter_mut().find(|c| c.name == from.name) else {
                    return Err(PlanError::ColumnNotFound {
                        step: desc,
                        table: table.clone(),
                        column: from.name.clone(),
                    });
                };
                *column = to.clone();
            }

            StepKind::AddConstraint { table, constraint } => {
                if let Constraint::ForeignKey(fk) = constraint {
                    let Some(target) = self.table_by_name(&fk.references_table) else {
                        return Err(PlanError::ForeignKeyTargetNotFound {
                            step: desc,
                            source_table: table.clone(),
                            target_table: fk.references_table.clone(),
                        });
                    };
                    if let Some(missing) = fk
                        .references_columns
                        .iter()
                        .find(|c| target.column(c).is_none())
                    {
                        return Err(PlanError::ColumnNotFound {
                            step: desc,
                            table: fk.references_table.clone(),
                            column: missing.clone(),
                        });
                    }
                }

                let t = table_mut(self, table, &desc)?;
                if let Some(missing) = constraint.columns().iter().find(|c| t.column(c).is_none())
                {
                    return Err(PlanError::ColumnNotFound {
                        step: desc,
                        table: table.clone(),
                        column: missing.clone(),
                    });
                }
                if has_constraint(t, constraint) {
                    return Err(PlanError::ConstraintAlreadyExists {
                        step: desc,
                        table: table.clone(),
                        name: constraint.name().to_string(),
                    });
                }
                match constraint {
                    Constraint::PrimaryKey(pk) => t.primary_key = pk.clone(),
                    Constraint::Unique(u) => t.uniques.push(u.clone()),
                    Constraint::Index(i) => t.indexes.push(i.clone()),
                    Constraint::ForeignKey(fk) => t.foreign_keys.push(fk.clone()),
                }
            }

            StepKind::DropConstraint { table, constraint } => {
                let t = table_mut(self, table, &desc)?;
                if !has_constraint(t, constraint) {
                    return Err(PlanError::ConstraintNotFound {
                        step: desc,
                        table: table.clone(),
                        name: constraint.name().to_string(),
                    });
                }
                let name = constraint.name();
                match constraint {
                    Constraint::PrimaryKey(_) => {
                        t.primary_key = PrimaryKey {
                            name: String::new(),
                            columns: Vec::new(),
                        }
                    }
                    Constraint::Unique(_) => t.uniques.retain(|u| u.name != name),
                    Constraint::Index(_) => t.indexes.retain(|i| i.name != name),
                    Constraint::ForeignKey(_) => t.foreign_keys.retain(|fk| fk.name != name),
                }
            }
        }

        Ok(())
    }
}

fn table_mut<'s>(
    schema: &'s mut PhysicalSchema,
    table: &str,
    desc: &str,
) -> Result<&'s mut Table, PlanError> {
    schema
        .table_by_name_mut(table)
        .ok_or_else(|| PlanError::TableNotFound {
            step: desc.to_string(),
            table: table.to_string(),
        })
}

/// Whether a constraint of the same kind and name is present.
fn has_constraint(table: &Table, constraint: &Constraint) -> bool {
    let name = constraint.name();
    match constraint {
        Constraint::PrimaryKey(_) => !table.primary_key.columns.is_empty(),
        Constraint::Unique(_) => table.uniques.iter().any(|u| u.name == name),
        Constraint::Index(_) => table.indexes.iter().any(|i| i.name == name),
        Constraint::ForeignKey(_) => table.foreign_keys.iter().any(|fk| fk.name == name),
    }
}
