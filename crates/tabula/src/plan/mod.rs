//! Migration planning: diff two physical schemas into an ordered plan.
//!
//! [`plan`] compares the previous snapshot (the last one persisted in the
//! migration log, or nothing) against the next one and produces a
//! [`MigrationPlan`]: a totally ordered list of [`MigrationStep`]s.
//!
//! Steps are grouped in phases so every step only depends on what earlier
//! steps left behind:
//!
//! ```text
//! drop foreign keys → drop other constraints → drop columns → drop tables
//! → add tables → add columns → alter columns
//! → add primary keys / uniques / indexes → add foreign keys
//! ```
//!
//! Within a phase, additions follow the declaration order of the next
//! snapshot and removals the declaration order of the previous one (table
//! drops go in reverse). Planning is pure and deterministic: the same pair of
//! snapshots always yields the same plan, byte for byte.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tabula_schema::{
    Column, DefaultValue, ForeignKey, Index, PhysicalSchema, PrimaryKey, Table, UniqueConstraint,
};

mod apply;
pub use apply::{ApplyStep, PlanError};

mod sql;
pub use sql::{default_expr, step_statements};


/// A table-level constraint or index, as planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    PrimaryKey(PrimaryKey),
    Unique(UniqueConstraint),
    Index(Index),
    ForeignKey(ForeignKey),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::PrimaryKey(pk) => &pk.name,
            Constraint::Unique(u) => &u.name,
            Constraint::Index(i) => &i.name,
            Constraint::ForeignKey(fk) => &fk.name,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Constraint::PrimaryKey(pk) => &pk.columns,
            Constraint::Unique(u) => &u.columns,
            Constraint::Index(i) => &i.columns,
            Constraint::ForeignKey(fk) => &fk.columns,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self, Constraint::ForeignKey(_))
    }

    /// Whether two constraints are the same kind of constraint.
    pub fn same_kind(&self, other: &Constraint) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Identity used for diffing: kind and columns, plus the target for
    /// foreign keys. Names are not part of it.
    fn key(&self) -> String {
        match self {
            Constraint::PrimaryKey(pk) => format!("pk:{}", pk.columns.join(",")),
            Constraint::Unique(u) => format!("unique:{}", u.columns.join(",")),
            Constraint::Index(i) => format!("index:{}", i.columns.join(",")),
            Constraint::ForeignKey(fk) => format!(
                "fk:{}->{}({}):{:?}",
                fk.columns.join(","),
                fk.references_table,
                fk.references_columns.join(","),
                fk.on_delete
            ),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::PrimaryKey(pk) => write!(f, "PRIMARY KEY ({})", pk.columns.join(", ")),
            Constraint::Unique(u) => write!(f, "UNIQUE {} ({})", u.name, u.columns.join(", ")),
            Constraint::Index(i) => write!(f, "INDEX {} ({})", i.name, i.columns.join(", ")),
            Constraint::ForeignKey(fk) => write!(
                f,
                "FOREIGN KEY ({}) -> {}.{}",
                fk.columns.join(", "),
                fk.references_table,
                fk.references_columns.join(", ")
            ),
        }
    }
}

/// Every constraint of a table, primary key first.
pub(crate) fn table_constraints(table: &Table) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    if !table.primary_key.columns.is_empty() {
        constraints.push(Constraint::PrimaryKey(table.primary_key.clone()));
    }
    constraints.extend(table.uniques.iter().cloned().map(Constraint::Unique));
    constraints.extend(table.indexes.iter().cloned().map(Constraint::Index));
    constraints.extend(table.foreign_keys.iter().cloned().map(Constraint::ForeignKey));
    constraints
}

/// What a single step changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepKind {
    /// Create a table with its columns and primary key. Its other
    /// constraints follow as separate steps.
    AddTable { table: Table },
    DropTable { table: String },
    AddColumn { table: String, column: Column },
    DropColumn { table: String, column: String },
    /// Change a column's type, nullability or default.
    AlterColumn {
        table: String,
        from: Column,
        to: Column,
    },
    AddConstraint {
        table: String,
        constraint: Constraint,
    },
    DropConstraint {
        table: String,
        constraint: Constraint,
    },
}

impl StepKind {
    /// Physical name of the table this step touches.
    pub fn table(&self) -> &str {
        match self {
            StepKind::AddTable { table } => &table.name,
            StepKind::DropTable { table }
            | StepKind::AddColumn { table, .. }
            | StepKind::DropColumn { table, .. }
            | StepKind::AlterColumn { table, .. }
            | StepKind::AddConstraint { table, .. }
            | StepKind::DropConstraint { table, .. } => table,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::AddTable { table } => write!(f, "+ table {}", table.name),
            StepKind::DropTable { table } => write!(f, "- table {table}"),
            StepKind::AddColumn { table, column } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(f, "+ {table}.{}: {}{nullable}", column.name, column.ty)
            }
            StepKind::DropColumn { table, column } => write!(f, "- {table}.{column}"),
            StepKind::AlterColumn { table, from, to } => {
                let mut changes = Vec::new();
                if from.ty != to.ty {
                    changes.push(format!("{} -> {}", from.ty, to.ty));
                }
                if from.nullable != to.nullable {
                    changes.push(format!(
                        "{} -> {}",
                        nullability(from.nullable),
                        nullability(to.nullable)
                    ));
                }
                if from.default != to.default {
                    changes.push(format!(
                        "default {} -> {}",
                        describe_default(from.default.as_ref()),
                        describe_default(to.default.as_ref())
                    ));
                }
                write!(f, "~ {table}.{}: {}", to.name, changes.join(", "))
            }
            StepKind::AddConstraint { table, constraint } => write!(f, "+ {table}: {constraint}"),
            StepKind::DropConstraint { table, constraint } => {
                write!(f, "- {table}: {constraint}")
            }
        }
    }
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "nullable" } else { "not null" }
}

fn describe_default(default: Option<&DefaultValue>) -> String {
    match default {
        None => "(none)".to_string(),
        Some(DefaultValue::Autoincrement) => "autoincrement()".to_string(),
        Some(DefaultValue::Now) => "now()".to_string(),
        Some(DefaultValue::GeneratedUuid) => "uuid()".to_string(),
        Some(DefaultValue::Literal(value)) => value.to_string(),
    }
}

/// One atomic schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Position in the plan, 0-based.
    pub rank: usize,
    pub kind: StepKind,
    /// The step can lose data.
    #[serde(default)]
    pub destructive: bool,
    /// The step needs existing rows to be filled in first
    /// (a NOT NULL column without a default).
    #[serde(default)]
    pub requires_backfill: bool,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.destructive {
            write!(f, " [destructive]")?;
        }
        if self.requires_backfill {
            write!(f, " [requires backfill]")?;
        }
        Ok(())
    }
}

/// An ordered list of migration steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter()
    }

    /// Whether any step can lose data.
    pub fn is_destructive(&self) -> bool {
        self.steps.iter().any(|s| s.destructive)
    }

    /// Steps that need existing rows backfilled before they can succeed.
    pub fn backfills(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter().filter(|s| s.requires_backfill)
    }

    /// Render the plan as Postgres DDL, one commented block per step.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for step in &self.steps {
            sql.push_str(&format!("-- {}\n", step.kind));
            for stmt in step_statements(&step.kind) {
                sql.push_str(&tabula_sql::render(&stmt).sql);
                sql.push_str(";\n");
            }
        }
        sql
    }

    /// Simulate the plan against `previous` and return the resulting schema.
    ///
    /// Fails on the first step whose preconditions do not hold.
    pub fn verify(&self, previous: Option<&PhysicalSchema>) -> Result<PhysicalSchema, PlanError> {
        let mut schema = previous.cloned().unwrap_or_default();
        for step in &self.steps {
            schema.apply_step(step)?;
        }
        Ok(schema)
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        writeln!(f, "{} step(s):\n", self.steps.len())?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Phase {
    DropForeignKeys,
    DropConstraints,
    DropColumns,
    DropTables,
    AddTables,
    AddColumns,
    AlterColumns,
    AddConstraints,
    AddForeignKeys,
}

const PHASES: usize = 9;

#[derive(Default)]
struct Phases {
    buckets: [Vec<(StepKind, bool, bool)>; PHASES],
}

impl Phases {
    fn push(&mut self, phase: Phase, kind: StepKind) {
        self.push_flagged(phase, kind, false, false);
    }

    fn push_flagged(&mut self, phase: Phase, kind: StepKind, destructive: bool, backfill: bool) {
        self.buckets[phase as usize].push((kind, destructive, backfill));
    }

    fn into_plan(self) -> MigrationPlan {
        let steps = self
            .buckets
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(rank, (kind, destructive, requires_backfill))| MigrationStep {
                rank,
                kind,
                destructive,
                requires_backfill,
            })
            .collect();
        MigrationPlan { steps }
    }
}

fn add_constraint_phase(constraint: &Constraint) -> Phase {
    if constraint.is_foreign_key() {
        Phase::AddForeignKeys
    } else {
        Phase::AddConstraints
    }
}

/// Compute the steps that turn `previous` into `next`.
pub fn plan(previous: Option<&PhysicalSchema>, next: &PhysicalSchema) -> MigrationPlan {
    let empty = PhysicalSchema::new();
    let previous = previous.unwrap_or(&empty);
    let mut phases = Phases::default();

    // Removals, in previous declaration order.
    let mut dropped_tables = Vec::new();
    for old in previous.iter_tables() {
        match next.table_by_name(&old.name) {
            None => {
                for fk in &old.foreign_keys {
                    phases.push(
                        Phase::DropForeignKeys,
                        StepKind::DropConstraint {
                            table: old.name.clone(),
                            constraint: Constraint::ForeignKey(fk.clone()),
                        },
                    );
                }
                dropped_tables.push(old.name.clone());
            }
            Some(new) => {
                let kept: HashSet<String> =
                    table_constraints(new).iter().map(Constraint::key).collect();
                for constraint in table_constraints(old) {
                    if kept.contains(&constraint.key()) {
                        continue;
                    }
                    let phase = if constraint.is_foreign_key() {
                        Phase::DropForeignKeys
                    } else {
                        Phase::DropConstraints
                    };
                    phases.push(
                        phase,
                        StepKind::DropConstraint {
                            table: old.name.clone(),
                            constraint,
                        },
                    );
                }

                for column in &old.columns {
                    if new.column(&column.name).is_none() {
                        phases.push_flagged(
                            Phase::DropColumns,
                            StepKind::DropColumn {
                                table: old.name.clone(),
                                column: column.name.clone(),
                            },
                            true,
                            false,
                        );
                    }
                }
            }
        }
    }
    for table in dropped_tables.into_iter().rev() {
        phases.push_flagged(Phase::DropTables, StepKind::DropTable { table }, true, false);
    }

    // Additions and changes, in next declaration order.
    for new in next.iter_tables() {
        match previous.table_by_name(&new.name) {
            None => {
                let mut bare = new.clone();
                bare.uniques.clear();
                bare.indexes.clear();
                bare.foreign_keys.clear();
                phases.push(Phase::AddTables, StepKind::AddTable { table: bare });

                for constraint in table_constraints(new) {
                    if matches!(constraint, Constraint::PrimaryKey(_)) {
                        continue;
                    }
                    phases.push(
                        add_constraint_phase(&constraint),
                        StepKind::AddConstraint {
                            table: new.name.clone(),
                            constraint,
                        },
                    );
                }
            }
            Some(old) => {
                for column in &new.columns {
                    match old.column(&column.name) {
                        None => {
                            let backfill = !column.nullable && column.default.is_none();
                            phases.push_flagged(
                                Phase::AddColumns,
                                StepKind::AddColumn {
                                    table: new.name.clone(),
                                    column: column.clone(),
                                },
                                false,
                                backfill,
                            );
                        }
                        Some(current) if column_changed(current, column) => {
                            let destructive = current.ty != column.ty;
                            // SET NOT NULL never fills existing NULLs, default or not
                            let backfill = current.nullable && !column.nullable;
                            phases.push_flagged(
                                Phase::AlterColumns,
                                StepKind::AlterColumn {
                                    table: new.name.clone(),
                                    from: current.clone(),
                                    to: column.clone(),
                                },
                                destructive,
                                backfill,
                            );
                        }
                        Some(_) => {}
                    }
                }

                let existing: HashSet<String> =
                    table_constraints(old).iter().map(Constraint::key).collect();
                for constraint in table_constraints(new) {
                    if existing.contains(&constraint.key()) {
                        continue;
                    }
                    phases.push(
                        add_constraint_phase(&constraint),
                        StepKind::AddConstraint {
                            table: new.name.clone(),
                            constraint,
                        },
                    );
                }
            }
        }
    }

    phases.into_plan()
}

fn column_changed(current: &Column, desired: &Column) -> bool {
    current.ty != desired.ty
        || current.nullable != desired.nullable
        || current.default != desired.default
}
