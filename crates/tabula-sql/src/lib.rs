//! SQL AST and rendering.
//!
//! Build SQL as a typed AST, then render to a string with automatic
//! parameter numbering and formatting. Covers the DML the executor needs
//! (`SELECT`, `INSERT`, `UPDATE`, `DELETE`) and the DDL migration steps
//! lower to (`CREATE TABLE`, `ALTER TABLE`, `CREATE INDEX`, ...).

mod expr;
pub use expr::*;

mod render;
pub use render::*;

mod stmt;
pub use stmt::*;

/// Result of rendering SQL.
#[derive(Debug, Clone)]
pub struct RenderedSql {
    /// The SQL string with $1, $2, etc. placeholders.
    pub sql: String,

    /// Parameter names in order (maps to $1, $2, etc.).
    pub params: Vec<ParamName>,
}

/// The name of a table (or table alias).
pub type TableName = String;

/// The name of a column (or column alias).
pub type ColumnName = String;

/// The name of a query parameter.
pub type ParamName = String;

/// Longest identifier Postgres keeps without truncating.
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use tabula_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use tabula_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Escape `%`, `_` and `\` so a value matches literally inside a `LIKE` pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Generate a standard index name for a table and columns.
///
/// Uses the convention `idx_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::index_name("user", &["email"]), "idx_user_email");
/// assert_eq!(tabula_sql::index_name("post", &["author_id", "created_at"]), "idx_post_author_id_created_at");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    bounded_name(format!("idx_{}_{}", table, join_columns(columns)))
}

/// Generate a standard unique constraint name for a table and columns.
///
/// Uses the convention `uq_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::unique_index_name("user", &["email"]), "uq_user_email");
/// assert_eq!(tabula_sql::unique_index_name("category", &["shop_id", "handle"]), "uq_category_shop_id_handle");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    bounded_name(format!("uq_{}_{}", table, join_columns(columns)))
}

/// Primary key constraint name, following the Postgres default `{table}_pkey`.
///
/// ```
/// assert_eq!(tabula_sql::primary_key_name("book"), "book_pkey");
/// ```
pub fn primary_key_name(table: &str) -> String {
    bounded_name(format!("{}_pkey", table))
}

/// Foreign key constraint name, following the Postgres default `{table}_{columns}_fkey`.
///
/// ```
/// assert_eq!(tabula_sql::foreign_key_name("post", &["author_id"]), "post_author_id_fkey");
/// ```
pub fn foreign_key_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    bounded_name(format!("{}_{}_fkey", table, join_columns(columns)))
}

fn join_columns(columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    cols.join("_")
}

/// Keep a generated identifier within Postgres' 63-byte limit.
///
/// Names that fit are returned untouched. Longer names are cut and suffixed
/// with a stable hash of the full name so distinct long names stay distinct.
pub fn bounded_name(name: String) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name;
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];
    let max_prefix_len = PG_IDENT_MAX - suffix.len() - 1;

    // Generated names are expected to be ASCII snake_case; still, avoid splitting UTF-8.
    let mut len = max_prefix_len;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}
