//! Schema types for tabula.
//!
//! Models are authored through [`Schema::define_model`], then resolved with
//! [`Schema::resolve`] into a [`PhysicalSchema`]: the validated snapshot that
//! the migration planner diffs and the executor queries against.

mod error;
pub use error::*;

mod model;
pub use model::*;

mod physical;
pub use physical::*;

mod resolve;
pub use resolve::resolve_model;

mod value;
pub use value::*;

#[cfg(test)]
mod tests;
