/// Errors found while defining or resolving a schema. Fatal at load time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate model or table name `{name}`")]
    DuplicateModel { name: String },

    #[error("duplicate field or column `{field}` in model `{model}`")]
    DuplicateField { model: String, field: String },

    #[error("invalid attributes on model `{model}`: {reason}")]
    InvalidAttributeCombination { model: String, reason: String },

    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },

    #[error("type mismatch on `{model}.{field}`: {reason}")]
    TypeMismatch {
        model: String,
        field: String,
        reason: String,
    },

    #[error("model `{model}` refers to unknown model `{target}`")]
    UnknownModel { model: String, target: String },
}
