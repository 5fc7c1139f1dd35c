/// Error types for sqlx-named-runner
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error while compiling the placeholder pattern
    #[error("Failed to parse SQL template: {0}")]
    Parse(#[from] regex::Error),

    /// The API was used in a way that can never succeed; raised before anything reaches the driver
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// One or more placeholders of the template had no binding at execution time
    #[error("Placeholder(s) not bound: {}", .0.join(", "))]
    MissingBinding(Vec<String>),

    /// Error from SQLx database operations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A result column could not be written into a target property
    #[error("Cannot map column '{column}' to property '{property}': {reason}")]
    Mapping {
        column: String,
        property: String,
        reason: String,
    },

    /// A batch stopped partway; `counts` holds the per-row results applied before `failed_index`
    #[error("Batch failed at parameter set {failed_index}")]
    BatchPartialFailure {
        counts: Vec<u64>,
        failed_index: usize,
        #[source]
        source: sqlx::Error,
    },
}

impl Error {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }

    pub(crate) fn mapping(
        column: impl Into<String>,
        property: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Error::Mapping {
            column: column.into(),
            property: property.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for sqlx-named-runner operations
pub type Result<T> = std::result::Result<T, Error>;
