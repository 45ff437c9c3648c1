use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Routing configuration errors
    #[error("Table rule not found for logic table '{table}'")]
    TableRuleNotFound { table: String },

    #[error("Cannot find data source intersection for logic tables {tables:?}")]
    NoDataSourceIntersection { tables: Vec<String> },

    #[error("Cannot find actual data source intersection for unicast tables {tables:?}")]
    UnicastIntersectionEmpty { tables: Vec<String> },

    #[error("Hint data source '{name}' is not configured")]
    HintDataSourceNotFound { name: String },

    #[error("Hint table '{table}' does not exist on data source '{data_source}'")]
    HintTableNotFound { data_source: String, table: String },

    #[error("No data node matched for logic table '{table}'")]
    NoRouteTarget { table: String },

    #[error("Sharding algorithm error: {0}")]
    ShardingAlgorithm(String),

    #[error("Parameter index {index} out of range for {count} parameters")]
    ParameterIndexOutOfRange { index: usize, count: usize },

    // Merge errors
    #[error("Column count mismatch on shard {shard}: expected {expected}, actual {actual}")]
    ColumnCountMismatch {
        shard: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Column index {index} out of range for {count} columns")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    #[error("Cannot aggregate {function} over {value_type} value")]
    AggregationType {
        function: String,
        value_type: String,
    },

    #[error("Query result error: {0}")]
    QueryResult(String),

    #[error("Encryption error: {0}")]
    Encrypt(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::Io(format!("Not found: {}", err)),
            std::io::ErrorKind::PermissionDenied => {
                Error::Io(format!("Permission denied: {}", err))
            }
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Generic(format!("Metrics error: {}", err))
    }
}

impl Error {
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Serialization(_) => -2,
            Error::Config(_) => -3,
            Error::TableRuleNotFound { .. } => -10,
            Error::NoDataSourceIntersection { .. } => -11,
            Error::UnicastIntersectionEmpty { .. } => -12,
            Error::HintDataSourceNotFound { .. } => -13,
            Error::HintTableNotFound { .. } => -14,
            Error::NoRouteTarget { .. } => -15,
            Error::ShardingAlgorithm(_) => -16,
            Error::ParameterIndexOutOfRange { .. } => -17,
            Error::ColumnCountMismatch { .. } => -20,
            Error::ColumnIndexOutOfRange { .. } => -21,
            Error::AggregationType { .. } => -22,
            Error::QueryResult(_) => -23,
            Error::Encrypt(_) => -30,
            Error::KeyGeneration(_) => -31,
            Error::Generic(_) => -99,
        }
    }

    /// Routing-configuration failures: the rule cannot place the statement.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::TableRuleNotFound { .. }
                | Error::NoDataSourceIntersection { .. }
                | Error::UnicastIntersectionEmpty { .. }
                | Error::HintDataSourceNotFound { .. }
                | Error::HintTableNotFound { .. }
                | Error::NoRouteTarget { .. }
                | Error::ShardingAlgorithm(_)
        )
    }

    /// Merge-shape and aggregation failures caused by an upstream collaborator.
    pub fn is_merge_error(&self) -> bool {
        matches!(
            self,
            Error::ColumnCountMismatch { .. }
                | Error::ColumnIndexOutOfRange { .. }
                | Error::AggregationType { .. }
                | Error::QueryResult(_)
        )
    }

    /// The core never retries; transient connection failures are the executor's concern.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Context trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T>;
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| Error::Generic(format!("{}: {}", msg, e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::Generic(format!("{}: {}", f(), e)))
    }
}
