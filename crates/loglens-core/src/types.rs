use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the store to a registered log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(i64);

impl FileId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What object storage reports for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectListing {
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl ObjectListing {
    pub fn new(name: impl Into<String>, size_bytes: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            created_at,
        }
    }
}

/// Kind of log file, inferred from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    ErrorLog,
    SqlAgent,
    Other,
}

impl FileCategory {
    pub fn infer(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("errorlog") {
            Self::ErrorLog
        } else if lower.contains("sqlagent") {
            Self::SqlAgent
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorLog => "errorlog",
            Self::SqlAgent => "sqlagent",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database engine that wrote a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DbDialect {
    #[default]
    #[serde(rename = "MSSQL")]
    Mssql,
    #[serde(rename = "other")]
    Other,
}

impl DbDialect {
    /// Keep the listing-time dialect only if the decoded text carries `marker`
    pub fn refine(self, text: &str, marker: &str) -> Self {
        if text.contains(marker) {
            self
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mssql => "MSSQL",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DbDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote log object selected for ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub server: String,
    pub size_bytes: u64,
    pub category: FileCategory,
    pub dialect: DbDialect,
    pub generated_at: DateTime<Utc>,
}

impl SourceFile {
    pub fn from_listing(listing: ObjectListing, dialect: DbDialect) -> Self {
        let server = server_name(&listing.name).to_string();
        let category = FileCategory::infer(&listing.name);
        Self {
            name: listing.name,
            server,
            size_bytes: listing.size_bytes,
            category,
            dialect,
            generated_at: listing.created_at,
        }
    }

    /// Size in KiB, rounded to two decimals
    pub fn size_kb(&self) -> f64 {
        (self.size_bytes as f64 / 1024.0 * 100.0).round() / 100.0
    }
}

/// Server that produced an object, e.g. `SQLPROD01` for
/// `uploads/SQLPROD01_ERRORLOG.1`. Names without `_` use the whole final
/// path segment.
pub fn server_name(object_name: &str) -> &str {
    let file_name = object_name.rsplit('/').next().unwrap_or(object_name);
    file_name.split('_').next().unwrap_or(file_name)
}

/// Fixed origin recorded for every registration
pub const SOURCE_KIND: &str = "database";

/// Metadata row written once per ingested file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRegistration {
    pub server: String,
    pub file_name: String,
    pub size_kb: f64,
    pub category: FileCategory,
    pub source: String,
    pub dialect: DbDialect,
    pub generated_at: DateTime<Utc>,
    pub extracted_at: DateTime<Utc>,
    pub principal: String,
}

impl FileRegistration {
    pub fn new(
        file: &SourceFile,
        dialect: DbDialect,
        extracted_at: DateTime<Utc>,
        principal: impl Into<String>,
    ) -> Self {
        Self {
            server: file.server.clone(),
            file_name: file.name.clone(),
            size_kb: file.size_kb(),
            category: file.category,
            source: SOURCE_KIND.to_string(),
            dialect,
            generated_at: file.generated_at,
            extracted_at,
            principal: principal.into(),
        }
    }
}

/// Classification of an extracted line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
        }
    }
}

/// One structured error line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub file_id: FileId,
    pub logged_at: NaiveDateTime,
    pub message_type: MessageType,
    pub error_code: i32,
    pub severity: i32,
}
