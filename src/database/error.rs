use std::fmt::{self, Display};

use potion::{Error, HtmlError};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Conflict,
    NotFound,
    Internal,
}

pub struct QueryError {
    kind: QueryErrorKind,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: QueryErrorKind::Internal,
            info,
        }
    }

    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }

    fn with_kind(kind: QueryErrorKind, info: String) -> Self {
        Self { kind, info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => match e.code().as_deref() {
                Some(UNIQUE_VIOLATION) | Some(CHECK_VIOLATION) => {
                    Self::with_kind(QueryErrorKind::Conflict, format!("{e}"))
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    Self::with_kind(QueryErrorKind::NotFound, format!("{e}"))
                }
                _ => Self::new(format!("{e}")),
            },
            sqlx::Error::RowNotFound => {
                Self::with_kind(QueryErrorKind::NotFound, String::from("RowNotFound"))
            }
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(String::from("Unknown error")),
        }
    }
}

impl Into<Error> for QueryError {
    fn into(self) -> Error {
        match self.kind {
            QueryErrorKind::Conflict => ConflictError::new(&self.info).into(),
            QueryErrorKind::NotFound => NotFoundError::new(&self.info).into(),
            QueryErrorKind::Internal => Error {
                code: 500,
                info: Some(self.info),
                redirect: None,
            },
        }
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl Into<Error> for CacheError {
    fn into(self) -> Error {
        Error {
            code: 500,
            info: Some(self.info),
            redirect: None,
        }
    }
}

/// A rejected payload field. Reported as a 400 naming the field.
#[derive(Debug)]
pub struct ValidationError {
    field: &'static str,
    info: String,
}

impl ValidationError {
    pub fn new(field: &'static str, info: &str) -> Self {
        Self {
            field,
            info: info.to_string(),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.info)
    }
}

impl std::error::Error for ValidationError {}

impl Into<Error> for ValidationError {
    fn into(self) -> Error {
        Error {
            code: 400,
            info: Some(self.to_string()),
            redirect: None,
        }
    }
}

#[derive(Debug)]
pub struct ConflictError {
    info: String,
}

impl ConflictError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Into<Error> for ConflictError {
    fn into(self) -> Error {
        Error {
            code: 409,
            info: Some(self.info),
            redirect: None,
        }
    }
}

#[derive(Debug)]
pub struct NotFoundError {
    info: String,
}

impl NotFoundError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Into<Error> for NotFoundError {
    fn into(self) -> Error {
        Error {
            code: 404,
            info: Some(self.info),
            redirect: None,
        }
    }
}

/// Authenticated, but not allowed to touch this object.
#[derive(Debug)]
pub struct ForbiddenError {
    info: String,
}

impl ForbiddenError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Into<Error> for ForbiddenError {
    fn into(self) -> Error {
        Error {
            code: 403,
            info: Some(self.info),
            redirect: None,
        }
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Into<potion::Error> for TypeError {
    fn into(self) -> potion::Error {
        HtmlError::InvalidRequest.new(&self.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}
