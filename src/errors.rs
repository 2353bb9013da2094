use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// An HTTP-flavoured failure object: a name, a message and a status code.
///
/// Built through [`HttpErrors`]; the host's error layer renders it as the
/// JSON body `{ "statusCode", "error", "message" }`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct HttpError
{
    pub name: String,
    pub message: String,
    pub status_code: u16,
}

impl HttpError
{
    pub fn new(status: StatusCode, message: Option<&str>) -> HttpError
    {
        let reason = status.canonical_reason().unwrap_or("Unknown Error");
        let compact = reason.replace(' ', "");
        let name = if compact.ends_with("Error") {
            compact
        } else {
            std::format!("{}Error", compact)
        };
        HttpError {
            name,
            message: message.unwrap_or(reason).to_string(),
            status_code: status.as_u16(),
        }
    }

    pub fn status(&self) -> StatusCode
    {
        StatusCode::from_u16(self.status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for HttpError
{
    fn into_response(self) -> Response
    {
        let status = self.status();
        let body = Json(json!({
            "statusCode": self.status_code,
            "error": status.canonical_reason().unwrap_or("Unknown Error"),
            "message": self.message,
        }));
        (status, body).into_response()
    }
}

/// Error-helper capability: manufactures [`HttpError`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpErrors;

impl HttpErrors
{
    pub fn not_found(&self) -> HttpError
    {
        HttpError::new(StatusCode::NOT_FOUND, None)
    }

    pub fn bad_request(&self, message: &str) -> HttpError
    {
        HttpError::new(StatusCode::BAD_REQUEST, Some(message))
    }

    pub fn conflict(&self, message: &str) -> HttpError
    {
        HttpError::new(StatusCode::CONFLICT, Some(message))
    }

    pub fn internal_server_error(&self) -> HttpError
    {
        HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, None)
    }
}

/// Failures raised by a storage backend. These reach callers unchanged.
#[derive(Error, Debug)]
pub enum StoreError
{
    #[error("invalid object id: {0}")]
    InvalidId(#[from] bson::oid::Error),

    #[error("duplicate key on {collection}: {id}")]
    DuplicateKey { collection: String, id: String },

    #[error("performing an update on the path '_id' would modify the immutable field '_id'")]
    ImmutableId,

    #[error("unsupported operator {0}")]
    UnsupportedOperator(String),

    #[error("bson serialization failed: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization failed: {0}")]
    BsonDe(#[from] bson::de::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("upsert on {0} returned no document")]
    Upsert(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[cfg(feature = "rocks")]
    #[error(transparent)]
    Rocks(#[from] rocksdb::Error),

    #[cfg(feature = "mongo")]
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a collection accessor.
///
/// `NotFound` is the only kind produced by the accessor itself.
#[derive(Error, Debug)]
pub enum CrudError
{
    #[error(transparent)]
    NotFound(HttpError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CrudError
{
    pub fn is_not_found(&self) -> bool
    {
        matches!(self, CrudError::NotFound(_))
    }

    pub fn status_code(&self) -> Option<u16>
    {
        match self {
            CrudError::NotFound(e) => Some(e.status_code),
            CrudError::Store(_) => None,
        }
    }
}

pub type CrudResult<T> = Result<T, CrudError>;

/// Registration failures reported by the host before a plugin runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError
{
    #[error("plugin {plugin} requires decorator '{decorator}' which is not present")]
    MissingDecorator { plugin: String, decorator: String },

    #[error("plugin {plugin} depends on plugin '{dependency}' which is not registered")]
    MissingDependency { plugin: String, dependency: String },

    #[error("decorator '{0}' holds a value of a different type")]
    DecoratorType(String),

    #[error("decorator '{0}' is not present")]
    UnknownDecorator(String),
}
