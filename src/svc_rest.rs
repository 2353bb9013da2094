//! A classic CRUD resource over one collection accessor.
//!
//! - `POST /{resource}`: create a record from the JSON body.
//! - `GET /{resource}`: list records; `?filter=<json>` narrows the list.
//! - `GET /{resource}/:id`: read one record.
//! - `PUT /{resource}/:id`: patch (or upsert) a record.
//! - `DELETE /{resource}/:id`: delete a record, returning it.

use axum::{
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bson::{Bson, Document};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

use crate::crud::CollectionAccessor;
use crate::errors::{CrudError, HttpErrors, StoreError};

struct Resource
{
    accessor: CollectionAccessor,
    item_key: String,
    list_key: String,
}

type Shared = Arc<Resource>;

pub fn resource_router(accessor: CollectionAccessor, resource: &str,
                       item_key: &str)
    -> Router
{
    let state = Arc::new(Resource {
        accessor,
        item_key: item_key.to_string(),
        list_key: resource.to_string(),
    });
    Router::new()
        .route(&std::format!("/{}", resource),
               post(create_record).get(list_records))
        .route(&std::format!("/{}/:id", resource),
               get(read_record).put(update_record).delete(delete_record))
        .with_state(state)
}

/// Timeout and request tracing for every route.
pub fn with_middleware(app: Router) -> Router
{
    app.layer(
        ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|error: BoxError| async move {
            if error.is::<tower::timeout::error::Elapsed>() {
                Ok(StatusCode::REQUEST_TIMEOUT)
            } else {
                Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Unhandled internal error: {}", error),
                        ))
            }
        }))
        .timeout(Duration::from_secs(10))
        .layer(TraceLayer::new_for_http())
        .into_inner(),
        )
}

pub async fn server(app: Router, port: u16) -> std::io::Result<()>
{
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(with_middleware(app).into_make_service())
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Renders a BSON value as plain JSON: ObjectIds as hex strings,
/// DateTimes as RFC 3339 strings.
pub fn to_json(value: Bson) -> Value
{
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => Value::Object(
            doc.into_iter().map(|(k, v)| (k, to_json(v))).collect()),
        Bson::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

fn wrap(key: &str, value: Value) -> Json<Value>
{
    let mut body = Map::new();
    body.insert(key.to_string(), value);
    Json(Value::Object(body))
}

/// Maps accessor failures onto HTTP responses.
pub struct ApiError(CrudError);

impl From<CrudError> for ApiError
{
    fn from(e: CrudError) -> Self
    {
        ApiError(e)
    }
}

impl IntoResponse for ApiError
{
    fn into_response(self) -> Response
    {
        match self.0 {
            CrudError::NotFound(e) => e.into_response(),
            CrudError::Store(e @ StoreError::InvalidId(_)) => {
                HttpErrors.bad_request(&e.to_string()).into_response()
            },
            CrudError::Store(e @ StoreError::DuplicateKey { .. }) => {
                tracing::warn!("rejected request: {}", e);
                HttpErrors.conflict(&e.to_string()).into_response()
            },
            CrudError::Store(e) => {
                tracing::error!("store failure: {}", e);
                HttpErrors.internal_server_error().into_response()
            },
        }
    }
}

fn bad_request(message: String) -> Response
{
    tracing::warn!("rejected request: {}", message);
    HttpErrors.bad_request(&message).into_response()
}

fn to_document(body: Map<String, Value>) -> Result<Document, Response>
{
    bson::to_document(&body)
        .map_err(|e| bad_request(std::format!("invalid record: {}", e)))
}

async fn create_record(State(res): State<Shared>,
                       Json(body): Json<Map<String, Value>>)
    -> Result<impl IntoResponse, Response>
{
    let data = to_document(body)?;
    let record = res.accessor.create(data).await
        .map_err(|e| ApiError(e).into_response())?;
    Ok((StatusCode::CREATED, wrap(&res.item_key, to_json(Bson::Document(record)))))
}

async fn read_record(State(res): State<Shared>, Path(id): Path<String>)
    -> Result<impl IntoResponse, ApiError>
{
    let record = res.accessor.read(&id).await?;
    Ok(wrap(&res.item_key, to_json(Bson::Document(record))))
}

async fn update_record(State(res): State<Shared>, Path(id): Path<String>,
                       Json(body): Json<Map<String, Value>>)
    -> Result<impl IntoResponse, Response>
{
    let data = to_document(body)?;
    let record = res.accessor.update(&id, data).await
        .map_err(|e| ApiError(e).into_response())?;
    Ok(wrap(&res.item_key, to_json(Bson::Document(record))))
}

async fn delete_record(State(res): State<Shared>, Path(id): Path<String>)
    -> Result<impl IntoResponse, ApiError>
{
    let record = res.accessor.delete(&id).await?;
    Ok(wrap(&res.item_key, to_json(Bson::Document(record))))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListParams
{
    pub filter: Option<String>,
}

async fn list_records(State(res): State<Shared>, Query(params): Query<ListParams>)
    -> Result<impl IntoResponse, Response>
{
    let query = match params.filter {
        Some(raw) => {
            let parsed: Map<String, Value> = serde_json::from_str(&raw)
                .map_err(|e| bad_request(std::format!("invalid filter: {}", e)))?;
            Some(to_document(parsed)?)
        },
        None => None,
    };
    let records = res.accessor.list(query).await
        .map_err(|e| ApiError(e).into_response())?;
    let items = records.into_iter()
        .map(|r| to_json(Bson::Document(r)))
        .collect();
    Ok(wrap(&res.list_key, Value::Array(items)))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use axum::{body::Body, http::Request};
    use bson::{doc, oid::ObjectId, DateTime};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::crud::Crud;
    use crate::memstore::MemStore;

    fn app() -> Router
    {
        let crud = Crud::new(Arc::new(MemStore::new("test")), HttpErrors);
        resource_router(crud.accessor("accounts"), "accounts", "account")
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>)
        -> (StatusCode, Value)
    {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            },
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn renders_plain_json()
    {
        let oid = ObjectId::new();
        let value = to_json(Bson::Document(doc! {
            "_id": oid,
            "n": 1,
            "when": DateTime::from_millis(0),
            "nested": { "list": [1_i64, "x"] },
        }));
        assert_eq!(value, json!({
            "_id": oid.to_hex(),
            "n": 1,
            "when": "1970-01-01T00:00:00Z",
            "nested": { "list": [1, "x"] },
        }));
    }

    #[tokio::test]
    async fn crud_round_trip_over_http()
    {
        let app = app();
        let (status, body) = call(&app, "POST", "/accounts", Some(json!({ "b": 2 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["account"]["_id"].as_str().unwrap().to_string();
        assert_eq!(body["account"]["b"], 2);

        let (status, body) = call(&app, "GET", &format!("/accounts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account"]["b"], 2);

        let (status, body) = call(&app, "PUT", &format!("/accounts/{id}"),
                                  Some(json!({ "c": 1 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account"]["b"], 2);
        assert_eq!(body["account"]["c"], 1);

        let (_, body) = call(&app, "GET", "/accounts", None).await;
        assert_eq!(body["accounts"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "DELETE", &format!("/accounts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account"]["c"], 1);

        let (status, body) = call(&app, "GET", &format!("/accounts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({
            "statusCode": 404,
            "error": "Not Found",
            "message": "Not Found",
        }));
    }

    #[tokio::test]
    async fn list_honours_filter()
    {
        let app = app();
        for a in [1, 2, 1] {
            call(&app, "POST", "/accounts", Some(json!({ "a": a }))).await;
        }
        let (status, body) = call(&app, "GET", "/accounts?filter=%7B%22a%22%3A1%7D", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accounts"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, "GET", "/accounts?filter=nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_id_is_conflict()
    {
        let app = app();
        let record = json!({ "_id": "acct-1", "b": 2 });
        let (status, _) = call(&app, "POST", "/accounts", Some(record.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, "POST", "/accounts", Some(record)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["statusCode"], 409);
        assert_eq!(body["error"], "Conflict");
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request()
    {
        let app = app();
        let (status, body) = call(&app, "GET", "/accounts/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }
}
