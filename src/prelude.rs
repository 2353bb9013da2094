use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};

use crate::errors::{StoreError, StoreResult};

/// A named collection of documents inside a [`Database`].
///
/// Every method issues exactly one request to the backend.
#[async_trait]
pub trait Collection: Send + Sync
{
    fn name(&self) -> &str;

    /// Inserts `doc`, generating an `_id` when absent. Returns the `_id`.
    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>;

    async fn find_one(&self, filter: Document) -> StoreResult<Option<Document>>;

    /// All matching documents in the backend's natural order.
    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>>;

    /// Applies `update` to the first match and returns the document as it
    /// is after the write. With `upsert`, a missing match is inserted.
    async fn find_one_and_update(&self, filter: Document, update: Document,
                                 upsert: bool)
        -> StoreResult<Option<Document>>;

    /// Removes the first match and returns it as it was before removal.
    async fn find_one_and_delete(&self, filter: Document)
        -> StoreResult<Option<Document>>;
}

/// An open database handle. Collections are created on first use.
pub trait Database: Send + Sync
{
    fn name(&self) -> &str;

    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    fn object_id(&self) -> ObjectId
    {
        ObjectId::new()
    }
}

/// Anything usable as a document identifier.
pub trait IntoObjectId
{
    fn into_object_id(self) -> StoreResult<ObjectId>;
}

impl IntoObjectId for ObjectId
{
    fn into_object_id(self) -> StoreResult<ObjectId>
    {
        Ok(self)
    }
}

impl IntoObjectId for &ObjectId
{
    fn into_object_id(self) -> StoreResult<ObjectId>
    {
        Ok(*self)
    }
}

impl IntoObjectId for &str
{
    fn into_object_id(self) -> StoreResult<ObjectId>
    {
        ObjectId::parse_str(self).map_err(StoreError::from)
    }
}

impl IntoObjectId for String
{
    fn into_object_id(self) -> StoreResult<ObjectId>
    {
        self.as_str().into_object_id()
    }
}

impl IntoObjectId for &String
{
    fn into_object_id(self) -> StoreResult<ObjectId>
    {
        self.as_str().into_object_id()
    }
}
