//! Per-collection CRUD accessors.
//!
//! ```ignore
//! let accounts = crud.accessor("accounts");
//! let created = accounts.create(doc! { "b": 2 }).await?;
//! let id = created.get_object_id("_id")?;
//! let patched = accounts.update(id, doc! { "c": 1 }).await?;
//! let removed = accounts.delete(id).await?;
//! ```

use std::sync::Arc;

use bson::{doc, oid::ObjectId, DateTime, Document};

use crate::errors::{CrudError, CrudResult, HttpErrors, StoreError};
use crate::prelude::{Collection, Database, IntoObjectId};
use crate::query::ID;

pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";

/// Accessor factory. Holds the database handle; hands out one
/// [`CollectionAccessor`] per call without caching.
#[derive(Clone)]
pub struct Crud
{
    db: Arc<dyn Database>,
    errors: HttpErrors,
}

impl Crud
{
    pub fn new(db: Arc<dyn Database>, errors: HttpErrors) -> Crud
    {
        Crud { db, errors }
    }

    pub fn accessor(&self, collection: &str) -> CollectionAccessor
    {
        CollectionAccessor {
            collection: self.db.collection(collection),
            db: self.db.clone(),
            errors: self.errors,
        }
    }
}

/// CRUD operations bound to one collection.
#[derive(Clone)]
pub struct CollectionAccessor
{
    collection: Arc<dyn Collection>,
    db: Arc<dyn Database>,
    errors: HttpErrors,
}

impl CollectionAccessor
{
    /// The raw collection handle, bypassing the accessor.
    pub fn collection(&self) -> &Arc<dyn Collection>
    {
        &self.collection
    }

    /// A fresh identifier, e.g. to upsert under a known id with `update`.
    pub fn new_id(&self) -> ObjectId
    {
        self.db.object_id()
    }

    fn not_found(&self) -> CrudError
    {
        CrudError::NotFound(self.errors.not_found())
    }

    /// Inserts `data` stamped with `created`; returns it with its `_id`.
    pub async fn create(&self, mut data: Document) -> CrudResult<Document>
    {
        data.insert(CREATED, DateTime::now());
        let id = self.collection.insert_one(data.clone()).await?;
        tracing::debug!(collection = self.collection.name(), %id, "created");
        if data.contains_key(ID) {
            return Ok(data);
        }
        let mut record = Document::new();
        record.insert(ID, id);
        record.extend(data);
        Ok(record)
    }

    pub async fn read<I: IntoObjectId>(&self, id: I) -> CrudResult<Document>
    {
        let id = id.into_object_id()?;
        self.find_one(doc! { "_id": id }).await
    }

    /// Sets the fields in `data` (others are kept) and stamps `modified`.
    /// Inserts under `id` when no record has it.
    pub async fn update<I: IntoObjectId>(&self, id: I, mut data: Document)
        -> CrudResult<Document>
    {
        let id = id.into_object_id()?;
        data.remove(ID);
        data.insert(MODIFIED, DateTime::now());
        let record = self.collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": data }, true)
            .await?
            .ok_or_else(|| StoreError::Upsert(self.collection.name().to_string()))?;
        tracing::debug!(collection = self.collection.name(), %id, "updated");
        Ok(record)
    }

    /// Removes the record and returns it as it was.
    pub async fn delete<I: IntoObjectId>(&self, id: I) -> CrudResult<Document>
    {
        let id = id.into_object_id()?;
        match self.collection.find_one_and_delete(doc! { "_id": id }).await? {
            Some(record) => {
                tracing::debug!(collection = self.collection.name(), %id, "deleted");
                Ok(record)
            },
            None => Err(self.not_found()),
        }
    }

    /// All records matching `query`; `None` matches everything.
    pub async fn list(&self, query: impl Into<Option<Document>>)
        -> CrudResult<Vec<Document>>
    {
        let query = query.into().unwrap_or_default();
        let records = self.collection.find(query).await?;
        tracing::debug!(collection = self.collection.name(),
                        count = records.len(), "listed");
        Ok(records)
    }

    pub async fn find_one(&self, query: Document) -> CrudResult<Document>
    {
        match self.collection.find_one(query).await? {
            Some(record) => Ok(record),
            None => {
                tracing::debug!(collection = self.collection.name(), "no match");
                Err(self.not_found())
            },
        }
    }
}
