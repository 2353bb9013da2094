use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

use crate::config;
use crate::errors::StoreResult;
use crate::prelude::{Collection, Database};

pub async fn build_store_mongo(cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn Database>>
{
    match MongoStore::connect(&cfg.endpoint, &cfg.dbname).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                std::format!("mongodb connect to {} failed: {}",
                             cfg.endpoint, e))),
    }
}

/// A database on a MongoDB deployment. The driver pools connections.
#[derive(Clone)]
pub struct MongoStore
{
    name: String,
    db: mongodb::Database,
}

impl MongoStore
{
    pub async fn connect(uri: &str, dbname: &str) -> StoreResult<Self>
    {
        let client = mongodb::Client::with_uri_str(uri).await?;
        tracing::info!(dbname, "connected to mongodb");
        Ok(MongoStore {
            name: dbname.to_string(),
            db: client.database(dbname),
        })
    }
}

impl Database for MongoStore
{
    fn name(&self) -> &str
    {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection>
    {
        Arc::new(MongoCollection {
            inner: self.db.collection::<Document>(name),
        })
    }
}

pub struct MongoCollection
{
    inner: mongodb::Collection<Document>,
}

#[async_trait]
impl Collection for MongoCollection
{
    fn name(&self) -> &str
    {
        self.inner.name()
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>
    {
        let res = self.inner.insert_one(doc, None).await?;
        Ok(res.inserted_id)
    }

    async fn find_one(&self, filter: Document) -> StoreResult<Option<Document>>
    {
        Ok(self.inner.find_one(filter, None).await?)
    }

    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>>
    {
        let cursor = self.inner.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one_and_update(&self, filter: Document, update: Document,
                                 upsert: bool)
        -> StoreResult<Option<Document>>
    {
        let opts = FindOneAndUpdateOptions::builder()
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .build();
        Ok(self.inner.find_one_and_update(filter, update, opts).await?)
    }

    async fn find_one_and_delete(&self, filter: Document)
        -> StoreResult<Option<Document>>
    {
        Ok(self.inner.find_one_and_delete(filter, None).await?)
    }
}
