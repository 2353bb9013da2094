use std::sync::{Arc, RwLock};
use std::collections::HashMap;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::config;
use crate::errors::{StoreError, StoreResult};
use crate::prelude::{Collection, Database};
use crate::query;

pub fn build_store_mem(cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn Database>>
{
    Ok(Arc::new(MemStore::new(&cfg.dbname)))
}

/// In-memory database: collection name to insertion-ordered documents.
#[derive(Debug, Default, Clone)]
pub struct MemStore
{
    name: String,
    map: Arc<RwLock<HashMap<String, MemCollection>>>
}

impl MemStore
{
    pub fn new(name: &str) -> MemStore
    {
        MemStore {
            name: name.to_string(),
            map: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn collection_names(&self) -> Vec<String>
    {
        match self.map.read() {
            Ok(map_locked) => map_locked.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Database for MemStore
{
    fn name(&self) -> &str
    {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection>
    {
        // A poisoned map still hands out a detached collection; its
        // operations report the poisoning through their own locks.
        let mut map_locked = match self.map.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let coll = map_locked.entry(name.to_string())
            .or_insert_with(|| MemCollection::new(name))
            .clone();
        Arc::new(coll)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemCollection
{
    name: String,
    docs: Arc<RwLock<Vec<Document>>>
}

impl MemCollection
{
    pub fn new(name: &str) -> MemCollection
    {
        MemCollection {
            name: name.to_string(),
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn position(docs: &[Document], filter: &Document) -> StoreResult<Option<usize>>
    {
        for (idx, doc) in docs.iter().enumerate() {
            if query::matches(doc, filter)? {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    fn contains_id(docs: &[Document], id: &Bson) -> bool
    {
        docs.iter().any(|d| d.get(query::ID)
                        .map(|v| query::values_equal(v, id))
                        .unwrap_or(false))
    }
}

#[async_trait]
impl Collection for MemCollection
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>
    {
        let (id, doc) = query::with_id(doc);
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        if Self::contains_id(&docs, &id) {
            return Err(StoreError::DuplicateKey {
                collection: self.name.clone(),
                id: id.to_string(),
            });
        }
        docs.push(doc);
        Ok(id)
    }

    async fn find_one(&self, filter: Document) -> StoreResult<Option<Document>>
    {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(Self::position(&docs, &filter)?.map(|idx| docs[idx].clone()))
    }

    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>>
    {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        let mut found = Vec::new();
        for doc in docs.iter() {
            if query::matches(doc, &filter)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }

    async fn find_one_and_update(&self, filter: Document, update: Document,
                                 upsert: bool)
        -> StoreResult<Option<Document>>
    {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        match Self::position(&docs, &filter)? {
            Some(idx) => {
                // Work on a copy so a rejected update leaves storage intact.
                let mut updated = docs[idx].clone();
                query::apply_update(&mut updated, &update, false)?;
                docs[idx] = updated.clone();
                Ok(Some(updated))
            },
            None if upsert => {
                let mut seed = query::upsert_seed(&filter);
                query::apply_update(&mut seed, &update, true)?;
                let (id, doc) = query::with_id(seed);
                if Self::contains_id(&docs, &id) {
                    return Err(StoreError::DuplicateKey {
                        collection: self.name.clone(),
                        id: id.to_string(),
                    });
                }
                docs.push(doc.clone());
                Ok(Some(doc))
            },
            None => Ok(None),
        }
    }

    async fn find_one_and_delete(&self, filter: Document)
        -> StoreResult<Option<Document>>
    {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        Ok(Self::position(&docs, &filter)?.map(|idx| docs.remove(idx)))
    }
}

impl std::fmt::Display for MemStore
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    {
        let map_locked = self.map.read().map_err(|_| std::fmt::Error)?;
        for (k, v) in map_locked.iter() {
            write!(f, "\n---- collection: {k} ----:\n{v}\n",)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for MemCollection
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    {
        let docs = self.docs.read().map_err(|_| std::fmt::Error)?;
        for doc in docs.iter() {
            writeln!(f, "{doc}")?;
        }
        Ok(())
    }
}
