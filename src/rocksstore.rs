use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use rocksdb::{BoundColumnFamily, IteratorMode, WriteOptions};

use crate::config;
use crate::errors::{StoreError, StoreResult};
use crate::prelude::{Collection, Database};
use crate::query;

// --- RocksDb based document store
// One column family per collection; values are BSON documents keyed by
// the BSON encoding of their `_id`. Numeric ids are keyed in their
// canonical form so 1, 1_i64 and 1.0 share one key.

pub fn build_store_rocks(cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn Database>>
{
    Ok(Arc::new(RocksStore::open(&cfg.dbname, &cfg.dbpath)?))
}

#[derive(Clone)]
pub struct RocksStore
{
    name: String,
    db: Arc<rocksdb::DB>,
    // Serializes read-modify-write sequences and column family creation.
    write_lock: Arc<Mutex<()>>,
}

impl RocksStore
{
    pub fn open(name: &str, dbpath: &str) -> std::io::Result<Self>
    {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let cfs = rocksdb::DB::list_cf(&options, dbpath)
            .unwrap_or_default();
        let db = rocksdb::DB::open_cf(&options, dbpath, cfs)
            .map_err(|e| std::io::Error::new(
                    std::io::ErrorKind::Other,
                    std::format!("rocks-db open {} failed: {}", dbpath, e)))?;
        tracing::info!(dbpath, "opened rocksdb document store");
        Ok(RocksStore {
            name: name.to_string(),
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }
}

impl Database for RocksStore
{
    fn name(&self) -> &str
    {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection>
    {
        Arc::new(RocksCollection {
            name: name.to_string(),
            db: self.db.clone(),
            write_lock: self.write_lock.clone(),
        })
    }
}

pub struct RocksCollection
{
    name: String,
    db: Arc<rocksdb::DB>,
    write_lock: Arc<Mutex<()>>,
}

fn key_for(id: &Bson) -> StoreResult<Vec<u8>>
{
    Ok(bson::to_vec(&doc! { "_id": query::canonical_id(id) })?)
}

fn synced() -> WriteOptions
{
    let mut opts = WriteOptions::default();
    opts.set_sync(true);
    opts
}

/// `{ _id: <plain value> }` filters are served by a point lookup.
fn id_only(filter: &Document) -> Option<&Bson>
{
    if filter.len() != 1 {
        return None;
    }
    match filter.get(query::ID)? {
        Bson::Document(d) if d.keys().any(|k| k.starts_with('$')) => None,
        id => Some(id),
    }
}

type Cf<'a> = Arc<BoundColumnFamily<'a>>;

impl RocksCollection
{
    fn cf(&self) -> StoreResult<Cf<'_>>
    {
        if let Some(cf) = self.db.cf_handle(&self.name) {
            return Ok(cf);
        }
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if self.db.cf_handle(&self.name).is_none() {
            // TODO: Tune options for small point-lookup collections.
            let opts = rocksdb::Options::default();
            self.db.create_cf(&self.name, &opts)?;
            tracing::debug!(collection = %self.name, "created column family");
        }
        self.db.cf_handle(&self.name)
            .ok_or_else(|| StoreError::Driver(std::format!(
                        "column family {} missing after creation", self.name)))
    }

    /// Matching entries in key order; stops after `limit` matches.
    fn scan(&self, cf: &Cf<'_>, filter: &Document, limit: Option<usize>)
        -> StoreResult<Vec<(Vec<u8>, Document)>>
    {
        if let Some(id) = id_only(filter) {
            let key = key_for(id)?;
            return match self.db.get_cf(cf, &key)? {
                Some(bytes) => Ok(vec![(key, bson::from_slice(&bytes)?)]),
                None => Ok(Vec::new()),
            };
        }
        let mut found = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, bytes) = entry?;
            let doc: Document = bson::from_slice(&bytes)?;
            if query::matches(&doc, filter)? {
                found.push((key.to_vec(), doc));
                if limit.map(|l| found.len() >= l).unwrap_or(false) {
                    break;
                }
            }
        }
        Ok(found)
    }

    fn first(&self, cf: &Cf<'_>, filter: &Document)
        -> StoreResult<Option<(Vec<u8>, Document)>>
    {
        Ok(self.scan(cf, filter, Some(1))?.into_iter().next())
    }

    fn put_new(&self, cf: &Cf<'_>, id: &Bson, doc: &Document) -> StoreResult<()>
    {
        let key = key_for(id)?;
        if self.db.get_cf(cf, &key)?.is_some() {
            return Err(StoreError::DuplicateKey {
                collection: self.name.clone(),
                id: id.to_string(),
            });
        }
        self.db.put_cf_opt(cf, &key, bson::to_vec(doc)?, &synced())?;
        Ok(())
    }

    fn insert_locked(&self, doc: Document) -> StoreResult<Bson>
    {
        let cf = self.cf()?;
        let (id, doc) = query::with_id(doc);
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.put_new(&cf, &id, &doc)?;
        Ok(id)
    }

    fn update_locked(&self, filter: &Document, update: &Document, upsert: bool)
        -> StoreResult<Option<Document>>
    {
        let cf = self.cf()?;
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        match self.first(&cf, filter)? {
            Some((key, mut doc)) => {
                query::apply_update(&mut doc, update, false)?;
                self.db.put_cf_opt(&cf, &key, bson::to_vec(&doc)?, &synced())?;
                Ok(Some(doc))
            },
            None if upsert => {
                let mut seed = query::upsert_seed(filter);
                query::apply_update(&mut seed, update, true)?;
                let (id, doc) = query::with_id(seed);
                self.put_new(&cf, &id, &doc)?;
                Ok(Some(doc))
            },
            None => Ok(None),
        }
    }

    fn delete_locked(&self, filter: &Document) -> StoreResult<Option<Document>>
    {
        let cf = self.cf()?;
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        match self.first(&cf, filter)? {
            Some((key, doc)) => {
                self.db.delete_cf_opt(&cf, &key, &synced())?;
                Ok(Some(doc))
            },
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Collection for RocksCollection
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>
    {
        self.insert_locked(doc)
    }

    async fn find_one(&self, filter: Document) -> StoreResult<Option<Document>>
    {
        let cf = self.cf()?;
        Ok(self.first(&cf, &filter)?.map(|(_, doc)| doc))
    }

    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>>
    {
        let cf = self.cf()?;
        Ok(self.scan(&cf, &filter, None)?.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn find_one_and_update(&self, filter: Document, update: Document,
                                 upsert: bool)
        -> StoreResult<Option<Document>>
    {
        self.update_locked(&filter, &update, upsert)
    }

    async fn find_one_and_delete(&self, filter: Document)
        -> StoreResult<Option<Document>>
    {
        self.delete_locked(&filter)
    }
}
