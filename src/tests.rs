// Accessor behaviour end to end: host wiring, the memory backend and
// every CRUD operation.
use std::sync::Arc;

use bson::{doc, Bson, Document};

use crate::crud::{Crud, CollectionAccessor, CREATED};
use crate::errors::CrudError;
use crate::host::Host;
use crate::memstore::MemStore;
use crate::plugins::{CrudOptions, CrudPlugin, DatabasePlugin, SensiblePlugin};
use crate::prelude::Database;

fn build() -> Host
{
    let mut host = Host::new();
    host.register(SensiblePlugin, ()).unwrap()
        .register(DatabasePlugin::new(Arc::new(MemStore::new("crud-test"))), ())
        .unwrap()
        .register(CrudPlugin, CrudOptions::default())
        .unwrap();
    host
}

fn accounts(host: &Host) -> CollectionAccessor
{
    host.decorator::<Crud>("crud").unwrap().accessor("accounts")
}

fn assert_not_found(err: CrudError)
{
    match err {
        CrudError::NotFound(e) => {
            assert_eq!(e.name, "NotFoundError");
            assert_eq!(e.message, "Not Found");
            assert_eq!(e.status_code, 404);
        },
        other => panic!("expected NotFound, got {other:?}"),
    }
}

fn without_stamps(mut d: Document) -> Document
{
    d.remove(CREATED);
    d.remove("modified");
    d.remove("_id");
    d
}

#[test]
fn decorates_default_crud()
{
    let host = build();
    assert!(host.has_decorator("crud"));
    assert!(host.has_plugin("crud"));
}

#[tokio::test]
async fn raw_collection_is_usable()
{
    let host = build();
    let accounts = accounts(&host);
    let id = accounts.collection().insert_one(doc! { "a": 1 }).await.unwrap();
    assert!(matches!(id, Bson::ObjectId(_)));
    assert_eq!(accounts.list(doc! { "a": 1 }).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_then_read_round_trips()
{
    let host = build();
    let accounts = accounts(&host);
    let created = accounts.create(doc! { "b": 2, "tags": ["x"] }).await.unwrap();
    let id = created.get_object_id("_id").unwrap();
    assert_eq!(accounts.read(id).await.unwrap(), created);
    assert_eq!(accounts.read(id.to_hex()).await.unwrap(), created);
}

#[tokio::test]
async fn read_unknown_id_is_not_found()
{
    let host = build();
    let accounts = accounts(&host);
    assert_not_found(accounts.read(accounts.new_id()).await.unwrap_err());
}

#[tokio::test]
async fn update_patches_and_upserts()
{
    let host = build();
    let accounts = accounts(&host);
    let created = accounts.create(doc! { "b": 2 }).await.unwrap();
    let id = created.get_object_id("_id").unwrap();

    let updated = accounts.update(id, doc! { "c": 1 }).await.unwrap();
    assert_eq!(updated.get_i32("b").unwrap(), 2);
    assert_eq!(updated.get_i32("c").unwrap(), 1);

    let fresh = accounts.new_id();
    let upserted = accounts.update(fresh, doc! { "d": 1 }).await.unwrap();
    assert_eq!(upserted.get_object_id("_id").unwrap().to_hex(), fresh.to_hex());
    assert_eq!(upserted.get_i32("d").unwrap(), 1);
    assert_eq!(accounts.list(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn delete_returns_record_once()
{
    let host = build();
    let accounts = accounts(&host);
    let created = accounts.create(doc! { "b": 2 }).await.unwrap();
    let id = created.get_object_id("_id").unwrap();

    assert_eq!(accounts.delete(id).await.unwrap(), created);
    assert_not_found(accounts.delete(id).await.unwrap_err());
    assert_not_found(accounts.read(id).await.unwrap_err());
}

#[tokio::test]
async fn list_and_find_one_filter()
{
    let host = build();
    let accounts = accounts(&host);
    for a in [1, 2, 1, 3] {
        accounts.create(doc! { "a": a }).await.unwrap();
    }
    assert_eq!(accounts.list(None).await.unwrap().len(), 4);
    assert_eq!(accounts.list(doc! {}).await.unwrap().len(), 4);

    let ones = accounts.list(doc! { "a": 1 }).await.unwrap();
    assert_eq!(ones.len(), 2);
    assert!(ones.iter().all(|d| d.get_i32("a").unwrap() == 1));
    assert!(accounts.list(doc! { "a": 100 }).await.unwrap().is_empty());

    let one = accounts.find_one(doc! { "a": 1 }).await.unwrap();
    assert_eq!(one.get_i32("a").unwrap(), 1);
    assert_not_found(accounts.find_one(doc! { "a": 100 }).await.unwrap_err());
}

#[tokio::test]
async fn accessors_share_the_collection()
{
    let host = build();
    let first = accounts(&host);
    let second = accounts(&host);
    first.create(doc! { "n": 1 }).await.unwrap();
    assert_eq!(second.list(None).await.unwrap().len(), 1);

    let crud = host.decorator::<Crud>("crud").unwrap();
    assert!(crud.accessor("other").list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_lifecycle()
{
    let host = build();
    let accounts = accounts(&host);

    let created = accounts.create(doc! { "b": 2 }).await.unwrap();
    let id = created.get_object_id("_id").unwrap();

    let r = accounts.update(id, doc! { "b": 3 }).await.unwrap();
    assert_eq!(without_stamps(r), doc! { "b": 3 });

    let r = accounts.update(id, doc! { "c": 1 }).await.unwrap();
    assert_eq!(without_stamps(r), doc! { "b": 3, "c": 1 });

    let removed = accounts.delete(id).await.unwrap();
    assert_eq!(removed.get_object_id("_id").unwrap(), id);
    assert_eq!(without_stamps(removed), doc! { "b": 3, "c": 1 });

    assert_not_found(accounts.read(id).await.unwrap_err());
}

#[tokio::test]
async fn concurrent_creates_are_independent()
{
    let db = Arc::new(MemStore::new("crud-test"));
    let crud = Crud::new(db.clone(), crate::errors::HttpErrors);
    let mut handles = Vec::new();
    for n in 0..16 {
        let accounts = crud.accessor("accounts");
        handles.push(tokio::spawn(async move {
            accounts.create(doc! { "n": n }).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(db.collection("accounts").find(doc! {}).await.unwrap().len(), 16);
}
