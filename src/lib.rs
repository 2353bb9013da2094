//! Per-collection CRUD accessors over a document database, attached to an
//! application host as a named capability.
//!
//! Register [`plugins::SensiblePlugin`], [`plugins::DatabasePlugin`] and
//! [`plugins::CrudPlugin`] on a [`host::Host`], then fetch the
//! [`crud::Crud`] factory and bind it to a collection:
//!
//! ```ignore
//! let mut host = Host::new();
//! host.register(SensiblePlugin, ())?
//!     .register(DatabasePlugin::new(db), ())?
//!     .register(CrudPlugin, CrudOptions::default())?;
//! let accounts = host.decorator::<Crud>("crud")?.accessor("accounts");
//! ```

pub mod config;
pub mod crud;
pub mod errors;
pub mod host;
pub mod memstore;
#[cfg(feature = "mongo")]
pub mod mongostore;
pub mod plugins;
pub mod prelude;
pub mod query;
#[cfg(feature = "rocks")]
pub mod rocksstore;
pub mod store_factory;
pub mod svc_rest;

#[cfg(test)]
mod tests;

pub use crud::{CollectionAccessor, Crud};
pub use errors::{CrudError, CrudResult, HttpError, HttpErrors, PluginError, StoreError};
pub use host::{Host, Plugin};
pub use plugins::{CrudOptions, CrudPlugin, DatabasePlugin, SensiblePlugin};
pub use prelude::{Collection, Database, IntoObjectId};
