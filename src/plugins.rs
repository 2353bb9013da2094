use std::sync::Arc;

use serde::Deserialize;

use crate::crud::Crud;
use crate::errors::{HttpErrors, PluginError};
use crate::host::{Host, Plugin};
use crate::prelude::Database;

pub const HTTP_ERRORS: &str = "httpErrors";
pub const DB: &str = "db";
pub const DEFAULT_DECORATOR: &str = "crud";

/// Decorates the host with the [`HttpErrors`] helper.
pub struct SensiblePlugin;

impl Plugin for SensiblePlugin
{
    type Options = ();

    fn name(&self) -> &'static str
    {
        "sensible"
    }

    fn register(&self, host: &mut Host, _opts: ()) -> Result<(), PluginError>
    {
        host.decorate(HTTP_ERRORS, HttpErrors);
        Ok(())
    }
}

/// The database handle attached to the host.
#[derive(Clone)]
pub struct DbHandle
{
    pub db: Arc<dyn Database>,
}

/// Decorates the host with a database handle built by the caller.
pub struct DatabasePlugin
{
    db: Arc<dyn Database>,
}

impl DatabasePlugin
{
    pub fn new(db: Arc<dyn Database>) -> DatabasePlugin
    {
        DatabasePlugin { db }
    }
}

impl Plugin for DatabasePlugin
{
    type Options = ();

    fn name(&self) -> &'static str
    {
        "database"
    }

    fn register(&self, host: &mut Host, _opts: ()) -> Result<(), PluginError>
    {
        tracing::debug!(database = self.db.name(), "attaching database handle");
        host.decorate(DB, DbHandle { db: self.db.clone() });
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CrudOptions
{
    #[serde(rename = "decoratesAs", default)]
    pub decorates_as: Option<String>,
}

impl CrudOptions
{
    pub fn decorates_as(&self) -> &str
    {
        self.decorates_as.as_deref().unwrap_or(DEFAULT_DECORATOR)
    }
}

/// Decorates the host with the [`Crud`] accessor factory.
pub struct CrudPlugin;

impl Plugin for CrudPlugin
{
    type Options = CrudOptions;

    fn name(&self) -> &'static str
    {
        "crud"
    }

    fn dependencies(&self) -> &'static [&'static str]
    {
        &["sensible", "database"]
    }

    fn decorators(&self) -> &'static [&'static str]
    {
        &[HTTP_ERRORS, DB]
    }

    fn register(&self, host: &mut Host, opts: CrudOptions) -> Result<(), PluginError>
    {
        let errors = host.decorator::<HttpErrors>(HTTP_ERRORS)?;
        let handle = host.decorator::<DbHandle>(DB)?;
        let crud = Crud::new(handle.db.clone(), *errors);
        host.decorate(opts.decorates_as(), crud);
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::memstore::MemStore;

    fn base_host() -> Host
    {
        let mut host = Host::new();
        host.register(SensiblePlugin, ()).unwrap()
            .register(DatabasePlugin::new(Arc::new(MemStore::new("test"))), ())
            .unwrap();
        host
    }

    #[test]
    fn decorates_default_name()
    {
        let mut host = base_host();
        host.register(CrudPlugin, CrudOptions::default()).unwrap();
        assert!(host.decorator::<Crud>("crud").is_ok());
    }

    #[test]
    fn decorates_configured_name()
    {
        let mut host = base_host();
        let opts = CrudOptions { decorates_as: Some("repo".into()) };
        host.register(CrudPlugin, opts).unwrap();
        assert!(host.decorator::<Crud>("repo").is_ok());
        assert!(!host.has_decorator("crud"));
    }

    #[test]
    fn requires_error_helper()
    {
        let mut host = Host::new();
        host.register(DatabasePlugin::new(Arc::new(MemStore::new("test"))), ())
            .unwrap();
        let err = host.register(CrudPlugin, CrudOptions::default()).err().unwrap();
        assert_eq!(err, PluginError::MissingDependency {
            plugin: "crud".into(),
            dependency: "sensible".into(),
        });
    }

    #[test]
    fn requires_database()
    {
        let mut host = Host::new();
        host.register(SensiblePlugin, ()).unwrap();
        let err = host.register(CrudPlugin, CrudOptions::default()).err().unwrap();
        assert!(matches!(err, PluginError::MissingDependency { dependency, .. }
                         if dependency == "database"));
        assert!(!host.has_decorator("crud"));
    }
}
