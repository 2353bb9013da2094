use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_crud::{
    config, store_factory, svc_rest,
    Crud, CrudPlugin, DatabasePlugin, Host, SensiblePlugin,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>>
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "doc_crud=debug,tower_http=debug".into()),
            )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::read_and_parse_config()?;
    tracing::debug!(?config, "loaded config");

    let db = store_factory::create_store(&config.store).await?;

    let mut host = Host::new();
    host.register(SensiblePlugin, ())?
        .register(DatabasePlugin::new(Arc::clone(&db)), ())?
        .register(CrudPlugin, config.crud.clone())?;
    tracing::info!(plugins = ?host.plugins(), "application ready");

    let crud = host.decorator::<Crud>(config.crud.decorates_as())?;
    let app = svc_rest::resource_router(
        crud.accessor("accounts"), "accounts", "account");

    svc_rest::server(app, config.serve.rest).await?;
    Ok(())
}
