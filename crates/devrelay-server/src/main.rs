// devrelay-server — the production binary: MongoDB-backed relay over axum.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use devrelay::{AdminAuth, RelayOptions};
use devrelay_axum::RelayApp;
use devrelay_core::db::adapter::Adapter;
use devrelay_core::db::schema::RelaySchema;
use devrelay_core::env;
use devrelay_mongodb::MongoAdapter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env::init_logger();

    let options = RelayOptions::from_env().context("loading configuration")?;

    let adapter = Arc::new(
        MongoAdapter::connect(&options.database_url, &options.database_name)
            .await
            .context("connecting to MongoDB")?,
    );
    adapter
        .ensure_schema(&RelaySchema::core_schema())
        .await
        .context("creating indexes")?;
    tracing::info!(database = %options.database_name, "store ready");

    if let Some(seed) = &options.admin_seed {
        let auth = AdminAuth::new(adapter.clone(), &options.secret, options.token_ttl_secs);
        let created = auth
            .create_admin(&seed.email, &seed.password)
            .await
            .context("seeding admin credential")?;
        if !created {
            tracing::info!(email = %seed.email, "admin already present, seed skipped");
        }
    }

    let app = RelayApp::new(&options, adapter);
    let router = app.router(&options);

    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "device relay listening");

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
