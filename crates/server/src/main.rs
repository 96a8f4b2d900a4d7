use identity_broker::AppResources;
use identity_broker::api::start_webserver;
use identity_broker::clock::SystemClock;
use identity_broker::codec::OsSecretCodec;
use identity_broker::config::load_config_or_panic;
use identity_broker::metrics::StoreMetrics;
use identity_broker::oauth2::{AuthFlow, HttpIdentityProvider};
use identity_broker::store::sweep::spawn_expiry_sweep;
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "identity_broker=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_standard_tracing();

    let config = Arc::new(load_config_or_panic());

    let ring_provider = crypto::ring::default_provider();
    if CryptoProvider::install_default(ring_provider).is_err() {
        tracing::debug!("crypto provider already installed");
    }

    let db = Arc::new(Database::connect(&config.database_url).await?);

    let upstream = HttpIdentityProvider::new(&config.upstream, config.callback_url())?;
    tracing::info!(?upstream, "upstream identity provider configured");

    let metrics = Arc::new(StoreMetrics::default());
    let resources = AppResources {
        config: config.clone(),
        metrics: metrics.clone(),
    };

    let flow = AuthFlow::with_database(
        db,
        Arc::new(OsSecretCodec),
        Arc::new(SystemClock),
        Arc::new(upstream),
        metrics,
        config.landing_url.clone(),
    );

    spawn_expiry_sweep(flow.sweeper(), &config.sweep);

    start_webserver(flow, resources).await?;
    Ok(())
}
