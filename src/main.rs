//! Fiber Locator: Binary Entrypoint
//! Loads provider config, builds both fallback chains and serves the Axum router.

use fiber_locator::{api, config::ServiceConfig, metrics::Metrics, AppState};
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` filters (default `fiber_locator=info,warn`, plus the `fiber` and `geo` log targets); `LOG_FORMAT=json` for JSON lines.
/// A subscriber installed by the runtime takes precedence.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fiber_locator=info,fiber=info,geo=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ServiceConfig::load_default()?;
    let state = AppState::from_config(&cfg)?;
    info!(
        fiber = ?state.fiber.order(),
        address = ?state.address.order(),
        static_dir = %cfg.static_dir,
        "provider chains ready"
    );

    let metrics = Metrics::init(&state)?;
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
