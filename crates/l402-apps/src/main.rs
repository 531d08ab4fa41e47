use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use l402_apps::balance::{BalanceMonitor, Notifier, ResendNotifier};
use l402_apps::boosts::{BoostStore, MemoryBoostStore};
use l402_apps::catalog::{CatalogStore, MemoryCatalog};
use l402_apps::config::{Args, normalize_host};
use l402_apps::postgrest::PostgrestStore;
use l402_apps::routes;
use l402_apps::state::{AppState, Gate};
use l402_kit::challenge::InvoiceCache;
use l402_kit::lnd::{LndConfig, LndRestClient};
use l402_kit::rail::LightningRail;
use l402_kit::token::TokenCodec;
use l402_lottery::engine::{LotteryConfig, LotteryEngine};
use l402_lottery::round::RoundClock;
use l402_lottery::store::{LotteryStore, MemoryStore};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let rail: Option<Arc<dyn LightningRail>> =
        match (&args.lnd_rest_host, &args.lnd_macaroon_hex) {
            (Some(host), Some(macaroon)) => {
                let config = LndConfig::builder()
                    .rest_host(Url::parse(&normalize_host(host))?)
                    .macaroon_hex(macaroon.clone())
                    .accept_invalid_certs(!args.lnd_tls_verify)
                    .build();
                Some(Arc::new(LndRestClient::new(config)?))
            }
            _ => None,
        };

    let gate = match (&rail, &args.macaroon_secret) {
        (Some(rail), Some(secret)) => Some(Gate {
            rail: rail.clone(),
            codec: TokenCodec::new(secret),
            invoice_cache: InvoiceCache::default(),
        }),
        _ => {
            tracing::warn!("payments disabled: LND host or macaroon secret unconfigured");
            None
        }
    };

    let (lottery_store, boosts, catalog): (
        Arc<dyn LotteryStore>,
        Arc<dyn BoostStore>,
        Arc<dyn CatalogStore>,
    ) = match (&args.supabase_url, &args.supabase_service_role_key) {
        (Some(url), Some(key)) => {
            let store = Arc::new(PostgrestStore::new(url, key));
            (store.clone(), store.clone(), store)
        }
        _ => {
            tracing::warn!("supabase unconfigured, using in-memory storage");
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryBoostStore::new()),
                Arc::new(MemoryCatalog::new()),
            )
        }
    };

    let lottery = rail.as_ref().filter(|_| gate.is_some()).map(|rail| {
        Arc::new(LotteryEngine::new(
            lottery_store,
            rail.clone(),
            RoundClock::default(),
            LotteryConfig::builder()
                .house_cut(args.lottery_house_cut)
                .build(),
        ))
    });

    let notifier: Option<Arc<dyn Notifier>> = match (&args.resend_api_key, &args.resend_to) {
        (Some(key), Some(to)) => Some(Arc::new(ResendNotifier::new(
            key.clone(),
            args.resend_from.clone(),
            to.clone(),
        ))),
        _ => None,
    };

    let monitor = rail.as_ref().map(|rail| {
        Arc::new(BalanceMonitor::new(
            rail.clone(),
            notifier.clone(),
            args.low_balance_threshold,
        ))
    });

    let state = Arc::new(AppState {
        gate,
        lottery,
        boosts,
        catalog,
        monitor,
        notifier,
        http: reqwest::Client::new(),
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, "marketplace listening");
    axum::serve(listener, app).await?;
    Ok(())
}
