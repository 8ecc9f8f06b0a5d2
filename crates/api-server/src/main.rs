use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_server::http::{self, AppState, PlannerRegistry, Readiness};
use shared::config::ApiConfig;
use shared::controller::PlannerDeps;
use shared::llm::{OpenRouterGateway, OpenRouterGatewayConfig};
use shared::persistence::SaveWriter;
use shared::repos::{ChatStore, IdentityResolver, MemoryChatStore, StaticIdentityResolver, Store};
use shared::search::{AmadeusHotelsClient, GooglePlacesClient, SearchAdapter, TicketmasterClient};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to read .env file: {err}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "api_server=debug,shared=info".to_string()
        }))
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let (store, identity): (Arc<dyn ChatStore>, Arc<dyn IdentityResolver>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                let store = Arc::new(connect_store(database_url, &config).await);
                (store.clone(), store)
            }
            None => {
                warn!("DATABASE_URL is not set; chats are kept in memory and every caller is anonymous");
                (
                    Arc::new(MemoryChatStore::new()),
                    Arc::new(StaticIdentityResolver::new()),
                )
            }
        };

    let llm_config = match OpenRouterGatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read llm config: {err}");
            std::process::exit(1);
        }
    };
    let llm = match OpenRouterGateway::new(llm_config) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build llm gateway: {err}");
            std::process::exit(1);
        }
    };

    let (events, places, hotels) = match (
        TicketmasterClient::new(&config.search),
        GooglePlacesClient::new(&config.search),
        AmadeusHotelsClient::new(&config.search),
    ) {
        (Ok(events), Ok(places), Ok(hotels)) => (Arc::new(events), Arc::new(places), Arc::new(hotels)),
        (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => {
            error!("failed to build search clients: {err}");
            std::process::exit(1);
        }
    };
    if config.search.ticketmaster_api_key.is_none() {
        warn!("TICKETMASTER_API_KEY is not set; event searches will report failure");
    }
    if config.search.google_api_key.is_none() {
        warn!("GOOGLE_API_KEY is not set; place searches will report failure");
    }
    let hotels_configured =
        config.search.amadeus_api_key.is_some() && config.search.amadeus_api_secret.is_some();
    if !hotels_configured {
        warn!("AMADEUS_API_KEY or AMADEUS_API_SECRET is not set; hotel offer searches will report failure");
    }
    let readiness = Readiness {
        llm: true,
        events: config.search.ticketmaster_api_key.is_some(),
        places: config.search.google_api_key.is_some(),
        hotels: hotels_configured,
    };

    let writer = SaveWriter::spawn(store.clone());
    let app = http::build_router(AppState {
        store,
        identity,
        planner: Arc::new(PlannerDeps {
            llm: Arc::new(llm),
            search: SearchAdapter::new(events, places.clone(), config.search.result_limit)
                .with_hotel_offers(hotels),
            writer: Some(writer.clone()),
        }),
        distances: places,
        sessions: PlannerRegistry::with_idle_ttl(Duration::from_secs(
            config.planner_idle_ttl_secs,
        )),
        readiness,
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid API_BIND_ADDR {}: {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    });
    if let Err(err) = server.await {
        error!("server failed: {err}");
    }

    writer.flush().await;
    info!("pending chat saves flushed");
}

async fn connect_store(database_url: &str, config: &ApiConfig) -> Store {
    let store = match Store::connect(database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    store
}
