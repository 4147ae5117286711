mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use whatsignal_bridge::{
    AppInfo, DeliveryMonitor, Forwarder, MediaStager, MessageService, Orchestrator, OrchestratorOptions, Poller, PollerOptions, Scheduler, SessionMonitor,
};
use whatsignal_common::{ChannelManager, ContactCache, IdentifierHasher, MappingStore, RateLimiter, SignalGateway, WhatsAppGateway};
use whatsignal_signal::SignalClient;
use whatsignal_store::{SqliteContactCache, SqliteMappingStore};
use whatsignal_waha::WahaClient;

use crate::cli::Cli;
use crate::config::AppConfig;

fn app_info() -> AppInfo {
    AppInfo {
        name: "whatsignal".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_time: env!("WHATSIGNAL_BUILD_TIME").to_string(),
        commit: env!("WHATSIGNAL_GIT_COMMIT").to_string(),
    }
}

fn format_build_time(raw: &str) -> String {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| raw.to_string())
}

fn print_version(info: &AppInfo) {
    let built = format_build_time(&info.build_time);
    println!("{} {} ({}, built {})", info.name, info.version, info.commit, built);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let info = app_info();

    if cli.version {
        print_version(&info);
        return Ok(());
    }

    init_tracing(cli.verbose);

    let config = AppConfig::load(&cli.config)?;
    let log_raw_identifiers = cli.verbose || config.log_raw_identifiers;
    if log_raw_identifiers {
        tracing::warn!("raw-identifier logging enabled, this is not the default and may leak PII into log sinks");
    }

    tracing::info!(name = %info.name, version = %info.version, commit = %info.commit, "starting");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            #[cfg(unix)]
            tokio::select! {
                _ = ctrl_c => tracing::info!("received SIGINT"),
                _ = terminate.recv() => tracing::info!("received SIGTERM"),
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                tracing::info!("received ctrl-c");
            }
            cancel.cancel();
        });
    }

    let channels = Arc::new(ChannelManager::new(config.channels.clone())?);

    let hasher = Arc::new(IdentifierHasher::install(&config.encryption_secret).clone());

    let store = Arc::new(SqliteMappingStore::open(&config.bridge.db_path, &cancel).await?);
    let store: Arc<dyn MappingStore> = store;

    let whatsapp: Arc<dyn WhatsAppGateway> = Arc::new(WahaClient::new(config.waha.clone())?);

    let signal_client = SignalClient::new(config.signal.clone())?;
    if let Err(e) = signal_client.ping().await {
        if config.signal.strict_init {
            return Err(anyhow::anyhow!("signal gateway unreachable at startup: {e}"));
        }
        tracing::warn!(error = %e, "signal gateway unreachable at startup, continuing");
    }
    let signal: Arc<dyn SignalGateway> = Arc::new(signal_client);

    let contacts = Arc::new(SqliteContactCache::new(store.clone(), whatsapp.clone(), config.bridge.contact_cache_hours));
    let contacts: Arc<dyn ContactCache> = contacts;

    let http_client = reqwest::Client::new();
    let stager = Arc::new(MediaStager::new(http_client, config.bridge.clone(), hasher.clone()));

    let forwarder = Arc::new(Forwarder::new(
        channels.clone(),
        store.clone(),
        whatsapp.clone(),
        signal.clone(),
        contacts.clone(),
        stager.clone(),
        hasher,
        &config.bridge,
        cancel.clone(),
    ));
    let messages = Arc::new(MessageService::new(forwarder));

    let orchestrator = Orchestrator::new(
        info.clone(),
        channels.clone(),
        whatsapp.clone(),
        contacts.clone(),
        OrchestratorOptions::from(&config.bridge),
    );
    orchestrator.sync_all_sessions().await;

    let mut background = tokio::task::JoinSet::new();

    for destination in channels.sessions().map(|s| channels.destination_for_session(s).unwrap().to_string()).collect::<Vec<_>>() {
        let poller = Poller::new(signal.clone(), messages.clone(), destination, config.signal.receive_timeout_seconds, cancel.clone());
        let verbose = cli.verbose;
        background.spawn(async move { poller.run(PollerOptions { verbose }).await });
    }

    for session in channels.sessions().map(str::to_string).collect::<Vec<_>>() {
        let monitor = SessionMonitor::new(whatsapp.clone(), session, &config.bridge, cancel.clone());
        background.spawn(async move { monitor.run().await });
    }

    {
        let scheduler = Scheduler::new(store.clone(), stager.clone(), &config.bridge, cancel.clone());
        background.spawn(async move { scheduler.run().await });
    }
    {
        let delivery_monitor = DeliveryMonitor::new(store.clone(), &config.bridge, cancel.clone());
        background.spawn(async move { delivery_monitor.run().await });
    }

    let rate_limiter = Arc::new(RateLimiter::new(config.webhook.rate_limit_per_minute, Duration::from_secs(60)));
    let webhook_state = whatsignal_webhook::AppState {
        info: Arc::new(info),
        config: Arc::new(config.webhook.clone()),
        messages: messages.clone(),
        channels: channels.clone(),
        whatsapp: whatsapp.clone(),
        rate_limiter,
    };

    let background_handle = tokio::spawn(async move { while background.join_next().await.is_some() {} });

    tokio::select! {
        result = whatsignal_webhook::serve(webhook_state, cancel.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "webhook server exited with an error");
            }
        }
        _ = cancel.cancelled() => {
            tracing::info!("shutdown signal received");
        }
    }

    if orchestrator.shutdown(cancel, background_handle).await {
        tracing::info!("shutdown complete");
    } else {
        tracing::warn!("shutdown timed out waiting for background loops, exiting anyway");
    }
    Ok(())
}
