use std::{future::IntoFuture, process, sync::Arc};

use axum::Router;
use cachectl::{
    application::{
        auth::TokenAuthenticator,
        cache_commands::{CacheCommands, CommandError, FlushCommand, PurgeCommand, render_rows},
        error::AppError,
        links::{LinkConfig, LinkResolver, PermalinkResolver, TemplateCache},
        nonce::NonceService,
        repos::{ContentRepo, LocalCache, OptionStore, TransientStore},
    },
    cache::{
        CacheControl, CacheState, DriverSet, EdgeTarget, ReqwestTransport,
        drivers::{CachedOptionStore, HttpDriver, ObjectDriver, ObjectStore, OpcodeDriver, TransientDriver},
    },
    config::{self, CacheCommand, SiteConfig},
    infra::{
        db::PostgresHost,
        error::InfraError,
        http::{self, HttpState, OperatorDirectory},
        identity::IdentityClient,
        memory::{MemoryContent, MemoryOptions},
        relay::RestRelay,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        match &error {
            AppError::Command(command) => report_command_error(command),
            other => report_application_error(other),
        }
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

/// Command failures are operator output, not diagnostics.
fn report_command_error(error: &CommandError) {
    if let CommandError::Driver { completed, .. } = error {
        for line in completed {
            println!("{line}");
        }
    }
    eprintln!("Error: {error}");
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let site = config::load_site_config(&settings.site)
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    let host = init_host(&settings).await?;
    let runtime = build_runtime(&settings, &site, &host)?;

    match command {
        config::Command::Serve(_) => run_serve(settings, site, runtime).await,
        config::Command::Cache(args) => run_cache(settings, site, runtime, args.command).await,
    }
}

/// The host's storage, either its database or in-process tables.
struct Host {
    options: Arc<dyn OptionStore>,
    transients: Arc<dyn TransientStore>,
    content: Arc<dyn ContentRepo>,
}

async fn init_host(settings: &config::Settings) -> Result<Host, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        warn!("No database url configured; using in-memory host tables");
        let options = Arc::new(MemoryOptions::default());
        return Ok(Host {
            options: options.clone(),
            transients: options,
            content: Arc::new(MemoryContent::default()),
        });
    };

    let pool = PostgresHost::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    let host = Arc::new(PostgresHost::new(pool, &settings.database.table_prefix));

    Ok(Host {
        options: host.clone(),
        transients: host.clone(),
        content: host,
    })
}

/// Process-wide pieces shared by every execution.
struct Runtime {
    drivers: Arc<DriverSet>,
    transport: Arc<ReqwestTransport>,
    links: Arc<dyn LinkResolver>,
    content: Arc<dyn ContentRepo>,
}

fn build_runtime(
    settings: &config::Settings,
    site: &SiteConfig,
    host: &Host,
) -> Result<Runtime, AppError> {
    let transport = Arc::new(
        ReqwestTransport::new(settings.cache.edge_timeout).map_err(InfraError::EdgeClient)?,
    );

    let object_store = Arc::new(ObjectStore::new(settings.cache.object_cache_limit));
    let cached_options: Arc<dyn OptionStore> = Arc::new(CachedOptionStore::new(
        host.options.clone(),
        object_store.clone(),
    ));
    let templates = Arc::new(TemplateCache::default());
    let links: Arc<dyn LinkResolver> = Arc::new(PermalinkResolver::new(
        cached_options,
        host.content.clone(),
        templates.clone(),
        LinkConfig {
            default_home: site.default_site_url.clone(),
            archive_post_types: settings.links.archive_post_types.clone(),
        },
    ));

    let target = EdgeTarget {
        site_uid: site.site_uid.clone(),
        account_uid: site.account_uid.clone(),
        site_token: site.site_token.clone(),
    };
    let compiled: Arc<dyn LocalCache> = templates;
    let drivers = DriverSet::new()
        .with(HttpDriver::new(target, transport.clone()))
        .with(ObjectDriver::new(object_store, host.options.clone()))
        .with(OpcodeDriver::new(Some(compiled)))
        .with(TransientDriver::new(host.transients.clone()));

    Ok(Runtime {
        drivers: Arc::new(drivers),
        transport,
        links,
        content: host.content.clone(),
    })
}

async fn run_serve(
    settings: config::Settings,
    site: SiteConfig,
    runtime: Runtime,
) -> Result<(), AppError> {
    let identity = IdentityClient::new(
        site.api_url.as_deref(),
        site.site_uid.clone(),
        settings.identity.timeout,
    )
    .map_err(InfraError::from)?;
    let nonce_secret = settings
        .web
        .nonce_secret
        .clone()
        .unwrap_or_else(|| site.site_token.clone());

    let state = HttpState {
        cache: CacheState::new(runtime.drivers.clone()),
        auth: Arc::new(TokenAuthenticator::new(
            site.site_token.clone(),
            Arc::new(identity),
        )),
        nonces: Arc::new(NonceService::new(nonce_secret, settings.web.nonce_lifetime)),
        operators: Arc::new(OperatorDirectory::from_settings(&settings.web)),
        links: runtime.links.clone(),
        site: Arc::new(site),
        version_id: settings.server.version_id,
    };

    let result = serve_http(&settings, http::build_router(state)).await;
    runtime.transport.settle().await;
    result
}

async fn serve_http(settings: &config::Settings, router: Router) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Cache control service listening");

    let stopping = Arc::new(Notify::new());
    let signal = stopping.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested; draining connections");
            signal.notify_one();
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out");
        }
    }

    Ok(())
}

async fn run_cache(
    settings: config::Settings,
    site: SiteConfig,
    runtime: Runtime,
    command: CacheCommand,
) -> Result<(), AppError> {
    let relay = RestRelay::new(&site, settings.cache.relay_timeout).map_err(InfraError::from)?;
    let control = Arc::new(CacheControl::new(runtime.drivers.clone()).with_observer(Arc::new(relay)));
    let commands = CacheCommands::new(
        control.clone(),
        runtime.content.clone(),
        runtime.links.clone(),
    );

    let output = match command {
        CacheCommand::Flush(args) => commands
            .flush(&FlushCommand {
                types: args.types,
                all: args.all,
            })
            .await
            .map(|lines| lines.join("\n")),
        CacheCommand::Purge(args) => {
            let format = args.format;
            commands
                .purge(&PurgeCommand {
                    urls: args.urls,
                    post_ids: args.post_ids,
                    comment_ids: args.comment_ids,
                })
                .await
                .and_then(|rows| render_rows(&rows, format))
        }
    };

    control.shutdown().await;
    runtime.transport.settle().await;

    println!("{}", output?);
    Ok(())
}
