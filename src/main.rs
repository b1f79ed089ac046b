use std::io;
use std::sync::Arc;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use dotenvy::dotenv;

use jobalert::{
    api,
    config::AppConfig,
    context::AppContext,
    cover_letter::OpenAiGenerator,
    initialize_db_pool, observability, run_migrations,
    tasks::{
        email_sender::delivery::SmtpNotifier,
        job_monitor::{feed_reader::HttpFeedReader, Scheduler},
    },
    web_ui, DbPool,
};

/// Job alert service: polls job feeds and emails new postings with a
/// generated cover letter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind, overrides JA_HOST
    #[clap(long)]
    host: Option<String>,
    /// Port to listen on, overrides JA_PORT
    #[clap(long)]
    port: Option<u16>,
    /// Number of HTTP workers, overrides JA_WORKERS
    #[clap(long)]
    workers: Option<usize>,
}

fn main() -> io::Result<()> {
    dotenv().ok();
    observability::init_logging();

    let args = Args::parse();
    let mut config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.log_summary();

    let db_pool = initialize_db_pool(&config.db_path).map_err(io::Error::other)?;
    tracing::info!("Running database migrations");
    run_migrations(&db_pool).map_err(io::Error::other)?;

    run_server(config, db_pool)
}

fn build_context(config: &AppConfig, db_pool: DbPool) -> io::Result<AppContext> {
    let feeds = HttpFeedReader::new(config.timeouts.feed).map_err(io::Error::other)?;
    let generator = OpenAiGenerator::new(config.llm.clone(), config.timeouts.generation)
        .map_err(io::Error::other)?;
    let notifier = SmtpNotifier::new(&config.smtp, config.timeouts.send).map_err(io::Error::other)?;

    Ok(AppContext::new(
        db_pool,
        Arc::new(feeds),
        Arc::new(generator),
        Arc::new(notifier),
        config.timeouts,
    ))
}

#[actix_web::main]
async fn run_server(config: AppConfig, db_pool: DbPool) -> io::Result<()> {
    let ctx = build_context(&config, db_pool.clone())?;
    let scheduler = Scheduler::start(ctx, config.poll_interval);

    tracing::info!("Starting server at http://{}:{}", config.host, config.port);
    let public_path = config.public_path.clone();
    let served = HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(db_pool.clone()))
            .service(api::health::routes())
            .configure(web_ui::configure)
            .service(Files::new("/static", &public_path))
    })
    .workers(config.workers)
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    scheduler.stop().await;
    served
}
