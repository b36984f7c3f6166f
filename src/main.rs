use clap::Parser;
use shoptrac::cli::{
    Args, build_config, handle_create_admin, init_logging, load_config, open_database,
};
use shoptrac::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&args.log_format, "info");
            error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    init_logging(&args.log_format, &config.loglevel);

    let Some(db) = open_database(&config.database).await else {
        std::process::exit(1);
    };

    if let Some(username) = args.create_admin.as_deref() {
        handle_create_admin(&db, username).await;
    }

    let addr = format!("{}:{}", config.address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let server_config = build_config(config, db, args.ip_header);
    init_cleanup(&server_config).await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    if let Err(e) = run_server(server_config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
