use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod node;

use config::{Args, NodeConfig};
use node::{run_mining_loop, Node};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_peer_chain,
        api::handlers::get_ledger,
        api::handlers::get_nodes,
        api::handlers::new_block,
        api::handlers::mine_block,
        api::handlers::sync_block
    ),
    components(
        schemas(
            blockchain::Block,
            api::schema::BlockRequest,
            api::schema::LedgerResponse,
            api::schema::SyncResponse,
            api::schema::ErrorResponse
        )
    ),
    tags(
        (name = "ledger", description = "Replicated ledger node endpoints")
    ),
    info(
        title = "Ledger Relay API",
        version = "0.1.0",
        description = "Mine, replicate and inspect blocks across registered nodes",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn serve_http(node: Arc<Node>, config: &NodeConfig) -> std::io::Result<()> {
    let node = web::Data::from(node);

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::try_from(Args::parse())?;
    let node = Arc::new(Node::from_config(&config).context("failed to initialize node")?);
    info!(
        "Using node registry {} and data directory {}",
        node.registry().path().display(),
        config.data_dir.display()
    );

    if config.runs_miner() {
        // registration failure is fatal
        node.register()
            .context("Error registering with discovery service")?;
        actix_web::rt::spawn(run_mining_loop(node.clone(), config.mining_interval));
    }

    if config.serve_http {
        serve_http(node, &config).await?;
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
    }

    Ok(())
}
