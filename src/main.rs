mod config;
mod db;
mod error;
mod logging;
mod pagination;
mod principal;
mod rate_limit;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = config::Config::from_env().expect("invalid configuration");
    logging::init(config.log_level);

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let port = config.port;
    let state = state::AppState::new(pool, config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "convodesk listening");
    axum::serve(listener, app).await.expect("server failed");
}
