use axum::{extract::DefaultBodyLimit, routing::{post, get, delete}, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber;
use tracing::info;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use filevault::{
    handlers::{
        upload_file, check_duplicate, list_files, suggest_filenames, list_mime_types,
        download_file, delete_file,
    },
    state::AppState,
    config::Config,
    database::init_db,
    storage::init_storage,
};

// Headroom over the configured file size for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()
        .expect("Failed to load configuration");

    let pool = init_db(&config.database_url)
        .await
        .expect("Failed to connect to db");

    let storage = init_storage(&config)
        .await
        .expect("Failed to initialize storage");

    let app_state = AppState {
        pool,
        storage,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/files/", post(upload_file).get(list_files))
        .route("/files/get_duplicate_file/", post(check_duplicate))
        .route("/files/get_files/", get(suggest_filenames))
        .route("/files/get_all_mime_type/", get(list_mime_types))
        .route("/files/{id}/", delete(delete_file))
        .route("/files/{id}/download", get(download_file))
        .layer(DefaultBodyLimit::max(
            config.max_file_size as usize + MULTIPART_OVERHEAD,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
