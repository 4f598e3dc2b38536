use actix_web::{web, App, HttpResponse, HttpServer};
use storereviews::api::{self, AppState};
use storereviews::config::AppConfig;
use storereviews::db::Database;
use storereviews::utils::logger::init_logger;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };
    init_logger(&config.log_level);

    // Initialize the database
    let db = Database::open(&config.database_path).map_err(std::io::Error::other)?;
    db.create_schema().await.map_err(std::io::Error::other)?;
    info!("Schema created successfully");

    let state = AppState {
        db: db.clone(),
        max_depth: config.max_depth,
    };

    info!("listening on http://{}", &config.bind_addr);

    // Start the Actix Web server
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure)
            .service(web::resource("/").route(web::get().to(index)))
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    // Workers are gone by now, so this should be the last handle
    if let Err(err) = db.close().await {
        error!("Failed to close database: {}", err);
    }
    Ok(())
}

// Define the index handler
async fn index() -> HttpResponse {
    HttpResponse::Ok().body("Customer review store")
}
