mod bot;
mod config;
mod handlers;
mod state;

use actix_web::{App, HttpServer, middleware::Logger, web};
use dotenv::dotenv;
use pretty_env_logger::env_logger::{Builder, Env};

use crate::config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let logger_env = Env::default().default_filter_or("info");
    let mut logger_builder = Builder::from_env(logger_env);
    logger_builder.init();

    if cli::run_cli().await {
        return Ok(());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    let state = config.create_app_state().await.map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    log::info!(
        "App state initialized, listening on {}:{}",
        config.bind_addr,
        config.port
    );

    let data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::new("%a %t %r %s  %{Referer}i %Dms"))
            .service(handlers::index)
            .service(handlers::health)
            .service(handlers::telegram_webhook)
            .service(handlers::get_pending_users)
            .service(handlers::get_user_by_telegram)
            .service(handlers::register_user)
            .service(handlers::approve_user)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
