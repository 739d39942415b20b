use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use skin_condition_api::config::{ClassifierConfig, Settings};
use skin_condition_api::inference::classifier::CommandClassifier;
use skin_condition_api::pipeline::PredictionPipeline;
use skin_condition_api::routes::configure_routes;
use skin_condition_api::storage::temp_store::TempArtifactStore;
use skin_condition_api::telemetry;
use std::fmt::Display;
use std::sync::Arc;

fn startup_error(context: &str, e: impl Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let classifier_config = ClassifierConfig::load(&settings.classifier_config)
        .map_err(|e| startup_error("Failed to load classifier", e))?;
    log::info!(
        "Using classifier command {} {:?}",
        classifier_config.program,
        classifier_config.args
    );
    let classifier = Arc::new(CommandClassifier::new(classifier_config));

    let store = TempArtifactStore::new(&settings.temp_dir, settings.max_upload_bytes)
        .map_err(|e| startup_error("Failed to prepare temp directory", e))?;
    log::info!(
        "Temp uploads go to {} (limit {} bytes)",
        store.root().display(),
        store.max_bytes()
    );

    let telemetry = telemetry::from_settings(settings.telemetry.as_ref());
    let pipeline = PredictionPipeline::new(store, classifier, telemetry);

    let bind_address = settings.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(pipeline.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
