use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::dashboard::{DashboardView, RenderOptions};
use crate::data::{load_table, FileFormat};

const HOMEPAGE: &str = include_str!("homepage.html");

#[derive(Deserialize)]
pub struct UploadQuery {
    pub filename: String,
    pub class: Option<String>,
}

// Upload endpoint. The body is the raw file; the page posts it again on every
// class change, so each request renders from scratch. An empty filename means
// nothing has been chosen yet; an empty file is parsed and rejected.
async fn upload_dashboard(
    query: web::Query<UploadQuery>,
    body: web::Bytes,
    options: web::Data<RenderOptions>,
) -> Result<HttpResponse, actix_web::Error> {
    let UploadQuery { filename, class } = query.into_inner();
    if filename.trim().is_empty() {
        return Ok(HttpResponse::Ok().json(DashboardView::waiting()));
    }

    let format = FileFormat::from_filename(&filename);
    tracing::info!(filename = %filename, ?format, bytes = body.len(), "rendering upload");

    let options = options.get_ref().clone();
    let view = web::block(move || {
        let loaded = load_table(&body, format);
        match &loaded {
            Ok(table) => tracing::debug!(rows = table.len(), "parsed student table"),
            Err(err) => tracing::warn!(filename = %filename, error = %err, "upload rejected"),
        }
        DashboardView::from_load(loaded, class.as_deref(), &options)
    })
    .await?;

    if let DashboardView::Ready(dashboard) = &view {
        tracing::debug!(
            classes = dashboard.classes.len(),
            segment_rows = dashboard.class_table.rows.len(),
            "dashboard rendered"
        );
    }

    let status = match view {
        DashboardView::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    Ok(HttpResponse::build(status).json(view))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("School Dashboard is running!")
}

async fn serve_homepage() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(HOMEPAGE)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(serve_homepage))
        .route("/dashboard", web::post().to(upload_dashboard))
        .route("/health", web::get().to(health_check));
}

pub async fn run(config: AppConfig) -> std::io::Result<()> {
    let options = web::Data::new(RenderOptions::from(&config));
    let upload_limit = config.max_upload_bytes;

    tracing::info!(
        host = %config.host,
        port = config.port,
        upload_limit,
        "starting School Dashboard on http://{}:{}",
        config.host,
        config.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(options.clone())
            .app_data(web::PayloadConfig::new(upload_limit))
            .configure(routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
