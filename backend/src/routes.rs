use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use log::debug;
use skin_shared::RootMessage;

use crate::pipeline::{PredictionFailure, PredictionPipeline, UploadError, UploadedImage};

pub const UPLOAD_FIELD: &str = "file";
const WELCOME_MESSAGE: &str = "Welcome, we are alive";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/predict_skin/").route(web::post().to(predict_skin)))
        .service(web::resource("/predict/").route(web::post().to(predict_skin)));
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(RootMessage {
        message: WELCOME_MESSAGE.to_string(),
    })
}

async fn predict_skin(
    pipeline: web::Data<PredictionPipeline>,
    mut payload: Multipart,
) -> Result<HttpResponse, PredictionFailure> {
    loop {
        let field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(pipeline.reject("", UploadError::Malformed(e.to_string()))),
        };

        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            if let Err(e) = drain(field).await {
                return Err(pipeline.reject("", UploadError::Malformed(e.to_string())));
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let response = pipeline
            .run(UploadedImage {
                filename,
                content_type,
                content: field,
            })
            .await?;
        return Ok(HttpResponse::Ok().json(response));
    }

    Err(pipeline.reject("", UploadError::MissingFile))
}

async fn drain(mut field: Field) -> Result<(), MultipartError> {
    while field.try_next().await?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::classifier::{ClassificationError, Classifier, PredictionResult};
    use crate::storage::temp_store::TempArtifactStore;
    use crate::telemetry::NoopTelemetry;
    use actix_web::http::StatusCode;
    use actix_web::http::header::CONTENT_TYPE;
    use actix_web::{App, test};
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BOUNDARY: &str = "----skin-test-boundary";

    struct FixedClassifier(fn() -> Result<PredictionResult, ClassificationError>);

    impl Classifier for FixedClassifier {
        fn classify(&self, image_path: &Path) -> Result<PredictionResult, ClassificationError> {
            assert!(image_path.exists(), "artifact must exist while classifying");
            (self.0)()
        }
    }

    fn pipeline(
        dir: &TempDir,
        outcome: fn() -> Result<PredictionResult, ClassificationError>,
    ) -> PredictionPipeline {
        PredictionPipeline::new(
            TempArtifactStore::new(dir.path(), 1024 * 1024).unwrap(),
            Arc::new(FixedClassifier(outcome)),
            Arc::new(NoopTelemetry),
        )
    }

    fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(path: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(path)
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    fn leftover_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[actix_web::test]
    async fn root_reports_liveness() {
        let app = test::init_service(App::new().configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].is_string());
    }

    #[rstest]
    #[case("/predict_skin/")]
    #[case("/predict/")]
    #[actix_web::test]
    async fn prediction_returns_rounded_probability(#[case] path: &str) {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(&dir, || {
                    Ok(PredictionResult::new("Eczema", 0.8731))
                })))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body("file", "face1.jpg", "image/jpeg", b"\xff\xd8\xff\xe0fake");
        let resp = test::call_service(&app, upload_request(path, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"skin_condition": "Eczema", "probability": 0.873}));
        assert_eq!(leftover_files(&dir), 0);
    }

    #[actix_web::test]
    async fn classifier_failure_returns_error_envelope() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(&dir, || {
                    Err(ClassificationError::Failed {
                        status: "exit status: 1".to_string(),
                        stderr: "model error".to_string(),
                    })
                })))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body("file", "face2.jpg", "image/jpeg", b"bytes");
        let req = upload_request("/predict_skin/", body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["filename"], "face2.jpg");
        assert!(body["message"].is_string());
        assert!(body["error"].as_str().unwrap().contains("model error"));
        assert_eq!(leftover_files(&dir), 0);
    }

    #[actix_web::test]
    async fn out_of_range_confidence_is_never_a_success() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(&dir, || {
                    Ok(PredictionResult::new("Eczema", 1.4))
                })))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body("file", "face3.jpg", "image/jpeg", b"bytes");
        let req = upload_request("/predict_skin/", body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(leftover_files(&dir), 0);
    }

    #[actix_web::test]
    async fn missing_file_field_is_an_upload_error() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(&dir, || {
                    Ok(PredictionResult::new("Boil", 0.5))
                })))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body("image", "face.jpg", "image/jpeg", b"bytes");
        let req = upload_request("/predict_skin/", body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid upload");
        assert_eq!(body["filename"], "");
        assert_eq!(leftover_files(&dir), 0);
    }

    #[actix_web::test]
    async fn non_image_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pipeline(&dir, || {
                    Ok(PredictionResult::new("Boil", 0.5))
                })))
                .configure(configure_routes),
        )
        .await;

        let body = multipart_body("file", "notes.txt", "text/plain", b"hello");
        let req = upload_request("/predict_skin/", body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["filename"], "notes.txt");
        assert_eq!(leftover_files(&dir), 0);
    }
}
