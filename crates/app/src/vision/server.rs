//! Actix Web server exposing the live stream, single-shot prediction and
//! snapshot endpoints, and explicit camera release.
//!
//! Handlers never touch the camera or model on the async workers: every
//! capture step runs on the blocking pool, so a slow device or a slow stream
//! client only stalls its own connection.

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tracing::{error, info};

use crate::vision::{
    config::ServiceConfig,
    data::{HealthResponse, PredictionResponse, RELEASE_MESSAGE, ReleaseResponse},
    encoding::{MULTIPART_CONTENT_TYPE, multipart_part},
    service::{ServiceError, VisionService},
    telemetry,
};

/// Register all routes on an app or test service.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/analyze", web::get().to(analyze_handler))
        .route("/AI", web::get().to(predict_handler))
        .route("/snapshot", web::get().to(snapshot_handler))
        .route("/release", web::post().to(release_handler))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Bind and run the server until shutdown, then release the camera.
pub(crate) async fn serve(config: &ServiceConfig, service: VisionService) -> Result<()> {
    let state = web::Data::new(service);
    let app_state = state.clone();
    let mut server = HttpServer::new(move || App::new().app_data(app_state.clone()).configure(routes));
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    info!(bind = %config.bind, port = config.port, "starting HTTP server");
    server
        .bind((config.bind.as_str(), config.port))
        .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?
        .run()
        .await
        .context("HTTP server error")?;

    if state.release() {
        info!("camera released on shutdown");
    }
    Ok(())
}

/// Run a blocking service call on the actix blocking pool.
async fn run_blocking<T, F>(service: &web::Data<VisionService>, job: F) -> Result<T, ServiceError>
where
    F: FnOnce(&VisionService) -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    let service = service.clone();
    web::block(move || job(&service))
        .await
        .map_err(|_| ServiceError::Blocking)?
}

/// Tracks open `/analyze` connections in the stream-clients gauge.
struct StreamClient;

impl StreamClient {
    fn connect() -> Self {
        metrics::gauge!("wildcam_stream_clients").increment(1.0);
        StreamClient
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        metrics::gauge!("wildcam_stream_clients").decrement(1.0);
    }
}

/// Stream annotated frames as `multipart/x-mixed-replace` until capture fails
/// or the client goes away. Dropping the body (disconnect) ends the loop; the
/// shared camera stays open for other requests.
async fn analyze_handler(service: web::Data<VisionService>) -> HttpResponse {
    let stream = stream! {
        let span = tracing::info_span!("http.analyze");
        let _client = StreamClient::connect();
        let mut frames: u64 = 0;
        loop {
            match run_blocking(&service, VisionService::annotated_frame).await {
                Ok(jpeg) => {
                    frames += 1;
                    yield Ok::<Bytes, actix_web::Error>(multipart_part(&jpeg));
                }
                Err(ServiceError::Capture(err)) => {
                    span.in_scope(|| info!(frames, "analyze stream ended: {err}"));
                    break;
                }
                Err(err) => {
                    span.in_scope(|| error!(frames, "analyze stream aborted: {err:?}"));
                    break;
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(MULTIPART_CONTENT_TYPE)
        .streaming(stream)
}

/// Capture one frame and return its top label.
async fn predict_handler(service: web::Data<VisionService>) -> Result<HttpResponse, ServiceError> {
    let detection = run_blocking(&service, VisionService::predict).await?;
    Ok(HttpResponse::Ok().json(PredictionResponse::from(detection)))
}

/// Return a single un-annotated JPEG.
async fn snapshot_handler(service: web::Data<VisionService>) -> Result<HttpResponse, ServiceError> {
    let jpeg = run_blocking(&service, VisionService::snapshot).await?;
    Ok(HttpResponse::Ok().content_type("image/jpeg").body(jpeg))
}

/// Close the camera; idempotent.
async fn release_handler(service: web::Data<VisionService>) -> Result<HttpResponse, ServiceError> {
    let released = run_blocking(&service, |service| Ok(service.release())).await?;
    Ok(HttpResponse::Ok().json(ReleaseResponse {
        message: RELEASE_MESSAGE,
        released,
    }))
}

async fn health_handler(service: web::Data<VisionService>) -> Result<HttpResponse, ServiceError> {
    let camera_open = run_blocking(&service, |service| Ok(service.camera().is_open())).await?;
    let detector = service.detector();
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        camera_open,
        camera_opens: service.camera().opened_count(),
        source: service.camera().describe(),
        backend: detector.runtime_name(),
        labels: detector.labels().iter().collect(),
    }))
}

/// Prometheus text exposition of the service metrics.
async fn metrics_handler(service: web::Data<VisionService>) -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => {
            service.record_camera_totals();
            HttpResponse::Ok()
                .content_type("text/plain; version=0.0.4")
                .body(handle.render())
        }
        None => HttpResponse::NoContent().finish(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use actix_web::{
        body::MessageBody,
        http::StatusCode,
        test,
    };
    use ml_core::{ClassScores, Detector, InputTensor, LabelSet, ModelRuntime};
    use serde_json::Value;
    use video_ingest::{Camera, CaptureDevice, CaptureError, DeviceOpener, Frame};

    use super::*;

    const LABELS: &str = "deer,frog,nothing,orangutan,tiger";

    /// Serves `frames_per_open` solid frames per open, then reports no frame.
    struct ScriptedOpener {
        frames_per_open: usize,
        fail_open: bool,
        opens: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    struct ScriptedDevice {
        remaining: usize,
        open: bool,
        reads: Arc<AtomicUsize>,
    }

    impl DeviceOpener for ScriptedOpener {
        fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            if self.fail_open {
                return Err(CaptureError::Open {
                    uri: "scripted".into(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedDevice {
                remaining: self.frames_per_open,
                open: true,
                reads: self.reads.clone(),
            }))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn read(&mut self) -> Result<Frame, CaptureError> {
            if !self.open {
                return Err(CaptureError::NotOpen);
            }
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.remaining == 0 {
                return Err(CaptureError::NoFrame);
            }
            self.remaining -= 1;
            Frame::from_bgr(64, 48, vec![120; 64 * 48 * 3])
        }

        fn is_opened(&self) -> bool {
            self.open
        }

        fn release(&mut self) {
            self.open = false;
        }
    }

    struct FixedScores(Vec<f32>);

    impl ModelRuntime for FixedScores {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn input_size(&self) -> (usize, usize) {
            (224, 224)
        }

        fn output_width(&self) -> usize {
            self.0.len()
        }

        fn infer(&self, _input: &InputTensor) -> anyhow::Result<ClassScores> {
            Ok(ClassScores(self.0.clone()))
        }
    }

    struct Fixture {
        state: web::Data<VisionService>,
        opens: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    fn fixture(frames_per_open: usize, fail_open: bool, scores: Vec<f32>) -> Fixture {
        let opens = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));
        let camera = Camera::new(Box::new(ScriptedOpener {
            frames_per_open,
            fail_open,
            opens: opens.clone(),
            reads: reads.clone(),
        }));
        let detector =
            Detector::new(Box::new(FixedScores(scores)), LabelSet::parse_list(LABELS).unwrap())
                .unwrap();
        let service = VisionService::new(camera, detector, 0.8, 90);
        Fixture {
            state: web::Data::new(service),
            opens,
            reads,
        }
    }

    fn orangutan_scores() -> Vec<f32> {
        vec![0.1, 0.1, 0.1, 0.6, 0.1]
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(App::new().app_data($fixture.state.clone()).configure(routes)).await
        };
    }

    #[actix_web::test]
    async fn ai_returns_top_label_and_confidence() {
        let fixture = fixture(1, false, orangutan_scores());
        let app = app!(fixture);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/AI").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["label"], "orangutan");
        let confidence = body["confidence"].as_f64().unwrap();
        assert!((confidence - 0.6).abs() < 1e-6);
    }

    #[actix_web::test]
    async fn ai_reports_capture_failure_as_server_error() {
        let fixture = fixture(1, true, orangutan_scores());
        let app = app!(fixture);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/AI").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Failed to capture image");
        assert!(!fixture.state.camera().is_open());
    }

    #[actix_web::test]
    async fn snapshot_returns_jpeg() {
        let fixture = fixture(1, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/snapshot").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        let body = test::read_body(resp).await;
        let decoded = image::load_from_memory(&body).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[actix_web::test]
    async fn snapshot_with_exhausted_source_is_server_error() {
        let fixture = fixture(0, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/snapshot").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn release_then_snapshot_reacquires_camera() {
        let fixture = fixture(usize::MAX, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/snapshot").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp =
            test::call_service(&app, test::TestRequest::post().uri("/release").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], RELEASE_MESSAGE);
        assert_eq!(body["released"], true);
        assert!(!fixture.state.camera().is_open());

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/snapshot").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn release_without_open_camera_is_idempotent() {
        let fixture = fixture(1, false, orangutan_scores());
        let app = app!(fixture);

        for _ in 0..2 {
            let resp =
                test::call_service(&app, test::TestRequest::post().uri("/release").to_request())
                    .await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["released"], false);
        }
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn release_requires_post() {
        let fixture = fixture(1, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/release").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn analyze_ends_when_source_is_exhausted() {
        let fixture = fixture(3, false, vec![0.02, 0.02, 0.02, 0.9, 0.04]);
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/analyze").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            MULTIPART_CONTENT_TYPE
        );

        let body = tokio::time::timeout(Duration::from_secs(10), test::read_body(resp))
            .await
            .expect("stream did not terminate");
        let parts = body
            .windows(b"--frame\r\n".len())
            .filter(|window| *window == b"--frame\r\n")
            .count();
        assert_eq!(parts, 3);
        assert!(body.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn analyze_disconnect_leaves_camera_open() {
        let fixture = fixture(usize::MAX, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/analyze").to_request()).await;
        let mut body = Box::pin(resp.into_body());
        let first = std::future::poll_fn(|cx| body.as_mut().poll_next(cx)).await;
        assert!(matches!(first, Some(Ok(ref chunk)) if chunk.starts_with(b"--frame")));
        let reads_at_disconnect = fixture.reads.load(Ordering::SeqCst);
        assert_eq!(reads_at_disconnect, 1);
        drop(body);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fixture.reads.load(Ordering::SeqCst), reads_at_disconnect);
        assert!(fixture.state.camera().is_open());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/AI").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn concurrent_requests_share_one_handle() {
        let fixture = fixture(usize::MAX, false, orangutan_scores());
        let app = app!(fixture);

        let (a, b) = tokio::join!(
            test::call_service(&app, test::TestRequest::get().uri("/AI").to_request()),
            test::call_service(&app, test::TestRequest::get().uri("/snapshot").to_request()),
        );
        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 1);
    }

    #[core::prelude::v1::test]
    fn camera_opens_metric_counts_a_shared_open_once() {
        let fixture = fixture(usize::MAX, false, orangutan_scores());
        let service = fixture.state.get_ref();
        let barrier = std::sync::Barrier::new(4);
        let barrier = &barrier;
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(move || {
                    barrier.wait();
                    service.predict().unwrap();
                });
            }
        });
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 1);

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            service.record_camera_totals();
            service.record_camera_totals();
        });
        let rendered = handle.render();
        assert!(
            rendered.lines().any(|line| line == "wildcam_camera_opens_total 1"),
            "{rendered}"
        );
    }

    #[actix_web::test]
    async fn health_reports_labels_and_camera_state() {
        let fixture = fixture(1, false, orangutan_scores());
        let app = app!(fixture);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["camera_open"], false);
        assert_eq!(body["backend"], "fixed");
        assert_eq!(body["labels"].as_array().unwrap().len(), 5);
    }
}
