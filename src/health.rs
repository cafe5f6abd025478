use crate::error::AppError;
use crate::state::{AppMetrics, AppState, PipelineMetrics};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

/// `GET /` liveness probe.
pub async fn hello() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "hello": "world" }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "recognizer": {
            "engine": state.invoker.describe(),
            "sample_rate": config.recognizer.sample_rate,
            "feature_dim": config.recognizer.feature_dim,
            "provider": config.recognizer.provider
        },
        "limits": {
            "body_limit_bytes": config.server.body_limit_bytes,
            "max_file_bytes": config.upload.max_file_bytes
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics),
            "in_flight": metrics.in_flight
        },
        "pipeline": pipeline_summary(&metrics.pipeline),
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let uptime_seconds = state.uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics),
            "in_flight": metrics.in_flight,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "pipeline": pipeline_summary(&metrics.pipeline),
        "memory": get_memory_info()
    }))
}

/// Fallback for unrouted paths.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!("{} {}", req.method(), req.path())))
}

fn overall_error_rate(metrics: &AppMetrics) -> f64 {
    if metrics.request_count > 0 {
        metrics.error_count as f64 / metrics.request_count as f64
    } else {
        0.0
    }
}

fn pipeline_summary(pipeline: &PipelineMetrics) -> serde_json::Value {
    let average_recognition_ms = if pipeline.successes > 0 {
        pipeline.recognition_ms as f64 / pipeline.successes as f64
    } else {
        0.0
    };

    json!({
        "uploads": pipeline.uploads,
        "successes": pipeline.successes,
        "failures": pipeline.failure_count(),
        "failures_by_code": pipeline.failures,
        "bytes_received": pipeline.bytes_received,
        "audio_seconds": pipeline.audio_seconds,
        "average_recognition_ms": average_recognition_ms
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let field_bytes = |prefix: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(prefix))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map_or(0, |kb| kb * 1024)
            };

            return json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::{test_state, RecognitionStats};
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_root_says_hello() {
        let app = test::init_service(App::new().route("/", web::get().to(hello))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "hello": "world" }));
    }

    #[actix_web::test]
    async fn test_health_reports_recognizer_and_pipeline() {
        let state = test_state(AppConfig::default());
        state.record_recognition(RecognitionStats {
            bytes: 48,
            audio_seconds: 0.5,
            recognition_ms: 12,
        });
        state.record_failure("empty_upload");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["recognizer"]["engine"], "stub");
        assert_eq!(body["limits"]["max_file_bytes"], 10 * 1024 * 1024);
        assert_eq!(body["pipeline"]["uploads"], 2);
        assert_eq!(body["pipeline"]["failures_by_code"]["empty_upload"], 1);
        assert_eq!(body["pipeline"]["average_recognition_ms"], 12.0);
    }

    #[actix_web::test]
    async fn test_metrics_lists_endpoints_sorted() {
        let state = test_state(AppConfig::default());
        state.request_finished("POST /asr", 5, false);
        state.request_finished("GET /health", 1, false);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        let body: Value = test::read_body_json(resp).await;

        let endpoints: Vec<_> = body["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["endpoint"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(endpoints, vec!["GET /health", "POST /asr"]);
    }

    #[actix_web::test]
    async fn test_unknown_path_is_not_found() {
        let app = test::init_service(App::new().default_service(web::to(not_found))).await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/nope").to_request()).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "not_found");
    }
}
