//! HTTP handler functions for the neighbourhood API.

use actix_web::{HttpResponse, web};
use buurt_insight_server_models::{ApiHealth, NeighbourhoodRequest, StreamEvent};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/neighbourhood`
///
/// Returns the initial response. Late values are not waited for.
pub async fn neighbourhood(
    state: web::Data<AppState>,
    request: web::Json<NeighbourhoodRequest>,
) -> HttpResponse {
    let lookup = state.pipeline.lookup(&request).await;
    HttpResponse::Ok().json(lookup.response)
}

/// `POST /api/neighbourhood/stream`
///
/// Streams the initial response as a `response` event and, when a branch
/// was late, the update as a `lateUpdate` event.
pub async fn neighbourhood_stream(
    state: web::Data<AppState>,
    request: web::Json<NeighbourhoodRequest>,
) -> HttpResponse {
    let lookup = state.pipeline.lookup(&request).await;
    let zip_code = request.into_inner().zip_code;

    let stream = async_stream::stream! {
        yield sse_frame(&StreamEvent::Response(lookup.response));

        if let Some(late_update) = lookup.late_update {
            match late_update.await {
                Ok(update) => {
                    yield sse_frame(&StreamEvent::LateUpdate(update));
                }
                Err(e) => log::warn!("Late update for {zip_code} lost: {e}"),
            }
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

/// Renders one server-sent event whose data is the event payload.
fn sse_frame(event: &StreamEvent) -> Result<web::Bytes, serde_json::Error> {
    let data = match event {
        StreamEvent::Response(response) => serde_json::to_string(response)?,
        StreamEvent::LateUpdate(update) => serde_json::to_string(update)?,
    };

    Ok(web::Bytes::from(format!(
        "event: {}\ndata: {data}\n\n",
        event.name()
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};
    use buurt_insight_cache::TtlCache;
    use buurt_insight_pipeline::Pipeline;
    use buurt_insight_server_models::LateUpdate;
    use buurt_insight_source::config::Endpoints;
    use buurt_insight_source::testing::{Reply, ScriptedFetcher};
    use serde_json::json;

    use super::*;

    fn state(fetcher: ScriptedFetcher) -> web::Data<AppState> {
        web::Data::new(AppState {
            pipeline: Pipeline::from_endpoints(
                Arc::new(fetcher),
                TtlCache::in_memory(),
                &Endpoints::embedded(),
            ),
        })
    }

    fn no_docs() -> ScriptedFetcher {
        ScriptedFetcher::new().route(&["/free"], Reply::Json(json!({ "response": { "docs": [] } })))
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = test::init_service(App::new().configure(crate::configure)).await;

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/health").to_request(),
        )
        .await;

        assert_eq!(body["healthy"], json!(true));
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    }

    #[actix_web::test]
    async fn unresolved_zip_returns_error_body() {
        let app = test::init_service(
            App::new()
                .app_data(state(no_docs()))
                .configure(crate::configure),
        )
        .await;

        let body: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/neighbourhood")
                .set_json(json!({ "zipCode": "1011 AB" }))
                .to_request(),
        )
        .await;

        assert_eq!(
            body["error"],
            json!("No buurtcode found for zipCode 1011AB in Locatieserver response")
        );
        assert_eq!(body["tableProperties"], json!([]));
    }

    #[actix_web::test]
    async fn stream_sends_response_event() {
        let app = test::init_service(
            App::new()
                .app_data(state(no_docs()))
                .configure(crate::configure),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/neighbourhood/stream")
                .set_json(json!({ "zipCode": "1011 AB" }))
                .to_request(),
        )
        .await;
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = test::read_body(response).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.starts_with("event: response\ndata: {"));
        assert!(body.ends_with("\n\n"));
        assert!(!body.contains("lateUpdate"));
    }

    #[::core::prelude::v1::test]
    fn late_update_frame() {
        let frame = sse_frame(&StreamEvent::LateUpdate(LateUpdate::default())).unwrap();
        assert_eq!(
            frame,
            web::Bytes::from("event: lateUpdate\ndata: {\"cardProperties\":[]}\n\n")
        );
    }
}
