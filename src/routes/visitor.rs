use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::client_ip::ClientIp;
use crate::error::AppError;
use crate::geo::GeoLocation;
use crate::visitor::{header_or, persist_visitor, VisitorRecord};
use crate::AppState;

#[derive(Serialize)]
pub struct VisitorInfo {
    pub ip_address: String,
    pub user_agent: String,
    pub country_info: GeoLocation,
    pub timestamp: String,
}

pub async fn index(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> Response {
    match render_index(&state, ip, &headers).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Error in index route: {e}");
            error_page(&state, e)
        }
    }
}

async fn render_index(
    state: &AppState,
    ip: String,
    headers: &HeaderMap,
) -> Result<String, AppError> {
    tracing::debug!("Request headers: {headers:?}");
    tracing::info!("Extracted IP: {ip}");

    let location = state.geo.locate(&ip).await;
    let record = VisitorRecord::new(ip, headers, &location);
    tracing::info!("Visitor data: {record:?}");

    let outcome = persist_visitor(state.store.as_deref(), &record).await;
    tracing::info!("Persist outcome: {outcome}");

    let mut ctx = tera::Context::new();
    ctx.insert("visitor_data", &record);
    ctx.insert("cosmos_saved", &outcome.is_saved());
    Ok(state.tera.render("index.html", &ctx)?)
}

fn error_page(state: &AppState, err: AppError) -> Response {
    let mut ctx = tera::Context::new();
    ctx.insert("error", &err.to_string());
    match state.tera.render("error.html", &ctx) {
        Ok(html) => (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response(),
        Err(render_err) => {
            tracing::error!("Failed to render error page: {render_err}");
            err.into_response()
        }
    }
}

pub async fn api_visitor_info(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> Json<VisitorInfo> {
    let country_info = state.geo.locate(&ip).await;
    Json(VisitorInfo {
        ip_address: ip,
        user_agent: header_or(&headers, &header::USER_AGENT, "Unknown"),
        country_info,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::geo::tests::{new_york, MockGeoLocator};
    use crate::geo::GeoLocation;
    use crate::routes::tests::{body_json, body_string, get, templates, test_state};
    use crate::store::tests::{MockBehavior, MockDocumentStore};
    use crate::store::DocumentStore;
    use crate::AppState;

    #[tokio::test]
    async fn test_index_renders_and_persists() {
        let geo = MockGeoLocator::new(new_york());
        let lookups = geo.lookups.clone();
        let store = Arc::new(MockDocumentStore::new(MockBehavior::Create));
        let items = store.items.clone();
        let state = test_state(Arc::new(geo), Some(store as Arc<dyn DocumentStore>));

        let res = get(
            state,
            "/",
            &[
                ("X-Forwarded-For", "203.0.113.1, 10.0.0.1"),
                ("User-Agent", "Mozilla/5.0 Test Browser"),
                ("Referer", "https://google.com"),
                ("Accept-Language", "en-CA,en;q=0.9"),
            ],
        )
        .await;

        assert_eq!(res.status(), StatusCode::OK);
        let html = body_string(res).await;
        assert!(html.contains("United States"));
        assert!(html.contains("203.0.113.1"));
        assert!(html.contains("Your visit has been logged."));

        assert_eq!(*lookups.lock().unwrap(), vec!["203.0.113.1".to_string()]);

        let items = items.lock().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["user_agent"], "Mozilla/5.0 Test Browser");
        assert_eq!(items[0]["referer"], "https://google.com");
        assert_eq!(items[0]["accept_language"], "en-CA,en;q=0.9");
        assert_eq!(items[0]["country_code"], "US");
    }

    #[tokio::test]
    async fn test_index_without_store_still_renders() {
        let state = test_state(Arc::new(MockGeoLocator::new(new_york())), None);

        let res = get(state, "/", &[("X-Real-IP", "203.0.113.1")]).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_string(res).await;
        assert!(html.contains("Your visit could not be logged."));
    }

    #[tokio::test]
    async fn test_index_store_failure_is_not_http_error() {
        let store: Arc<dyn DocumentStore> = Arc::new(MockDocumentStore::new(MockBehavior::Fail));
        let state = test_state(Arc::new(MockGeoLocator::new(new_york())), Some(store));

        let res = get(state, "/", &[("X-Real-IP", "203.0.113.1")]).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_string(res).await.contains("could not be logged"));
    }

    #[tokio::test]
    async fn test_index_render_failure_is_500() {
        let mut tera = tera::Tera::default();
        tera.add_raw_template("error.html", "<p>{{ error }}</p>")
            .unwrap();
        let state = AppState {
            tera: Arc::new(tera),
            ..test_state(Arc::new(MockGeoLocator::new(new_york())), None)
        };

        let res = get(state, "/", &[]).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let html = body_string(res).await;
        assert!(html.starts_with("<p>Template error:"), "{html}");
    }

    #[tokio::test]
    async fn test_index_falls_back_to_plain_text() {
        let state = AppState {
            tera: Arc::new(tera::Tera::default()),
            ..test_state(Arc::new(MockGeoLocator::new(new_york())), None)
        };

        let res = get(state, "/", &[]).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(res).await.starts_with("Template error:"));
    }

    #[tokio::test]
    async fn test_api_visitor_info() {
        let germany = GeoLocation {
            country: "Germany".to_string(),
            country_code: "DE".to_string(),
            city: "Berlin".to_string(),
            region: "Berlin".to_string(),
            latitude: Some(52.52),
            longitude: Some(13.405),
            timezone: "Europe/Berlin".to_string(),
        };
        let state = test_state(Arc::new(MockGeoLocator::new(germany)), None);

        let res = get(
            state,
            "/api/visitor-info",
            &[
                ("X-Azure-ClientIP", "203.0.113.1:8080"),
                ("X-Forwarded-For", "198.51.100.1"),
                ("User-Agent", "Test API Client"),
            ],
        )
        .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        let data = body_json(res).await;
        assert_eq!(data["ip_address"], "203.0.113.1");
        assert_eq!(data["user_agent"], "Test API Client");
        assert_eq!(data["country_info"]["country"], "Germany");
        assert_eq!(data["country_info"]["countryCode"], "DE");
        assert!(data["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_api_visitor_info_on_upstream_failure() {
        let timeout = GeoLocation::failure("Timeout Error".to_string(), "Unknown");
        let state = test_state(Arc::new(MockGeoLocator::new(timeout)), None);

        let res = get(state, "/api/visitor-info", &[("X-Real-IP", "203.0.113.1")]).await;
        assert_eq!(res.status(), StatusCode::OK);

        let data = body_json(res).await;
        for key in ["ip_address", "user_agent", "country_info", "timestamp"] {
            assert!(data.get(key).is_some(), "missing {key}");
        }
        assert_eq!(data["user_agent"], "Unknown");
        assert_eq!(data["country_info"]["country"], "Timeout Error");
        assert_eq!(data["country_info"]["countryCode"], "XX");
    }

    #[test]
    fn test_templates_load() {
        let names: Vec<_> = templates().get_template_names().map(str::to_string).collect();
        assert!(names.contains(&"index.html".to_string()));
        assert!(names.contains(&"error.html".to_string()));
    }
}
