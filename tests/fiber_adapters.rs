//! Fiber adapters against `wiremock` servers: no real provider traffic.
//! Covers the structured API adapter, the results-page scraper, and the whole
//! configured chain falling from one to the other.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fiber_locator::config::{FiberProviderCfg, ServiceConfig};
use fiber_locator::fiber::json_api::JsonApiAdapter;
use fiber_locator::fiber::scrape::HtmlScrapeAdapter;
use fiber_locator::{fiber, AdapterError, Attempt, FiberQuery, SourceAdapter};

/// Provider table pointing every fiber source at the mock server.
fn config_for(server: &MockServer) -> ServiceConfig {
    let base = server.uri();
    let toml = format!(
        r#"
[[fiber.providers]]
kind = "json_api"
name = "primary-api"
url = "{base}/api/check"
timeout_secs = 2
city_field = "city"
default_speed = "up to 1Gbps"
default_message = "check complete"
link = "{base}/check?q={{address}}"

[[fiber.providers]]
kind = "html_scrape"
name = "primary-page"
url = "{base}/check?q={{address}}"
timeout_secs = 2
positive_markers = ["fiber-result-available"]
negative_markers = ["fiber-result-unavailable"]
speed_pattern = "Speed: ([^<]+)<"
available_speed = "up to 1Gbps"
available_message = "fiber available"
unavailable_message = "fiber not available"
link = "{base}/check?q={{address}}"

[[fiber.providers]]
kind = "json_api"
name = "secondary-api"
url = "{base}/secondary"
timeout_secs = 2
default_speed = "up to 500Mbps"
fixed_message = "checked with other providers"
link = "{base}/secondary-page"

[fiber.fallback]
metro_cities = ["Haifa"]
available_speed = "up to 1Gbps"
available_message = "likely available"
unavailable_message = "check with the provider"
link = "{base}/"
"#
    );
    ServiceConfig::from_toml_str(&toml).expect("test config parses")
}

fn query() -> FiberQuery {
    FiberQuery::from_parts(Some("Dizengoff 50"), Some("Tel Aviv"), None, None).unwrap()
}

fn json_adapter(cfg: &ServiceConfig, idx: usize) -> JsonApiAdapter {
    match &cfg.fiber.providers[idx] {
        FiberProviderCfg::JsonApi(c) => JsonApiAdapter::from_config(c, reqwest::Client::new(), "test-ua"),
        other => panic!("provider {idx} is not a json api: {other:?}"),
    }
}

fn scrape_adapter(cfg: &ServiceConfig) -> HtmlScrapeAdapter {
    match &cfg.fiber.providers[1] {
        FiberProviderCfg::HtmlScrape(c) => {
            HtmlScrapeAdapter::from_config(c, reqwest::Client::new(), "test-ua").unwrap()
        }
        other => panic!("provider 1 is not a scrape provider: {other:?}"),
    }
}

#[tokio::test]
async fn json_api_posts_address_and_city_and_trusts_negative() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .and(header("user-agent", "test-ua"))
        .and(body_json(json!({"address": "Dizengoff 50", "city": "Tel Aviv"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"available": false})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let out = json_adapter(&cfg, 0).attempt(&query()).await.unwrap();
    match out {
        Attempt::Definitive(r) => {
            assert!(!r.available);
            assert!(r.checked);
            assert_eq!(r.speed, "");
            assert_eq!(r.message, "check complete");
            assert_eq!(r.link, format!("{}/check?q=Dizengoff%2050", server.uri()));
        }
        other => panic!("expected definitive answer, got {other:?}"),
    }
}

#[tokio::test]
async fn json_api_server_error_is_a_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let err = json_adapter(&cfg, 0).attempt(&query()).await.unwrap_err();
    assert!(
        matches!(err, AdapterError::Status { status: 503, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn json_api_without_flag_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let err = json_adapter(&cfg, 0).attempt(&query()).await.unwrap_err();
    assert!(matches!(err, AdapterError::Malformed(_)), "got {err:?}");
}

#[tokio::test]
async fn json_api_html_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let err = json_adapter(&cfg, 0).attempt(&query()).await.unwrap_err();
    assert!(matches!(err, AdapterError::Malformed(_)), "got {err:?}");
}

#[tokio::test]
async fn scrape_reads_positive_page_and_speed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .and(query_param("q", "Dizengoff 50"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="fiber-result-available"><span>Speed: 2.5Gbps</span></div>"#,
        ))
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    match scrape_adapter(&cfg).attempt(&query()).await.unwrap() {
        Attempt::Definitive(r) => {
            assert!(r.available);
            assert_eq!(r.speed, "2.5Gbps");
            assert_eq!(r.message, "fiber available");
        }
        other => panic!("expected definitive answer, got {other:?}"),
    }
}

#[tokio::test]
async fn scrape_abstains_on_page_without_markers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>redesigned</html>"))
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let out = scrape_adapter(&cfg).attempt(&query()).await.unwrap();
    assert_eq!(out, Attempt::Abstain);
}

#[tokio::test]
async fn chain_falls_from_api_to_page_and_stops_there() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<p class="fiber-result-unavailable">no</p>"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"available": true})))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let client = reqwest::Client::new();
    let chain = fiber::build_resolver(&cfg.fiber, &client, &cfg.user_agent).unwrap();
    let res = chain.resolve(&query()).await;

    assert_eq!(res.source, "primary-page");
    assert!(!res.terminal);
    assert!(!res.value.available);
    assert_eq!(res.value.message, "fiber not available");
}

#[tokio::test]
async fn chain_reaches_secondary_provider_with_fixed_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/secondary"))
        .and(body_json(json!({"address": "Dizengoff 50"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"available": true, "message": "ignored"})),
        )
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let client = reqwest::Client::new();
    let chain = fiber::build_resolver(&cfg.fiber, &client, &cfg.user_agent).unwrap();
    let res = chain.resolve(&query()).await;

    assert_eq!(res.source, "secondary-api");
    assert!(res.value.available);
    assert_eq!(res.value.speed, "up to 500Mbps");
    assert_eq!(res.value.message, "checked with other providers");
    assert_eq!(res.value.link, format!("{}/secondary-page", server.uri()));
}

#[tokio::test]
async fn chain_with_every_provider_down_uses_metro_guess() {
    // Nothing mounted: every request gets wiremock's default 404.
    let server = MockServer::start().await;
    let cfg = config_for(&server);
    let client = reqwest::Client::new();
    let chain = fiber::build_resolver(&cfg.fiber, &client, &cfg.user_agent).unwrap();

    let haifa = FiberQuery::from_parts(None, Some("Haifa Bay"), None, None).unwrap();
    let res = chain.resolve(&haifa).await;
    assert!(res.terminal);
    assert_eq!(res.source, "metro-heuristic");
    assert!(res.value.available);
    assert!(res.value.checked);
    assert_eq!(res.value.message, "likely available");
}
