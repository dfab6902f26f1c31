pub mod diagnostics;
pub mod response;

use crate::{
    config::{EndpointPlan, RetryPolicy, ServiceConfig},
    credential::Credential,
    error::{ErrorKind, PipelineError, Result},
    logger,
    models::{GenerationFailure, GenerationRequest, GenerationResult, TextToImageRequest},
};
use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::Value;
use std::time::Duration;

pub use diagnostics::{diagnostic_body, truncate_text, DIAGNOSTIC_LIMIT};
pub use response::classify_success;

/// What a single POST to a single endpoint produced.
enum Attempt {
    /// HTTP 200, classified. Final regardless of shape.
    Completed(GenerationResult),
    TimedOut(GenerationFailure),
    Failed(GenerationFailure),
}

/// Sends generation requests to a hosted service, walking the endpoint
/// candidates of an `EndpointPlan`.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    connect_timeout: Duration,
    service: ServiceConfig,
}

impl Dispatcher {
    pub fn new(service: ServiceConfig) -> Result<Self> {
        let connect_timeout = service.policy.connect_timeout;
        Ok(Self {
            client: build_client(connect_timeout)?,
            connect_timeout,
            service,
        })
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// The service's own endpoints and retry policy.
    pub fn plan(&self) -> EndpointPlan {
        self.service.plan()
    }

    /// Image-to-video. Invalid parameters are rejected before any network
    /// traffic.
    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
        plan: &EndpointPlan,
        credential: &Credential,
    ) -> GenerationResult {
        if let Err(e) = request.validate(&self.service) {
            log::warn!("Rejected {} request locally: {}", self.service.name, e);
            return GenerationResult::Failure(e.into());
        }

        log::info!(
            "Dispatching {} image-to-video ({}, image {} bytes)",
            self.service.name,
            request.summary(),
            request.image.len()
        );

        match serde_json::to_value(request.payload()) {
            Ok(body) => self.send_with_fallback(&body, plan, credential).await,
            Err(e) => GenerationResult::failure(
                ErrorKind::InvalidParameter,
                format!("request could not be serialized: {}", e),
            ),
        }
    }

    pub async fn dispatch_text_to_image(
        &self,
        request: &TextToImageRequest,
        plan: &EndpointPlan,
        credential: &Credential,
    ) -> GenerationResult {
        if let Err(e) = request.validate(&self.service) {
            log::warn!("Rejected {} request locally: {}", self.service.name, e);
            return GenerationResult::Failure(e.into());
        }

        log::info!(
            "Dispatching {} text-to-image ({} {})",
            self.service.name,
            request.model,
            request.size.as_str()
        );

        match serde_json::to_value(request) {
            Ok(body) => self.send_with_fallback(&body, plan, credential).await,
            Err(e) => GenerationResult::failure(
                ErrorKind::InvalidParameter,
                format!("request could not be serialized: {}", e),
            ),
        }
    }

    /// Downloads the media behind a `MediaReference`. Reference URLs are
    /// pre-signed, so no credential is attached.
    pub async fn resolve_reference(&self, url: &str, timeout: Duration) -> GenerationResult {
        log::info!("Downloading generated media from {}", url);

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                return GenerationResult::Failure(
                    GenerationFailure::new(ErrorKind::FetchError, format!("download failed: {}", e))
                        .with_endpoint(url),
                )
            }
        };

        let status = response.status().as_u16();
        let content_type = header_text(&response, CONTENT_TYPE);
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return GenerationResult::Failure(
                GenerationFailure::new(ErrorKind::FetchError, format!("download returned {}", status))
                    .with_status(status)
                    .with_diagnostic(truncate_text(&body, DIAGNOSTIC_LIMIT))
                    .with_endpoint(url),
            );
        }

        match response.bytes().await {
            Ok(bytes) => classify_success(bytes.to_vec(), content_type.as_deref(), url),
            Err(e) => GenerationResult::Failure(
                GenerationFailure::new(ErrorKind::FetchError, format!("reading media: {}", e))
                    .with_endpoint(url),
            ),
        }
    }

    async fn send_with_fallback(
        &self,
        body: &Value,
        plan: &EndpointPlan,
        credential: &Credential,
    ) -> GenerationResult {
        if plan.endpoints.is_empty() {
            return GenerationResult::failure(
                ErrorKind::InvalidParameter,
                "no endpoints configured",
            );
        }
        if credential.is_empty() {
            return GenerationResult::failure(ErrorKind::InvalidParameter, "API key not provided");
        }

        let client = match self.client_for(&plan.policy) {
            Ok(client) => client,
            Err(e) => return GenerationResult::Failure(e.into()),
        };

        let _timer = logger::timer(&format!("{} dispatch", self.service.name));
        let max_attempts = plan.policy.max_attempts.max(1);
        let mut last_failure = None;

        for endpoint in &plan.endpoints {
            let mut attempt = 1;
            loop {
                log::debug!("POST {} (attempt {}/{})", endpoint, attempt, max_attempts);

                match self
                    .post_once(&client, endpoint, body, &plan.policy, credential)
                    .await
                {
                    Attempt::Completed(result) => {
                        if result.is_success() {
                            log::info!("Generation succeeded via {}", endpoint);
                        }
                        return result;
                    }
                    Attempt::TimedOut(failure) => {
                        last_failure = Some(failure);
                        if attempt >= max_attempts {
                            log::warn!(
                                "{} timed out {} times, trying next endpoint",
                                endpoint,
                                attempt
                            );
                            break;
                        }
                        log::warn!(
                            "{} timed out (attempt {}/{}), retrying in {:?}",
                            endpoint,
                            attempt,
                            max_attempts,
                            plan.policy.retry_delay
                        );
                        tokio::time::sleep(plan.policy.retry_delay).await;
                        attempt += 1;
                    }
                    Attempt::Failed(failure) => {
                        log::warn!("{} failed: {}", endpoint, failure);
                        last_failure = Some(failure);
                        break;
                    }
                }
            }
        }

        let mut failure = last_failure.unwrap_or_else(|| {
            GenerationFailure::new(ErrorKind::NetworkError, "no endpoint produced a response")
        });
        failure.message = format!(
            "all {} endpoint(s) failed; last error: {}",
            plan.endpoints.len(),
            failure.message
        );
        log::error!("Generation failed: {}", failure);
        GenerationResult::Failure(failure)
    }

    async fn post_once(
        &self,
        client: &Client,
        endpoint: &str,
        body: &Value,
        policy: &RetryPolicy,
        credential: &Credential,
    ) -> Attempt {
        let request = credential.apply(client.post(endpoint).timeout(policy.read_timeout).json(body));

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(e, endpoint, credential),
        };

        let status = response.status().as_u16();
        let content_type = header_text(&response, CONTENT_TYPE);

        if status == 200 {
            return match response.bytes().await {
                Ok(bytes) => Attempt::Completed(classify_success(
                    bytes.to_vec(),
                    content_type.as_deref(),
                    endpoint,
                )),
                Err(e) => transport_failure(e, endpoint, credential),
            };
        }

        let text = response.text().await.unwrap_or_default();
        let kind = ErrorKind::from_status(status);
        let shown_endpoint = credential.redact(endpoint);
        Attempt::Failed(
            GenerationFailure::new(kind, format!("Error {} from {}", status, shown_endpoint))
                .with_status(status)
                .with_diagnostic(diagnostic_body(&text, credential))
                .with_endpoint(shown_endpoint),
        )
    }

    fn client_for(&self, policy: &RetryPolicy) -> Result<Client> {
        if policy.connect_timeout == self.connect_timeout {
            Ok(self.client.clone())
        } else {
            build_client(policy.connect_timeout)
        }
    }
}

fn build_client(connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))
}

fn header_text(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

fn transport_failure(err: reqwest::Error, endpoint: &str, credential: &Credential) -> Attempt {
    let message = credential.redact(&format!("request to {} failed: {}", endpoint, err));
    let failure = GenerationFailure::new(ErrorKind::NetworkError, message)
        .with_endpoint(credential.redact(endpoint));
    if err.is_timeout() {
        Attempt::TimedOut(failure)
    } else {
        Attempt::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizerConfig;
    use crate::models::{ImageSize, QualityMode};
    use crate::normalizer::encode_canonical;
    use image::{DynamicImage, RgbImage};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "sk-test-123";

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::video()
            .with_timeouts(Duration::from_secs(2), Duration::from_millis(250))
            .with_retry_delay(Duration::from_millis(10))
    }

    fn kling() -> Dispatcher {
        Dispatcher::new(ServiceConfig::segmind_kling().with_policy(fast_policy())).unwrap()
    }

    fn credential() -> Credential {
        ServiceConfig::segmind_kling().credential(KEY)
    }

    fn request() -> GenerationRequest {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9])));
        let canonical = encode_canonical(&image, &NormalizerConfig::default()).unwrap();
        GenerationRequest::new(canonical, "a calm lake")
            .with_mode(QualityMode::Standard)
            .with_duration(5)
    }

    fn plan(server: &MockServer, routes: &[&str]) -> EndpointPlan {
        EndpointPlan::new(fast_policy())
            .with_endpoints(routes.iter().map(|r| format!("{}{}", server.uri(), r)))
    }

    async fn hits(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }

    #[tokio::test]
    async fn test_out_of_range_cfg_scale_never_reaches_network() {
        let server = MockServer::start().await;
        let result = kling()
            .dispatch(
                &request().with_cfg_scale(1.5),
                &plan(&server, &["/gen"]),
                &credential(),
            )
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidParameter));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_on_the_same_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gen"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_raw(b"late".to_vec(), "video/mp4"),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gen"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"video".to_vec(), "video/mp4"))
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request(), &plan(&server, &["/gen"]), &credential())
            .await;

        assert!(matches!(result, GenerationResult::MediaBytes { ref bytes, .. } if bytes == b"video"));
        assert_eq!(hits(&server, "/gen").await, 3);
    }

    #[tokio::test]
    async fn test_timeout_exhaustion_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request(), &plan(&server, &["/gen"]), &credential())
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::NetworkError));
        assert_eq!(hits(&server, "/gen").await, 3);
    }

    #[tokio::test]
    async fn test_server_error_falls_through_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"video".to_vec(), "video/mp4"))
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request(), &plan(&server, &["/first", "/second"]), &credential())
            .await;

        assert!(result.is_success());
        assert_eq!(result.endpoint(), Some(format!("{}/second", server.uri()).as_str()));
        assert_eq!(hits(&server, "/first").await, 1);
        assert_eq!(hits(&server, "/second").await, 1);
    }

    #[tokio::test]
    async fn test_wire_shape_and_credential_header() {
        let server = MockServer::start().await;
        let request = request();
        Mock::given(method("POST"))
            .and(path("/gen"))
            .and(header("x-api-key", KEY))
            .and(body_partial_json(json!({
                "image": request.image.base64(),
                "prompt": "a calm lake",
                "mode": "standard",
                "duration": 5,
                "cfg_scale": 0.5,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"video".to_vec(), "video/mp4"))
            .expect(1)
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request, &plan(&server, &["/gen"]), &credential())
            .await;
        assert!(result.is_success(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_cfg_scale_is_sent_as_chosen() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gen"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"video".to_vec(), "video/mp4"))
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(
                &request().with_cfg_scale(0.1),
                &plan(&server, &["/gen"]),
                &credential(),
            )
            .await;
        assert!(result.is_success(), "{:?}", result);

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["cfg_scale"].as_f64(), Some(0.1));
        assert_eq!(body["cfg_scale"].to_string(), "0.1");
    }

    #[tokio::test]
    async fn test_key_in_endpoint_url_is_redacted_from_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gen"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let endpoint = format!("/gen?key={}", KEY);
        let result = kling()
            .dispatch(&request(), &plan(&server, &[endpoint.as_str()]), &credential())
            .await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::ServerError);
        assert!(!failure.message.contains(KEY), "{}", failure.message);
        assert!(failure.message.contains("[REDACTED]"));
        assert!(!failure.endpoint.unwrap().contains(KEY));
    }

    #[tokio::test]
    async fn test_last_status_decides_the_failure_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(format!("invalid key {}", KEY)),
            )
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request(), &plan(&server, &["/a", "/b"]), &credential())
            .await;

        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::Unauthorized);
        assert_eq!(failure.status, Some(401));
        let diagnostic = failure.diagnostic.unwrap();
        assert!(!diagnostic.contains(KEY));
        assert!(diagnostic.contains("[REDACTED]"));
        assert!(!failure.message.contains(KEY));
    }

    #[tokio::test]
    async fn test_status_classes() {
        for (status, kind) in [
            (400, ErrorKind::InvalidParameter),
            (406, ErrorKind::InvalidParameter),
            (413, ErrorKind::PayloadTooLarge),
            (502, ErrorKind::ServerError),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("x".repeat(5000)))
                .mount(&server)
                .await;

            let result = kling()
                .dispatch(&request(), &plan(&server, &["/gen"]), &credential())
                .await;
            let GenerationResult::Failure(failure) = result else {
                panic!("expected failure for {}", status);
            };
            assert_eq!(failure.kind, kind);
            assert_eq!(failure.status, Some(status));
            assert!(failure.diagnostic.unwrap().chars().count() <= DIAGNOSTIC_LIMIT);
        }
    }

    #[tokio::test]
    async fn test_malformed_success_does_not_fall_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = kling()
            .dispatch(&request(), &plan(&server, &["/first", "/second"]), &credential())
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::MalformedResponse));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_network_error() {
        let plan = EndpointPlan::new(fast_policy()).with_endpoint("http://127.0.0.1:1/gen");
        let result = kling().dispatch(&request(), &plan, &credential()).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn test_missing_credential_and_endpoints_are_local_failures() {
        let server = MockServer::start().await;
        let dispatcher = kling();

        let empty_key = ServiceConfig::segmind_kling().credential("");
        let result = dispatcher
            .dispatch(&request(), &plan(&server, &["/gen"]), &empty_key)
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidParameter));

        let result = dispatcher
            .dispatch(&request(), &EndpointPlan::new(fast_policy()), &credential())
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidParameter));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_text_to_image_reference_then_download() {
        let server = MockServer::start().await;
        let image_url = format!("{}/files/toy.png", server.uri());
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-openai"))
            .and(body_partial_json(json!({"model": "dall-e-3", "n": 1, "size": "1792x1024"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"url": image_url}]})),
            )
            .mount(&server)
            .await;

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(2, 2))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        Mock::given(method("GET"))
            .and(path("/files/toy.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"))
            .mount(&server)
            .await;

        let service = ServiceConfig::openai_dalle().with_policy(fast_policy());
        let dispatcher = Dispatcher::new(service.clone()).unwrap();
        let plan = plan(&server, &["/v1/images/generations"]);
        let request = TextToImageRequest::new("a toy astronaut").with_size(ImageSize::Landscape);

        let result = dispatcher
            .dispatch_text_to_image(&request, &plan, &service.credential("sk-openai"))
            .await;
        let GenerationResult::MediaReference { url, .. } = result else {
            panic!("expected a media reference");
        };
        assert_eq!(url, image_url);

        let media = dispatcher.resolve_reference(&url, Duration::from_secs(5)).await;
        assert_eq!(
            media,
            GenerationResult::MediaBytes {
                bytes: png,
                mime: "image/png".into(),
                endpoint: image_url.clone(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_reference_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("expired"))
            .mount(&server)
            .await;

        let result = kling()
            .resolve_reference(&format!("{}/gone.mp4", server.uri()), Duration::from_secs(5))
            .await;
        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::FetchError);
        assert_eq!(failure.status, Some(403));
    }
}
