//! Rate limiting middleware - the gatekeeper in front of protected routes.

use actix_web::{
    Error, HttpMessage, HttpResponse, HttpResponseBuilder,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use ratewall_shared::ErrorResponse;
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use ratewall_core::ports::RateLimiter;

use crate::observability::RequestId;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// How the gatekeeper derives identifiers and reacts to limiter failures.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    /// Header carrying the caller's API token.
    pub api_key_header: HeaderName,
    /// Take the client address from `Forwarded`/`X-Forwarded-For`.
    pub trust_forwarded_headers: bool,
    /// Let requests through when the counter store fails.
    pub fail_open: bool,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            api_key_header: HeaderName::from_static("api_key"),
            trust_forwarded_headers: false,
            fail_open: false,
        }
    }
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    config: Arc<GatekeeperConfig>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, config: GatekeeperConfig) -> Self {
        Self {
            limiter,
            config: Arc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            config: self.config.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    config: Arc<GatekeeperConfig>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let Some(identifier) = extract_identifier(&req, &config) else {
                tracing::warn!("Request has neither an API key nor a client address");
                let body = ErrorResponse::bad_request(
                    "request carries no API key and no client address",
                );
                return Ok(reject(req, HttpResponse::BadRequest(), body));
            };

            match limiter.check(&identifier).await {
                Ok(decision) if decision.is_exceeded() => {
                    tracing::warn!(
                        identifier = %identifier,
                        limit = decision.policy.max_requests,
                        "Rate limit exceeded"
                    );

                    let mut response = HttpResponse::TooManyRequests();
                    response
                        .insert_header((LIMIT_HEADER, decision.policy.max_requests.to_string()))
                        .insert_header((REMAINING_HEADER, "0"));

                    Ok(reject(req, response, ErrorResponse::too_many_requests()))
                }
                Ok(decision) => {
                    let mut res = service.call(req).await?;

                    let headers = res.headers_mut();
                    headers.insert(
                        HeaderName::from_static(LIMIT_HEADER),
                        HeaderValue::from(decision.policy.max_requests),
                    );
                    headers.insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from(decision.remaining()),
                    );

                    Ok(res.map_into_left_body())
                }
                Err(e) if config.fail_open => {
                    tracing::error!(identifier = %identifier, error = %e, "Rate limiter error, failing open");
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    tracing::error!(identifier = %identifier, error = %e, "Rate limiter error, failing closed");
                    Ok(reject(
                        req,
                        HttpResponse::InternalServerError(),
                        ErrorResponse::internal_error(),
                    ))
                }
            }
        })
    }
}

/// Short-circuit with an error body, carrying the request id when one was
/// assigned.
fn reject<B>(
    req: ServiceRequest,
    mut response: HttpResponseBuilder,
    body: ErrorResponse,
) -> ServiceResponse<EitherBody<B>> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string());

    let response = response.json(body.with_request_id(request_id));
    let (http_req, _payload) = req.into_parts();
    ServiceResponse::new(http_req, response).map_into_right_body()
}

/// The API key when present and non-empty, else the client address with
/// any port stripped.
pub fn extract_identifier(req: &ServiceRequest, config: &GatekeeperConfig) -> Option<String> {
    let token = req
        .headers()
        .get(&config.api_key_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    if let Some(token) = token {
        return Some(token.to_string());
    }

    let address = if config.trust_forwarded_headers {
        req.connection_info()
            .realip_remote_addr()
            .map(|addr| strip_port(addr).to_string())
    } else {
        req.peer_addr().map(|addr| addr.ip().to_string())
    };

    address.filter(|addr| !addr.is_empty())
}

/// `1.2.3.4:80` → `1.2.3.4`, `[::1]:80` → `::1`. Bare addresses, IPv6
/// included, come back unchanged.
pub fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']').map(|(host, _)| host).unwrap_or(addr);
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, body::BoxBody, http::StatusCode, test as actix_test, web};
    use async_trait::async_trait;
    use ratewall_core::{Decision, Policy, StoreError, Verdict};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::observability::RequestIdMiddleware;

    /// Limiter with a canned answer that records what it was asked about.
    struct MockLimiter {
        answer: Result<Verdict, StoreError>,
        seen: Mutex<Vec<String>>,
    }

    impl MockLimiter {
        fn new(answer: Result<Verdict, StoreError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateLimiter for MockLimiter {
        async fn check(&self, identifier: &str) -> Result<Decision, StoreError> {
            self.seen.lock().unwrap().push(identifier.to_string());
            let verdict = self.answer.clone()?;
            Ok(Decision {
                verdict,
                policy: Policy {
                    max_requests: 5,
                    block_duration: Duration::from_secs(60),
                },
                count: if verdict == Verdict::Allowed { 2 } else { 5 },
            })
        }
    }

    async fn call(
        limiter: Arc<MockLimiter>,
        config: GatekeeperConfig,
        req: actix_test::TestRequest,
    ) -> ServiceResponse<EitherBody<BoxBody>> {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter, config))
                .wrap(RequestIdMiddleware)
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;
        actix_test::call_service(&app, req.uri("/").to_request()).await
    }

    fn from_peer(addr: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::get().peer_addr(addr.parse().unwrap())
    }

    #[actix_rt::test]
    async fn test_allowed_passes_through_with_headers() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let res = call(
            limiter.clone(),
            GatekeeperConfig::default(),
            from_peer("203.0.113.9:4567"),
        )
        .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "3");
        assert_eq!(limiter.seen(), vec!["203.0.113.9"]);
    }

    #[actix_rt::test]
    async fn test_exceeded_is_429() {
        let limiter = MockLimiter::new(Ok(Verdict::Exceeded));
        let res = call(limiter, GatekeeperConfig::default(), from_peer("203.0.113.9:4567")).await;

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "0");

        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
        assert_eq!(
            body["detail"],
            "you have reached the maximum number of requests or actions allowed within a certain time frame"
        );
        assert!(body["request_id"].is_string());
    }

    #[actix_rt::test]
    async fn test_store_error_fails_closed_by_default() {
        let limiter = MockLimiter::new(Err(StoreError::Unavailable("down".into())));
        let res = call(limiter, GatekeeperConfig::default(), from_peer("203.0.113.9:4567")).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["title"], "Internal Server Error");
    }

    #[actix_rt::test]
    async fn test_store_error_fails_open_when_configured() {
        let limiter = MockLimiter::new(Err(StoreError::Timeout(Duration::from_millis(500))));
        let config = GatekeeperConfig {
            fail_open: true,
            ..Default::default()
        };
        let res = call(limiter, config, from_peer("203.0.113.9:4567")).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("x-ratelimit-limit").is_none());
    }

    #[actix_rt::test]
    async fn test_api_key_takes_precedence_over_address() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let req = from_peer("203.0.113.9:4567").insert_header(("API_KEY", "abc123"));
        call(limiter.clone(), GatekeeperConfig::default(), req).await;

        assert_eq!(limiter.seen(), vec!["abc123"]);
    }

    #[actix_rt::test]
    async fn test_empty_api_key_falls_back_to_address() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let req = from_peer("[2001:db8::1]:443").insert_header(("API_KEY", ""));
        call(limiter.clone(), GatekeeperConfig::default(), req).await;

        assert_eq!(limiter.seen(), vec!["2001:db8::1"]);
    }

    #[actix_rt::test]
    async fn test_custom_api_key_header() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let config = GatekeeperConfig {
            api_key_header: HeaderName::from_static("x-api-key"),
            ..Default::default()
        };
        let req = from_peer("203.0.113.9:4567").insert_header(("X-Api-Key", "tok42"));
        call(limiter.clone(), config, req).await;

        assert_eq!(limiter.seen(), vec!["tok42"]);
    }

    #[actix_rt::test]
    async fn test_forwarded_address_when_trusted() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let config = GatekeeperConfig {
            trust_forwarded_headers: true,
            ..Default::default()
        };
        let req = from_peer("10.0.0.2:5000").insert_header(("X-Forwarded-For", "198.51.100.4"));
        call(limiter.clone(), config, req).await;

        assert_eq!(limiter.seen(), vec!["198.51.100.4"]);
    }

    #[actix_rt::test]
    async fn test_forwarded_header_ignored_when_untrusted() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let req = from_peer("10.0.0.2:5000").insert_header(("X-Forwarded-For", "198.51.100.4"));
        call(limiter.clone(), GatekeeperConfig::default(), req).await;

        assert_eq!(limiter.seen(), vec!["10.0.0.2"]);
    }

    // The classifier would file an empty identifier under the token defaults;
    // the gatekeeper refuses to produce one in the first place.
    #[actix_rt::test]
    async fn test_missing_identifier_is_400_and_never_checked() {
        let limiter = MockLimiter::new(Ok(Verdict::Allowed));
        let res = call(
            limiter.clone(),
            GatekeeperConfig::default(),
            actix_test::TestRequest::get(),
        )
        .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(limiter.seen().is_empty());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("192.168.1.1:8080"), "192.168.1.1");
        assert_eq!(strip_port("192.168.1.1"), "192.168.1.1");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("[::1]"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
    }
}
