use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{http::header, Error};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::config::AppConfig;

const HSTS: &str = "max-age=63072000; includeSubDomains; preload";

/// Adds browser hardening headers unless a handler already set them.
#[derive(Clone)]
pub struct SecurityHeaders {
    pub enable_hsts: bool,
    csp: String,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self { enable_hsts: false, csp: Self::policy(None) }
    }
}

impl SecurityHeaders {
    pub fn from_config(cfg: &AppConfig) -> Self {
        // avatars may be served from another origin (S3 / CDN)
        let media_origin = cfg
            .media_base_url
            .starts_with("http")
            .then(|| origin_of(&cfg.media_base_url));
        Self { enable_hsts: cfg.enable_hsts, csp: Self::policy(media_origin.as_deref()) }
    }

    pub fn with_hsts(mut self, enable: bool) -> Self {
        self.enable_hsts = enable;
        self
    }

    fn policy(media_origin: Option<&str>) -> String {
        let img_src = match media_origin {
            Some(origin) => format!("img-src 'self' data: {origin}"),
            None => "img-src 'self' data:".to_string(),
        };
        format!("default-src 'self'; {img_src}; object-src 'none'; base-uri 'none'; frame-ancestors 'none'; form-action 'self'")
    }
}

/// `https://cdn.example/bucket/avatars` -> `https://cdn.example`
fn origin_of(url: &str) -> String {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => url[..after_scheme + i].to_string(),
        None => url.to_string(),
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let csp = header::HeaderValue::from_str(&self.csp)
            .unwrap_or_else(|_| header::HeaderValue::from_static("default-src 'self'"));
        ready(Ok(SecurityHeadersMiddleware { service: Rc::new(service), enable_hsts: self.enable_hsts, csp }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: Rc<S>,
    enable_hsts: bool,
    csp: header::HeaderValue,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let csp = self.csp.clone();
        let enable_hsts = self.enable_hsts;
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            let headers = res.response_mut().headers_mut();
            let defaults = [
                (header::CONTENT_SECURITY_POLICY, csp),
                (header::REFERRER_POLICY, header::HeaderValue::from_static("strict-origin-when-cross-origin")),
                (header::X_CONTENT_TYPE_OPTIONS, header::HeaderValue::from_static("nosniff")),
                (header::X_FRAME_OPTIONS, header::HeaderValue::from_static("DENY")),
                (header::X_XSS_PROTECTION, header::HeaderValue::from_static("0")),
            ];
            for (name, value) in defaults {
                if !headers.contains_key(&name) {
                    headers.insert(name, value);
                }
            }
            if enable_hsts && !headers.contains_key(header::STRICT_TRANSPORT_SECURITY) {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, header::HeaderValue::from_static(HSTS));
            }
            Ok(res)
        })
    }
}
