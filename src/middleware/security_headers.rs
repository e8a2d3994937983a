// Static security headers applied to every response, built the same way the
// teacher composes `SetResponseHeaderLayer`s in `build_app()`.

use axum::http::header;
use tower_http::set_header::SetResponseHeaderLayer;

pub fn layers() -> Vec<SetResponseHeaderLayer<header::HeaderValue>> {
    vec![
        SetResponseHeaderLayer::overriding(header::X_CONTENT_TYPE_OPTIONS, header::HeaderValue::from_static("nosniff")),
        SetResponseHeaderLayer::overriding(header::X_FRAME_OPTIONS, header::HeaderValue::from_static("DENY")),
        SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-xss-protection"),
            header::HeaderValue::from_static("1; mode=block"),
        ),
        SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            header::HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ),
        SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            header::HeaderValue::from_static("default-src 'self'"),
        ),
        SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            header::HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("permissions-policy"),
            header::HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
        ),
    ]
}
