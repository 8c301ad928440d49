/// Client IP extraction for rate limiting.
use actix_web::HttpRequest;
use std::net::IpAddr;

/// Extract the real client IP address from an HTTP request.
///
/// Checks headers in order of preference:
/// 1. X-Forwarded-For (first IP in the list)
/// 2. X-Real-IP
/// 3. Remote peer address
pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    if let Some(xff) = req.headers().get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // The first entry is the original client
            if let Some(first_ip) = xff_str.split(',').next() {
                let trimmed = first_ip.trim();
                if trimmed.parse::<IpAddr>().is_ok() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    if let Some(xri) = req.headers().get("x-real-ip") {
        if let Ok(xri_str) = xri.to_str() {
            let trimmed = xri_str.trim();
            if trimmed.parse::<IpAddr>().is_ok() {
                return Some(trimmed.to_string());
            }
        }
    }

    req.peer_addr().map(|peer_addr| peer_addr.ip().to_string())
}

/// Same as [`extract_client_ip`] with `"unknown"` standing in for a missing address.
pub fn client_ip_or_unknown(req: &HttpRequest) -> String {
    extract_client_ip(req).unwrap_or_else(|| "unknown".to_string())
}
