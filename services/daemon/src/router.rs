//! Liveness Router
//!
//! A single `GET /healthz` route answering "this process is alive". It is
//! deliberately blind to connection state: while reconnection is in
//! progress the process is still live, and the external supervisor only
//! restarts it when the process itself exits.

use axum::{Router, http::StatusCode, routing::get};

/// Creates the liveness router.
pub fn create_router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthz_answers_ok() {
        let (status, body) = healthz().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn router_builds() {
        let _ = create_router();
    }
}
