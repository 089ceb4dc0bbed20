//! Deprecation gate.

use crate::error::ApiError;
use crate::routing::ServiceRoute;

/// Reject requests routed to a retired service.
///
/// # Errors
///
/// Returns [`ApiError::DeprecatedRoute`] when the route is deprecated.
pub fn check(route: &ServiceRoute, path: &str) -> Result<(), ApiError> {
    if route.is_deprecated() {
        tracing::error!(service = %route.key(), path = %path, "Request to deprecated route");
        return Err(ApiError::DeprecatedRoute);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_route_passes() {
        assert!(check(&ServiceRoute::new("upload"), "/upload/x").is_ok());
    }

    #[test]
    fn deprecated_route_rejected() {
        let route = ServiceRoute::new("v1").deprecated().requires_auth();
        assert_eq!(check(&route, "/v1/users"), Err(ApiError::DeprecatedRoute));
    }
}
