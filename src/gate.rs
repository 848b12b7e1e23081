//! # Admission Gates
//!
//! Both throttlers respect two independent override mechanisms, each
//! configured with its own header/parameter name:
//!
//! - An "enable-if-header": when a header name is configured, throttling for
//!   a given request is active only if that header is present on the
//!   request; when no header name is configured, throttling is always
//!   active.
//! - An "always-force" query parameter: when configured and present on the
//!   request, the corresponding decision is forced regardless of bucket
//!   state. Used for exercising 429/403 paths in tests against a live
//!   deployment without waiting out real bucket exhaustion.

use crate::bucketing::RequestContext;

/// Gates one throttler's admission decision.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    enable_if_header: Option<String>,
    force_param: Option<String>,
}

impl AdmissionGate {
    pub fn new(enable_if_header: Option<String>, force_param: Option<String>) -> Self {
        Self {
            enable_if_header,
            force_param,
        }
    }

    /// Whether this throttler should evaluate at all for this request.
    pub fn is_enabled(&self, ctx: &RequestContext) -> bool {
        match &self.enable_if_header {
            None => true,
            Some(header) => ctx.headers.contains_key(&header.to_ascii_lowercase()),
        }
    }

    /// Whether this request forces the throttler's decision, bypassing
    /// bucket state.
    pub fn is_forced(&self, ctx: &RequestContext) -> bool {
        match &self.force_param {
            None => false,
            Some(param) => ctx.query_params.contains_key(param),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    fn ctx(headers: &[(&str, &str)], query: &[(&str, &str)]) -> RequestContext {
        RequestContext {
            source_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            user_agent: "ua".to_string(),
            query_param: None,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            query_params: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn no_header_configured_means_always_enabled() {
        let gate = AdmissionGate::new(None, None);
        assert!(gate.is_enabled(&ctx(&[], &[])));
    }

    #[test]
    fn configured_header_absent_means_disabled() {
        let gate = AdmissionGate::new(Some("X-Throttle-Enable".to_string()), None);
        assert!(!gate.is_enabled(&ctx(&[], &[])));
    }

    #[test]
    fn configured_header_present_means_enabled() {
        let gate = AdmissionGate::new(Some("X-Throttle-Enable".to_string()), None);
        assert!(gate.is_enabled(&ctx(&[("X-Throttle-Enable", "1")], &[])));
    }

    #[test]
    fn force_param_present_forces_decision() {
        let gate = AdmissionGate::new(None, Some("forceThrottle".to_string()));
        assert!(gate.is_forced(&ctx(&[], &[("forceThrottle", "1")])));
        assert!(!gate.is_forced(&ctx(&[], &[])));
    }
}
