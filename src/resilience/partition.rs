//! Partition key derivation.
//!
//! Rate-limit windows are scoped by a partition key. The key comes from who is
//! calling, where they connect from, which host they addressed, or the policy
//! itself, depending on the configured strategy.

use std::net::IpAddr;
use serde::{Deserialize, Serialize};

/// Facts about a call that a partition key can be derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext<'a> {
    /// Authenticated caller name, if any.
    pub caller: Option<&'a str>,
    /// Peer address of the connection, when known.
    pub client_ip: Option<IpAddr>,
    /// Host the caller addressed.
    pub host: Option<&'a str>,
    /// Policy or target name guarding the call.
    pub policy: &'a str,
}

/// How to derive a partition key from a [`CallContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Caller identity; anonymous callers fall back to their client IP, then
    /// the host.
    #[default]
    CallerIdentity,
    /// The connection's peer IP address.
    ClientIp,
    /// The addressed host.
    Host,
    /// One shared bucket per policy.
    PolicyName,
    /// One bucket for everything.
    Global,
}

const ANONYMOUS: &str = "anonymous";

impl PartitionStrategy {
    pub fn derive(&self, ctx: &CallContext<'_>) -> String {
        let ip = ctx.client_ip.map(|ip| ip.to_string());
        let key = match self {
            PartitionStrategy::CallerIdentity => ctx.caller.filter(|c| !c.is_empty()).or(ip.as_deref()).or(ctx.host),
            PartitionStrategy::ClientIp => ip.as_deref(),
            PartitionStrategy::Host => ctx.host,
            PartitionStrategy::PolicyName => Some(ctx.policy),
            PartitionStrategy::Global => return "global".to_string(),
        };
        key.filter(|k| !k.is_empty())
            .map(|k| k.to_ascii_lowercase())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_identity_falls_back_to_host() {
        let strategy = PartitionStrategy::CallerIdentity;
        let named = CallContext { caller: Some("alice"), host: Some("api.local"), policy: "web", ..Default::default() };
        let anonymous = CallContext { caller: None, host: Some("API.local"), policy: "web", ..Default::default() };

        assert_eq!(strategy.derive(&named), "alice");
        assert_eq!(strategy.derive(&anonymous), "api.local");
        assert_eq!(strategy.derive(&CallContext::default()), "anonymous");
    }

    #[test]
    fn test_policy_and_global_ignore_caller() {
        let ctx = CallContext { caller: Some("alice"), host: Some("h"), policy: "Api", ..Default::default() };
        assert_eq!(PartitionStrategy::PolicyName.derive(&ctx), "api");
        assert_eq!(PartitionStrategy::Global.derive(&ctx), "global");
        assert_eq!(PartitionStrategy::Host.derive(&ctx), "h");
    }

    #[test]
    fn test_client_ip_ignores_spoofable_headers() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let ctx = CallContext { caller: None, client_ip: Some(ip), host: Some("spoofed.example"), policy: "web" };

        assert_eq!(PartitionStrategy::ClientIp.derive(&ctx), "203.0.113.7");
        assert_eq!(PartitionStrategy::CallerIdentity.derive(&ctx), "203.0.113.7");

        let unknown = CallContext { client_ip: None, ..ctx };
        assert_eq!(PartitionStrategy::ClientIp.derive(&unknown), "anonymous");
    }
}
