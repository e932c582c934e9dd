//! Shared types used across the reverse-call engine and its transports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identity of a registered processor (event handler, filter, projection).
///
/// Stable across connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessorId(pub Uuid);

impl ProcessorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessorId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Server-assigned identity of a single request, echoed on its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one client "head", fresh for every connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeadId(pub Uuid);

impl HeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HeadId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Tenant used when the calling application has not chosen one.
    pub fn unknown() -> Self {
        Self(Uuid::nil())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MicroserviceId(pub Uuid);

impl MicroserviceId {
    pub fn unknown() -> Self {
        Self(Uuid::nil())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tenant, correlation and culture metadata travelling with every call.
///
/// Supplied by the calling application and round-tripped unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub microservice_id: MicroserviceId,
    pub tenant_id: TenantId,
    pub version: Version,
    pub environment: String,
    pub correlation_id: CorrelationId,
    pub culture: String,
}

impl ExecutionContext {
    /// A context for the given tenant with a fresh correlation id.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            ..Self::default()
        }
    }

    /// Copy of this context carrying a new correlation id.
    pub fn with_correlation(&self, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            ..self.clone()
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            microservice_id: MicroserviceId::unknown(),
            tenant_id: TenantId::unknown(),
            version: Version::default(),
            environment: "Development".to_string(),
            correlation_id: CorrelationId::new(),
            culture: "en-US".to_string(),
        }
    }
}

/// Identifier of a failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureId(pub Uuid);

impl FailureId {
    pub fn unknown() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote-reported failure.
///
/// Carried by connect responses and, by convention of the owning processor,
/// embedded inside response payloads for per-item failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub id: FailureId,
    pub reason: String,
}

impl Failure {
    pub fn new(id: FailureId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }

    /// A failure with the unknown failure id.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(FailureId::unknown(), reason)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.id)
    }
}

/// Keep-alive probe sent by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping;

/// Answer to a [`Ping`], sent by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong;

/// Context attached to the connect arguments of every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentsContext {
    pub head_id: HeadId,
    /// Interval at which the server should ping this client.
    pub ping_interval: Duration,
    pub execution_context: ExecutionContext,
}

/// Context the server attaches to each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub call_id: CallId,
    pub execution_context: ExecutionContext,
}

/// Context the client attaches to each response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseContext {
    pub call_id: CallId,
    pub execution_context: ExecutionContext,
}

impl From<RequestContext> for ResponseContext {
    fn from(context: RequestContext) -> Self {
        Self {
            call_id: context.call_id,
            execution_context: context.execution_context,
        }
    }
}

/// Ordering domain for requests.
///
/// Requests sharing a key are handled and answered in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic version used for SDK, runtime and contracts versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    pub prerelease: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
            prerelease: String::new(),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.is_prerelease() {
            write!(f, "-{}", self.prerelease)?;
            if self.build > 0 {
                write!(f, ".{}", self.build)?;
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version string {0:?}")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses `major.minor.patch[-prerelease[.build]]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError(s.to_string());
        let (core, prerelease) = match s.trim().split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (s.trim(), None),
        };

        let numbers = core
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let &[major, minor, patch] = &numbers[..] else {
            return Err(invalid());
        };

        let mut version = Version::new(major, minor, patch);
        if let Some(pre) = prerelease {
            if pre.is_empty() {
                return Err(invalid());
            }
            match pre.rsplit_once('.') {
                Some((label, build)) if build.parse::<u32>().is_ok() => {
                    version.prerelease = label.to_string();
                    version.build = build.parse().map_err(|_| invalid())?;
                }
                _ => version.prerelease = pre.to_string(),
            }
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_release() {
        let v: Version = "7.4.1".parse().unwrap();
        assert_eq!(v, Version::new(7, 4, 1));
        assert!(!v.is_prerelease());
        assert_eq!(v.to_string(), "7.4.1");
    }

    #[test]
    fn test_version_parse_prerelease_with_build() {
        let v: Version = "2.0.0-alpha.3".parse().unwrap();
        assert_eq!(v.major, 2);
        assert_eq!(v.prerelease, "alpha");
        assert_eq!(v.build, 3);
        assert_eq!(v.to_string(), "2.0.0-alpha.3");
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("1.2.3-".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::unknown("processor already registered");
        assert_eq!(
            failure.to_string(),
            "processor already registered (00000000-0000-0000-0000-000000000000)"
        );
    }

    #[test]
    fn test_response_context_from_request_context() {
        let request = RequestContext {
            call_id: CallId::new(),
            execution_context: ExecutionContext::default(),
        };
        let response = ResponseContext::from(request.clone());
        assert_eq!(response.call_id, request.call_id);
        assert_eq!(response.execution_context, request.execution_context);
    }

    #[test]
    fn test_execution_context_with_correlation_keeps_tenant() {
        let tenant = TenantId(Uuid::new_v4());
        let ctx = ExecutionContext::for_tenant(tenant);
        let correlation = CorrelationId::new();
        let next = ctx.with_correlation(correlation);
        assert_eq!(next.tenant_id, tenant);
        assert_eq!(next.correlation_id, correlation);
        assert_ne!(ctx.correlation_id, next.correlation_id);
    }

    #[test]
    fn test_processor_id_parse() {
        let id: ProcessorId = "9bc05ac9-c4ee-4a15-bfe4-a13fd97b7341".parse().unwrap();
        assert_eq!(id.to_string(), "9bc05ac9-c4ee-4a15-bfe4-a13fd97b7341");
    }
}
