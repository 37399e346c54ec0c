//! Tool capability trait, specs, and the process-wide registry.
//!
//! A tool is a named capability with declared metadata: safety class,
//! per-call timeout, per-minute rate limit, safe-mode eligibility, an
//! optional argument schema, and a retry policy. Registration happens once
//! at startup; lookups are read-only thereafter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::envelope::Envelope;
use crate::schema::ArgSchema;

/// A request to execute a tool, as extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name (case-folded by the parser)
    pub name: String,

    /// Argument object
    #[serde(default)]
    pub args: Map<String, Value>,

    /// Correlation id (the model's, or a generated one)
    #[serde(default)]
    pub id: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            id: id.into(),
        }
    }
}

/// Safety classification of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyClass {
    /// Observes but never mutates
    Read,
    /// Mutates state outside the runtime; blocked entirely in safe mode
    Destructive,
}

/// The capability behind a tool name.
///
/// Every adapter normalizes its native result into the [`Envelope`] union
/// exactly once, here — the dispatcher never branches on result shape.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, args: Map<String, Value>) -> Envelope;
}

/// Registry entry: capability plus declared metadata. Immutable after
/// registration.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub version: String,
    pub summary: String,
    pub safety: SafetyClass,
    pub timeout: Duration,
    /// 0 disables rate limiting
    pub rate_limit_per_min: u32,
    pub allowed_in_safe_mode: bool,
    pub schema: Option<ArgSchema>,
    /// Extra attempts after the first, on `error` outcomes only
    pub retry_count: u32,
    pub capability: Arc<dyn Capability>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        Self {
            name: name.into(),
            version: "1".into(),
            summary: String::new(),
            safety: SafetyClass::Read,
            timeout: Duration::from_secs(5),
            rate_limit_per_min: 0,
            allowed_in_safe_mode: false,
            schema: None,
            retry_count: 0,
            capability,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn safety(mut self, safety: SafetyClass) -> Self {
        self.safety = safety;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limit_per_min(mut self, rate: u32) -> Self {
        self.rate_limit_per_min = rate;
        self
    }

    pub fn allowed_in_safe_mode(mut self, allowed: bool) -> Self {
        self.allowed_in_safe_mode = allowed;
        self
    }

    pub fn schema(mut self, schema: ArgSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("safety", &self.safety)
            .field("timeout", &self.timeout)
            .field("rate_limit_per_min", &self.rate_limit_per_min)
            .field("allowed_in_safe_mode", &self.allowed_in_safe_mode)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

/// True iff safe mode forbids this tool outright (destructive class).
pub fn violates_policy(spec: &ToolSpec, safe_mode: bool) -> bool {
    safe_mode && spec.safety == SafetyClass::Destructive
}

/// Process-wide catalog mapping tool names to specs.
///
/// Constructed once at startup and passed by reference to the dispatcher
/// and the conversation loop. Registration is an upsert: re-registering a
/// name replaces the entry without growing the catalog.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolSpec>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a tool by name.
    pub fn register(&self, spec: ToolSpec) {
        let name = spec.name.clone();
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .insert(name, Arc::new(spec));
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Make `alias` resolve to the same spec as `name`. Returns false when
    /// `name` is not registered.
    pub fn alias(&self, name: &str, alias: &str) -> bool {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        match tools.get(name).cloned() {
            Some(spec) => {
                tools.insert(alias.to_string(), spec);
                true
            }
            None => false,
        }
    }

    /// Remove every entry. Test isolation only.
    pub fn clear(&self) {
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered tool names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        async fn invoke(&self, args: Map<String, Value>) -> Envelope {
            Envelope::ok(Value::Object(args))
        }
    }

    fn echo_spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, Arc::new(EchoCapability))
            .summary("echo args back")
            .allowed_in_safe_mode(true)
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(echo_spec("echo"));
        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("nonexistent").is_none());
    }

    #[test]
    fn register_is_upsert() {
        let registry = ToolRegistry::new();
        registry.register(echo_spec("echo"));
        registry.register(echo_spec("echo").version("2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("echo").unwrap().version, "2");
    }

    #[test]
    fn alias_resolves_to_same_spec() {
        let registry = ToolRegistry::new();
        registry.register(echo_spec("echo"));
        assert!(registry.alias("echo", "repeat"));
        assert!(!registry.alias("missing", "other"));
        let a = registry.lookup("echo").unwrap();
        let b = registry.lookup("repeat").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn clear_resets() {
        let registry = ToolRegistry::new();
        registry.register(echo_spec("echo"));
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn destructive_tools_violate_safe_mode_policy() {
        let read = echo_spec("reader");
        let destructive = echo_spec("wiper").safety(SafetyClass::Destructive);
        assert!(!violates_policy(&read, true));
        assert!(violates_policy(&destructive, true));
        assert!(!violates_policy(&destructive, false));
    }

    #[tokio::test]
    async fn capability_returns_envelope() {
        let cap = EchoCapability;
        let args = json!({"text": "hello"}).as_object().unwrap().clone();
        let env = cap.invoke(args).await;
        assert!(env.is_ok());
    }
}
