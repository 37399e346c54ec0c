//! # ratchet-tools
//!
//! Built-in tool capabilities and their registry bootstrap. Every tool is
//! read-class and opted into safe mode; metadata (timeouts, rate limits,
//! argument schemas) is declared here at registration time.

pub mod fs;
pub mod system;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use ratchet_core::schema::{ArgSchema, PropertySpec};
use ratchet_core::tool::{ToolRegistry, ToolSpec};

pub use fs::{FsList, FsRead};
pub use system::SystemInfo;
pub use web::WebRead;

/// Register the built-in tools. Registration is an upsert, so calling
/// this more than once leaves the registry unchanged.
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(
        ToolSpec::new("system.info", Arc::new(SystemInfo))
            .summary("basic system info")
            .timeout(Duration::from_secs(1))
            .rate_limit_per_min(60)
            .allowed_in_safe_mode(true),
    );
    registry.register(
        ToolSpec::new("fs.list", Arc::new(FsList::new()))
            .summary("list directory")
            .timeout(Duration::from_secs(1))
            .rate_limit_per_min(60)
            .allowed_in_safe_mode(true)
            .schema(
                ArgSchema::new()
                    .required("path")
                    .property("path", PropertySpec::string())
                    .property("recursive", PropertySpec::boolean()),
            ),
    );
    registry.register(
        ToolSpec::new("fs.read", Arc::new(FsRead::new()))
            .summary("read file")
            .timeout(Duration::from_secs(1))
            .rate_limit_per_min(60)
            .allowed_in_safe_mode(true)
            .schema(
                ArgSchema::new()
                    .required("path")
                    .property("path", PropertySpec::string())
                    .property("max_bytes", PropertySpec::integer().with_minimum(1.0)),
            ),
    );
    registry.register(
        ToolSpec::new("web.read", Arc::new(WebRead::new()))
            .summary("read web page")
            .timeout(Duration::from_secs(5))
            .rate_limit_per_min(30)
            .allowed_in_safe_mode(true)
            .schema(
                ArgSchema::new()
                    .required("url")
                    .property("url", PropertySpec::string()),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_builtins() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        assert_eq!(
            registry.names(),
            vec!["fs.list", "fs.read", "system.info", "web.read"]
        );
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        register_builtin_tools(&registry);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn builtin_metadata() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);

        let info = registry.lookup("system.info").unwrap();
        assert_eq!(info.timeout, Duration::from_secs(1));
        assert_eq!(info.rate_limit_per_min, 60);
        assert!(info.allowed_in_safe_mode);

        let web = registry.lookup("web.read").unwrap();
        assert_eq!(web.timeout, Duration::from_secs(5));
        assert_eq!(web.rate_limit_per_min, 30);
        assert!(web.schema.is_some());
    }
}
