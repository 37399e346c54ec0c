//! `ratchet tools` — list registered tools and their declared limits.

use std::sync::Arc;

use ratchet_core::tool::ToolRegistry;
use ratchet_tools::register_builtin_tools;

pub fn run() -> anyhow::Result<()> {
    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry);

    println!(
        "{:<14} {:<4} {:<12} {:>10} {:>9}  {}",
        "NAME", "VER", "SAFETY", "TIMEOUT", "RATE/MIN", "SUMMARY"
    );
    for name in registry.names() {
        let Some(spec) = registry.lookup(&name) else {
            continue;
        };
        println!(
            "{:<14} {:<4} {:<12} {:>8}ms {:>9}  {}",
            spec.name,
            spec.version,
            format!("{:?}", spec.safety).to_lowercase(),
            spec.timeout.as_millis(),
            spec.rate_limit_per_min,
            spec.summary,
        );
    }
    Ok(())
}
