//! `system.info` — basic host facts for the model to orient itself.

use async_trait::async_trait;
use ratchet_core::{Capability, Envelope};
use serde_json::{Map, Value, json};

pub struct SystemInfo;

#[async_trait]
impl Capability for SystemInfo {
    async fn invoke(&self, _args: Map<String, Value>) -> Envelope {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Envelope::ok(json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
            "cpus": cpus,
        }))
    }
}
