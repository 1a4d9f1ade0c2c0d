//! Process entry point: loads runtime configuration, builds the
//! composition root, and drives one simulated sync job end to end.
//!
//! This binary stands in for the real deployment's HTTP API + Temporal
//! worker pair (both out of scope here): it registers a demo
//! organization and sync, then runs a single job through
//! [`worker::WorkflowWorker`] so every wired collaborator — cache, rate
//! limiter, secrets, event bus, usage guardrail, sync orchestrator — is
//! exercised on one real path.

mod container;
mod worker;

use std::sync::Arc;

use airweave_cache::ContextCache;
use airweave_core::{
    DestinationRole, Entity, EntityShape, ExecutionConfig, Organization, RuntimeConfig, Sync, SyncConnection, SyncJob,
    SystemMetadata,
};
use airweave_error::CoreError;
use airweave_sync::{RawEntity, Source, SyncCursor};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use container::Container;
use worker::WorkflowWorker;

fn load_config() -> RuntimeConfig {
    let raw = std::env::var("AIRWEAVE_CONFIG_PATH")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok());

    let config = match raw {
        Some(raw) => RuntimeConfig::from_toml(&raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "invalid config file; falling back to defaults");
            RuntimeConfig::default()
        }),
        None => RuntimeConfig::default(),
    };

    config.with_env_overrides().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "invalid environment override; ignoring");
        RuntimeConfig::default()
    })
}

fn credential_key() -> [u8; 32] {
    match std::env::var("AIRWEAVE_CREDENTIAL_KEY") {
        Ok(hex_key) => {
            let mut key = [0u8; 32];
            if let Ok(bytes) = hex_decode(&hex_key) {
                if bytes.len() == 32 {
                    key.copy_from_slice(&bytes);
                    return key;
                }
            }
            tracing::warn!("AIRWEAVE_CREDENTIAL_KEY is not 32 bytes of hex; generating an ephemeral key instead");
            random_key()
        }
        Err(_) => random_key(),
    }
}

fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn hex_decode(input: &str) -> Result<Vec<u8>, std::num::ParseIntError> {
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..(i + 2).min(input.len())], 16))
        .collect()
}

/// A fixed-batch demo source standing in for a real connector (out of
/// scope here): delivers one chunk entity, then signals exhaustion.
struct DemoSource {
    delivered: bool,
    sync_id: Uuid,
    collection_id: Uuid,
}

#[async_trait]
impl Source for DemoSource {
    async fn next_batch(
        &mut self,
        _cursor: Option<&SyncCursor>,
    ) -> Result<(Vec<RawEntity>, Option<SyncCursor>, bool), CoreError> {
        if self.delivered {
            return Ok((Vec::new(), None, true));
        }
        self.delivered = true;
        let entity = Entity::new(
            "demo-entity-1",
            "demo-definition",
            "demo-hash-1",
            EntityShape::Chunk {
                text: "hello from the demo source".to_string(),
            },
            Utc::now(),
            SystemMetadata {
                sync_id: self.sync_id,
                collection_id: self.collection_id,
                shape_tag: "chunk",
                deleted: false,
            },
        );
        let cursor = SyncCursor::encode(&serde_json::json!({ "offset": 1 }));
        Ok((vec![RawEntity::Content(entity)], Some(cursor), false))
    }

    fn is_full_sync(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = load_config();
    tracing::info!(?config, "loaded runtime configuration");

    let container = Arc::new(Container::build(config, credential_key()).await.map_err(anyhow::Error::msg)?);

    let organization_id = Uuid::new_v4();
    let organization = Organization::new(organization_id, "demo-organization").with_plan(airweave_core::BillingPlan {
        rate_limit_quota: container.config.default_rate_limit_quota,
        rate_limit_window_secs: container.config.default_rate_limit_window_secs,
        usage_limits: std::collections::HashMap::new(),
    });
    container.organizations.insert(organization.clone());
    container.context_cache.set_organization(organization.clone()).await;

    if let Err(err) = container.rate_limiter.check(&organization) {
        tracing::error!(error = %err, "demo run rejected by the rate limiter");
        return Err(anyhow::Error::msg(err.to_string()));
    }

    let demo_credential = container.secrets.encrypt(b"demo-access-token")?;
    let recovered = container.secrets.decrypt(&demo_credential)?;
    tracing::debug!(recovered_len = recovered.len(), "demo credential round-tripped through secrets manager");

    let sync_id = Uuid::new_v4();
    let collection_id = Uuid::new_v4();
    let source_connection_id = Uuid::new_v4();
    let mut sync = Sync::new(
        sync_id,
        organization_id,
        collection_id,
        SyncConnection::source(source_connection_id, "demo-source", Utc::now()),
    );
    sync.add_destination_slot(SyncConnection::destination(
        Uuid::new_v4(),
        "demo-destination",
        DestinationRole::Active,
        Utc::now(),
    ))?;

    let mut job = SyncJob::new(Uuid::new_v4(), sync_id, organization_id, ExecutionConfig::metered(), Utc::now());

    let worker = WorkflowWorker::new(container);
    let source = Box::new(DemoSource {
        delivered: false,
        sync_id,
        collection_id,
    });

    worker
        .run_source_connection_workflow(&mut job, &sync, source_connection_id, source)
        .await?;

    tracing::info!(status = ?job.status(), "demo sync job finished");
    Ok(())
}
