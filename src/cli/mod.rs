//! Command-line interface for wrapup.
//!
//! Provides commands for running poll batches (once or on a cadence),
//! inspecting health, the review queue and the retry queue, serving the
//! health endpoint, and operator overrides.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::adapters::{analyzer, Alerter, CrmClient, HttpCrmClient, HttpRecordingSource};
use crate::config::{self, ResolvedConfig};
use crate::domain::MergeSource;
use crate::core::{
    cleanup::sweep_stale_calls, CallMatcher, DispatchSettings, Dispatcher, HealthReport,
    IdentityResolver, MergeCoordinator, MergeOutcome, Poller, RecordingProcessor, WrapupManager,
};
use crate::store::Store;

/// wrapup - call recording ingestion and wrap-up pipeline
#[derive(Parser, Debug)]
#[command(name = "wrapup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tenant to operate on (overrides config)
    #[arg(long, global = true, env = "WRAPUP_TENANT")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one poll batch
    Poll,

    /// Run poll batches on a fixed cadence until interrupted
    Watch {
        /// Seconds between batch starts
        #[arg(short, long, default_value = "120")]
        interval: u64,
    },

    /// Show poller health for the tenant
    Health,

    /// Serve the HTTP health endpoint
    Serve {
        /// Address to bind to (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Close stale call sessions and expire overdue merges
    Cleanup,

    /// List drafts awaiting human review
    Drafts {
        /// Maximum number of drafts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List retry queue entries
    Retries {
        /// Filter by status (e.g. pending)
        #[arg(short, long, default_value = "pending")]
        status: String,

        /// Show every status
        #[arg(long)]
        all: bool,
    },

    /// Record one half of an after-hours email + voicemail pair
    Merge {
        /// Which half arrived (email or voicemail)
        source: String,

        /// Caller phone number
        phone: String,

        /// JSON payload stored with the half
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Clear the tenant's processing lock
    Unlock,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let tenant = self.tenant.clone().unwrap_or_else(|| cfg.tenant.clone());

        match self.command {
            Commands::Poll => {
                let poller = build_poller(cfg, &tenant, open_store(cfg)?)?;
                let report = poller.run_batch().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Commands::Watch { interval } => {
                let poller = build_poller(cfg, &tenant, open_store(cfg)?)?;
                watch(&poller, Duration::from_secs(interval)).await
            }
            Commands::Health => {
                let store = open_store(cfg)?;
                let report = HealthReport::collect(&store, &tenant, &cfg.limits, Utc::now())?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Commands::Serve { bind, port } => {
                let store = open_store(cfg)?;
                let bind = bind.unwrap_or_else(|| cfg.serve.bind.clone());
                let port = port.unwrap_or(cfg.serve.port);
                crate::serve::serve(store, cfg.limits.clone(), &bind, port).await
            }
            Commands::Cleanup => cleanup(cfg, &tenant),
            Commands::Drafts { limit } => list_drafts(cfg, &tenant, limit),
            Commands::Retries { status, all } => {
                let status = if all { None } else { Some(status.as_str()) };
                list_retries(cfg, &tenant, status)
            }
            Commands::Merge {
                source,
                phone,
                payload,
            } => offer_merge(cfg, &tenant, &source, &phone, &payload),
            Commands::Unlock => {
                let store = open_store(cfg)?;
                store.ensure_cursor(&tenant)?;
                store.set_lock(&tenant, None)?;
                warn!(tenant = %tenant, "Processing lock cleared by operator");
                println!("Lock cleared for tenant {}", tenant);
                Ok(())
            }
            Commands::Config => show_config(cfg, &tenant),
        }
    }
}

fn open_store(cfg: &ResolvedConfig) -> Result<Arc<Store>> {
    Ok(Arc::new(Store::open(&cfg.database)?))
}

/// Wire adapters, processor and poller for one tenant from configuration
pub fn build_poller(cfg: &ResolvedConfig, tenant: &str, store: Arc<Store>) -> Result<Poller> {
    let limits = &cfg.limits;

    let telephony_url = cfg
        .telephony
        .base_url
        .as_deref()
        .context("telephony.base_url is not configured")?;
    let telephony_key = cfg
        .secrets
        .telephony_api_key
        .as_deref()
        .context("TELEPHONY_API_KEY is not set")?;
    let source = Arc::new(HttpRecordingSource::new(
        telephony_url,
        telephony_key,
        limits.fetch_timeout(),
    )?);

    let crm_url = cfg
        .crm
        .base_url
        .as_deref()
        .context("crm.base_url is not configured")?;
    let (username, password) = match (&cfg.secrets.crm_username, &cfg.secrets.crm_password) {
        (Some(u), Some(p)) => (u.as_str(), p.as_str()),
        _ => anyhow::bail!("CRM_USERNAME and CRM_PASSWORD must be set"),
    };
    let crm: Arc<dyn CrmClient> = Arc::new(HttpCrmClient::new(
        crm_url,
        username,
        password,
        limits.crm_timeout(),
    )?);

    let analyzer = analyzer::from_settings(
        &cfg.analyzer.base_url,
        &cfg.analyzer.model,
        cfg.secrets.analyzer_api_key.as_deref(),
        limits.analyzer_timeout(),
    )?;

    let alerter = match &cfg.alert.webhook_url {
        Some(url) => Alerter::with_webhook(
            url.clone(),
            cfg.secrets.alert_webhook_token.clone(),
            limits.alert_timeout(),
        )?,
        None => Alerter::log_only(),
    };

    let processor = RecordingProcessor::new(
        store.clone(),
        analyzer,
        limits.analyzer_timeout(),
        CallMatcher::new(store.clone(), limits.match_window()),
        IdentityResolver::new(store.clone(), Some(crm.clone()), limits.crm_timeout()),
        cfg.auto_void.clone(),
        Dispatcher::new(
            store.clone(),
            crm,
            DispatchSettings {
                ticket_dedup: limits.ticket_dedup(),
                crm_timeout: limits.crm_timeout(),
            },
        ),
    );

    Ok(Poller::new(
        tenant,
        store,
        source,
        Arc::new(processor),
        Arc::new(alerter),
        limits.clone(),
    )?)
}

/// Fixed-cadence loop; overlapping invocations are handled by the lock
async fn watch(poller: &Poller, every: Duration) -> Result<()> {
    info!(tenant = poller.tenant(), interval_secs = every.as_secs(), "Starting poll loop");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match poller.run_batch().await {
                    Ok(report) if report.skipped => {
                        info!(reason = ?report.skip_reason, "Batch skipped");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Batch failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping poll loop");
                return Ok(());
            }
        }
    }
}

fn cleanup(cfg: &ResolvedConfig, tenant: &str) -> Result<()> {
    let store = open_store(cfg)?;
    let now = Utc::now();
    let closed = sweep_stale_calls(
        &store,
        tenant,
        cfg.limits.stale_call(),
        cfg.limits.stale_call_batch,
        now,
    )?;
    let expired = MergeCoordinator::new(store.clone(), cfg.limits.merge_window())
        .expire_overdue(tenant, now)?;

    println!("Closed {} stale call session(s)", closed);
    println!("Expired {} unpaired merge record(s)", expired.len());
    Ok(())
}

fn offer_merge(cfg: &ResolvedConfig, tenant: &str, source: &str, phone: &str, payload: &str) -> Result<()> {
    let source: MergeSource = source.parse()?;
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Merge payload is not valid JSON")?;
    let store = open_store(cfg)?;

    match MergeCoordinator::new(store, cfg.limits.merge_window()).offer(tenant, phone, source, &payload)? {
        MergeOutcome::Waiting(record) => println!(
            "Stored {} half {}; waiting for the {} until {}",
            record.source.as_str(),
            record.id,
            source.counterpart().as_str(),
            record.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        MergeOutcome::Paired { first, second } => println!(
            "Paired {} {} with {} {}",
            first.source.as_str(),
            first.id,
            second.source.as_str(),
            second.id
        ),
    }
    Ok(())
}

fn list_drafts(cfg: &ResolvedConfig, tenant: &str, limit: usize) -> Result<()> {
    let store = open_store(cfg)?;
    let drafts = WrapupManager::new(store.clone()).pending(tenant, limit)?;

    if drafts.is_empty() {
        println!("No drafts awaiting review.");
        return Ok(());
    }

    println!("{:<36}  {:<8}  {:<16}  {:<20}  SUMMARY", "DRAFT", "DIR", "MATCH", "CUSTOMER");
    println!("{}", "-".repeat(110));
    for draft in &drafts {
        let summary = draft.summary.as_deref().unwrap_or("-");
        let summary: String = summary.chars().take(40).collect();
        println!(
            "{:<36}  {:<8}  {:<16}  {:<20}  {}",
            draft.id,
            draft.direction.to_string(),
            draft.match_status.as_str(),
            draft
                .customer_name
                .as_deref()
                .or(draft.customer_phone.as_deref())
                .unwrap_or("-"),
            summary
        );
        for suggestion in store.list_suggestions(&draft.id)? {
            println!(
                "    candidate {} {} ({:.0}%)",
                suggestion.crm_customer_id,
                suggestion.name.as_deref().unwrap_or(""),
                suggestion.confidence * 100.0
            );
        }
    }
    println!();
    println!("Total pending: {}", store.count_pending_drafts(tenant)?);
    Ok(())
}

fn list_retries(cfg: &ResolvedConfig, tenant: &str, status: Option<&str>) -> Result<()> {
    let store = open_store(cfg)?;
    let entries = store.list_retries(tenant, status)?;

    if entries.is_empty() {
        println!("Retry queue is empty.");
        return Ok(());
    }

    println!("{:<6}  {:<12}  {:<8}  {:<8}  {:<20}  LAST ERROR", "ID", "OPERATION", "STATUS", "ATTEMPTS", "UPDATED");
    println!("{}", "-".repeat(100));
    for entry in &entries {
        println!(
            "{:<6}  {:<12}  {:<8}  {:<8}  {:<20}  {}",
            entry.id,
            entry.operation.as_str(),
            entry.status,
            entry.attempts,
            entry.updated_at.format("%Y-%m-%d %H:%M:%S"),
            entry.last_error
        );
    }
    Ok(())
}

fn show_config(cfg: &ResolvedConfig, tenant: &str) -> Result<()> {
    let none = || "(not set)".to_string();

    println!("Wrapup configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Tenant:      {}", tenant);
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!();
    println!("Endpoints:");
    println!("  Telephony: {}", cfg.telephony.base_url.clone().unwrap_or_else(none));
    println!("  CRM:       {}", cfg.crm.base_url.clone().unwrap_or_else(none));
    println!("  Analyzer:  {} ({})", cfg.analyzer.base_url, cfg.analyzer.model);
    println!("  Alerts:    {}", cfg.alert.webhook_url.clone().unwrap_or_else(none));
    println!();
    println!("Credentials: {:?}", cfg.secrets);
    println!();
    println!("Limits:");
    println!("{}", serde_yaml::to_string(&cfg.limits)?);
    println!("Auto-void:");
    println!("{}", serde_yaml::to_string(&cfg.auto_void)?);

    Ok(())
}
