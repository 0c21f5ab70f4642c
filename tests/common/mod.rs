//! Shared fixtures for integration tests.
//!
//! In-process fakes for the telephony source, the analyzer and the CRM, plus
//! a harness that wires them into a real poller over an in-memory store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use wrapup::adapters::{
    Alert, AlertSink, AnalysisContext, Alerter, CrmClient, CrmReceipt, NoteRequest,
    RecordingSource, TicketRequest, TranscriptAnalyzer,
};
use wrapup::core::{
    CallMatcher, DispatchSettings, Dispatcher, IdentityResolver, Poller, PollerLimits,
    RecordingProcessor, VoidRules,
};
use wrapup::domain::{phone, Analysis, CallDirection, CrmCandidate, ExtractedEntities, Recording};
use wrapup::store::Store;

pub const TENANT: &str = "agency";

/// A transcript long enough to never trip the content rules
pub const BUSINESS_TRANSCRIPT: &str =
    "Hi, this is Dana calling about adding a second driver to my auto policy starting next month.";

// ── Recording builders ──

pub fn inbound(id: i64, from: &str, transcript: &str) -> Recording {
    Recording {
        id,
        direction: CallDirection::Inbound,
        from_number: from.to_string(),
        to_number: "8005550100".to_string(),
        extension: Some("101".to_string()),
        agent_name: Some("Sam".to_string()),
        started_at: Utc::now() - chrono::Duration::minutes(10),
        duration_secs: Some(180),
        can_transcribe: true,
        transcribed: true,
        transcript: Some(transcript.to_string()),
        summary: None,
    }
}

pub fn outbound(id: i64, to: &str, transcript: &str) -> Recording {
    Recording {
        direction: CallDirection::Outbound,
        from_number: "8005550100".to_string(),
        to_number: to.to_string(),
        ..inbound(id, to, transcript)
    }
}

/// Transcript not produced yet
pub fn pending_transcript(id: i64, from: &str) -> Recording {
    Recording {
        transcribed: false,
        transcript: None,
        ..inbound(id, from, "")
    }
}

pub fn candidate(crm_id: &str, name: &str, phone_number: &str) -> CrmCandidate {
    CrmCandidate {
        crm_id: crm_id.to_string(),
        name: Some(name.to_string()),
        phone: Some(phone_number.to_string()),
        email: None,
        confidence: 0.0,
    }
}

// ── Fakes ──

#[derive(Default)]
pub struct FakeSource {
    recordings: Mutex<Vec<Recording>>,
    failing: AtomicBool,
    pub fetches: AtomicUsize,
    pub last_since: Mutex<Option<i64>>,
}

impl FakeSource {
    pub fn push(&self, recording: Recording) {
        self.recordings.lock().unwrap().push(recording);
    }

    /// Replace a recording in place (e.g. once its transcript lands)
    pub fn replace(&self, recording: Recording) {
        let mut all = self.recordings.lock().unwrap();
        all.retain(|r| r.id != recording.id);
        all.push(recording);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordingSource for FakeSource {
    fn name(&self) -> &str {
        "fake-telephony"
    }

    async fn fetch_new_recordings(&self, since_id: i64) -> Result<Vec<Recording>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock().unwrap() = Some(since_id);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        let mut found: Vec<Recording> = self
            .recordings
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.id > since_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }
}

#[derive(Default)]
pub struct FakeAnalyzer {
    failing: AtomicBool,
    entities: Mutex<ExtractedEntities>,
    hangup: AtomicBool,

    /// Transcripts containing this marker take `slow_for` to analyze
    slow_marker: Mutex<Option<(String, Duration)>>,
    pub calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_entities(&self, entities: ExtractedEntities) {
        *self.entities.lock().unwrap() = entities;
    }

    pub fn set_hangup(&self, hangup: bool) {
        self.hangup.store(hangup, Ordering::SeqCst);
    }

    pub fn slow_when_contains(&self, marker: &str, delay: Duration) {
        *self.slow_marker.lock().unwrap() = Some((marker.to_string(), delay));
    }
}

#[async_trait]
impl TranscriptAnalyzer for FakeAnalyzer {
    fn name(&self) -> &str {
        "fake-analyzer"
    }

    async fn analyze(&self, transcript: &str, _context: &AnalysisContext) -> Result<Analysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .slow_marker
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(marker, _)| transcript.contains(marker.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("analyzer unavailable");
        }
        Ok(Analysis {
            summary: format!("Caller asked: {}", transcript.chars().take(60).collect::<String>()),
            request_type: Some("policy change".to_string()),
            entities: self.entities.lock().unwrap().clone(),
            is_hangup: self.hangup.load(Ordering::SeqCst),
            ..Default::default()
        })
    }
}

#[derive(Default)]
pub struct FakeCrm {
    customers: Mutex<Vec<CrmCandidate>>,
    failing: AtomicBool,
    failing_customers: Mutex<Vec<String>>,
    lookup_failing: AtomicBool,
    next_id: AtomicUsize,
    pub tickets: Mutex<Vec<TicketRequest>>,
    pub notes: Mutex<Vec<NoteRequest>>,
    pub lookups: AtomicUsize,
}

impl FakeCrm {
    pub fn add_customer(&self, customer: CrmCandidate) {
        self.customers.lock().unwrap().push(customer);
    }

    /// Ticket and note creation fail while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Ticket creation fails for this customer only
    pub fn fail_tickets_for(&self, customer_id: &str) {
        self.failing_customers.lock().unwrap().push(customer_id.to_string());
    }

    pub fn set_lookup_failing(&self, failing: bool) {
        self.lookup_failing.store(failing, Ordering::SeqCst);
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    pub fn note_count(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    fn receipt(&self, prefix: &str) -> CrmReceipt {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        CrmReceipt {
            id: format!("{}-{}", prefix, n),
        }
    }
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn create_ticket(&self, request: &TicketRequest) -> Result<CrmReceipt> {
        let customer_failing = self
            .failing_customers
            .lock()
            .unwrap()
            .contains(&request.customer_id);
        if self.failing.load(Ordering::SeqCst) || customer_failing {
            anyhow::bail!("CRM returned 503");
        }
        self.tickets.lock().unwrap().push(request.clone());
        Ok(self.receipt("TCK"))
    }

    async fn add_note(&self, request: &NoteRequest) -> Result<CrmReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("CRM returned 503");
        }
        self.notes.lock().unwrap().push(request.clone());
        Ok(self.receipt("NOTE"))
    }

    async fn find_customers_by_phone(&self, phone_number: &str) -> Result<Vec<CrmCandidate>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.lookup_failing.load(Ordering::SeqCst) {
            anyhow::bail!("CRM search unavailable");
        }
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.phone
                    .as_deref()
                    .map(|p| phone::same_number(p, phone_number))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Keeps every delivered alert
#[derive(Default)]
pub struct CollectedAlerts {
    pub alerts: Mutex<Vec<Alert>>,
}

impl CollectedAlerts {
    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts.lock().unwrap().iter().map(|a| a.title.clone()).collect()
    }
}

#[async_trait]
impl AlertSink for CollectedAlerts {
    fn name(&self) -> &str {
        "collected"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Accepts alerts and never returns
pub struct HungAlertSink;

#[async_trait]
impl AlertSink for HungAlertSink {
    fn name(&self) -> &str {
        "hung"
    }

    async fn deliver(&self, _alert: &Alert) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ── Harness ──

pub struct Harness {
    pub store: Arc<Store>,
    pub source: Arc<FakeSource>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub crm: Arc<FakeCrm>,
    pub alerts: Arc<CollectedAlerts>,
    pub limits: PollerLimits,
    pub rules: VoidRules,
    pub poller: Poller,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(PollerLimits::default(), VoidRules::default())
    }

    pub fn with(limits: PollerLimits, rules: VoidRules) -> Self {
        let store = Arc::new(Store::in_memory().unwrap());
        let source = Arc::new(FakeSource::default());
        let analyzer = Arc::new(FakeAnalyzer::default());
        let crm = Arc::new(FakeCrm::default());
        let alerts = Arc::new(CollectedAlerts::default());
        let alerter = Alerter::with_sink(alerts.clone(), limits.alert_timeout());
        let poller = build_poller(&store, &source, &analyzer, &crm, &limits, &rules, alerter);
        Self {
            store,
            source,
            analyzer,
            crm,
            alerts,
            limits,
            rules,
            poller,
        }
    }

    /// A second poller over the same store and fakes (a concurrent invocation)
    pub fn another_poller(&self) -> Poller {
        self.poller_with(Alerter::with_sink(self.alerts.clone(), self.limits.alert_timeout()))
    }

    /// A poller over the same store and fakes with its own alerter
    pub fn poller_with(&self, alerter: Alerter) -> Poller {
        build_poller(
            &self.store,
            &self.source,
            &self.analyzer,
            &self.crm,
            &self.limits,
            &self.rules,
            alerter,
        )
    }

    pub fn processor(&self) -> RecordingProcessor {
        build_processor(&self.store, &self.analyzer, &self.crm, &self.limits, &self.rules)
    }

    pub fn watermark(&self) -> i64 {
        self.store.ensure_cursor(TENANT).unwrap().last_recording_id
    }
}

fn build_processor(
    store: &Arc<Store>,
    analyzer: &Arc<FakeAnalyzer>,
    crm: &Arc<FakeCrm>,
    limits: &PollerLimits,
    rules: &VoidRules,
) -> RecordingProcessor {
    let crm_client: Arc<dyn CrmClient> = crm.clone();
    RecordingProcessor::new(
        store.clone(),
        analyzer.clone(),
        limits.analyzer_timeout(),
        CallMatcher::new(store.clone(), limits.match_window()),
        IdentityResolver::new(store.clone(), Some(crm_client.clone()), limits.crm_timeout()),
        rules.clone(),
        Dispatcher::new(
            store.clone(),
            crm_client,
            DispatchSettings {
                ticket_dedup: limits.ticket_dedup(),
                crm_timeout: limits.crm_timeout(),
            },
        ),
    )
}

fn build_poller(
    store: &Arc<Store>,
    source: &Arc<FakeSource>,
    analyzer: &Arc<FakeAnalyzer>,
    crm: &Arc<FakeCrm>,
    limits: &PollerLimits,
    rules: &VoidRules,
    alerter: Alerter,
) -> Poller {
    let processor = build_processor(store, analyzer, crm, limits, rules);
    Poller::new(
        TENANT,
        store.clone(),
        source.clone(),
        Arc::new(processor),
        Arc::new(alerter),
        limits.clone(),
    )
    .unwrap()
}
