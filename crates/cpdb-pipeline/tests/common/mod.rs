#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpdb_core::{LogOutcome, ProcessingLogEntry, Profile, ProfileSeed, ScoreBreakdown, Stage};
use cpdb_pipeline::{
    CollaboratorError, Collaborators, DiscoveryQuery, MemoryProfileStore, PipelineSettings,
    ProfileAssessor, ProfileProcessor, ProfileScraper, RetryPolicy, StageTimeouts, UrlDiscoverer,
    UrlNormalizer,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const PROFILE_HOST: &str = "profile-host.example";

/// Tracks how many collaborator calls are running at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }
}

struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub enum Behavior<T> {
    Return(T),
    Fail(CollaboratorError),
    /// Never answers; only the stage timeout ends the call.
    Hang,
    Panic,
    Delay(Duration, T),
}

/// A collaborator that plays back a script, then repeats a fallback.
pub struct Scripted<T> {
    script: Mutex<VecDeque<Behavior<T>>>,
    fallback: Behavior<T>,
    calls: AtomicUsize,
    gauge: Arc<Gauge>,
}

impl<T: Clone + Send + Sync> Scripted<T> {
    pub fn always(behavior: Behavior<T>) -> Self {
        Self::script(Vec::new(), behavior)
    }

    pub fn script(script: Vec<Behavior<T>>, fallback: Behavior<T>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<T, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let _guard = self.gauge.enter();
        match behavior {
            Behavior::Return(value) => Ok(value),
            Behavior::Fail(err) => Err(err),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("collaborator blew up"),
            Behavior::Delay(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl UrlDiscoverer for Scripted<Option<String>> {
    async fn discover(&self, _query: &DiscoveryQuery) -> Result<Option<String>, CollaboratorError> {
        self.run().await
    }
}

#[async_trait]
impl ProfileScraper for Scripted<Value> {
    async fn scrape(&self, _canonical_url: &str) -> Result<Value, CollaboratorError> {
        self.run().await
    }
}

#[async_trait]
impl ProfileAssessor for Scripted<ScoreBreakdown> {
    async fn assess(&self, _profile_data: &Value) -> Result<ScoreBreakdown, CollaboratorError> {
        self.run().await
    }
}

/// Discovery that answers per candidate name.
pub struct ByName {
    answers: HashMap<String, Scripted<Option<String>>>,
    fallback: Scripted<Option<String>>,
}

impl ByName {
    pub fn new(fallback: Behavior<Option<String>>) -> Self {
        Self {
            answers: HashMap::new(),
            fallback: Scripted::always(fallback),
        }
    }

    pub fn with(mut self, name: &str, behavior: Behavior<Option<String>>) -> Self {
        self.answers
            .insert(name.to_string(), Scripted::always(behavior));
        self
    }
}

#[async_trait]
impl UrlDiscoverer for ByName {
    async fn discover(&self, query: &DiscoveryQuery) -> Result<Option<String>, CollaboratorError> {
        match self.answers.get(&query.name) {
            Some(scripted) => scripted.run().await,
            None => self.fallback.run().await,
        }
    }
}

pub fn url_for(slug: &str) -> Behavior<Option<String>> {
    Behavior::Return(Some(format!("https://{PROFILE_HOST}/in/{slug}")))
}

pub fn scraped() -> Value {
    json!({
        "basic_info": {"name": "A. Liang", "headline": "Staff Engineer"},
        "experience": [{"title": "Staff Engineer", "company": "Example Labs"}],
        "education": [],
        "skills": ["rust", "postgres"],
    })
}

pub fn breakdown(score: f64) -> ScoreBreakdown {
    ScoreBreakdown {
        overall_score: score,
        criteria: BTreeMap::from([("seniority".to_string(), score)]),
        evidence: json!({"seniority": "staff title"}),
        summary: None,
    }
}

pub fn transient(message: &str) -> CollaboratorError {
    CollaboratorError::transient(message)
}

pub fn permanent(message: &str) -> CollaboratorError {
    CollaboratorError::permanent(message)
}

pub fn settings(retry: RetryPolicy) -> PipelineSettings {
    PipelineSettings {
        timeouts: StageTimeouts {
            discovery: Duration::from_secs(30),
            scraping: Duration::from_secs(300),
            assessment: Duration::from_secs(60),
        },
        retry,
        normalizer: UrlNormalizer::new(PROFILE_HOST),
    }
}

pub fn retry(max_attempts: u32, max_timeout_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, max_timeout_attempts, Duration::from_secs(1))
}

pub struct Harness {
    pub store: Arc<MemoryProfileStore>,
    pub processor: Arc<ProfileProcessor>,
}

pub fn harness(
    discoverer: Arc<dyn UrlDiscoverer>,
    scraper: Arc<dyn ProfileScraper>,
    assessor: Arc<dyn ProfileAssessor>,
    retry: RetryPolicy,
) -> Harness {
    let store = Arc::new(MemoryProfileStore::new());
    let collaborators = Collaborators {
        discoverer,
        scraper,
        assessor,
    };
    let processor = Arc::new(ProfileProcessor::new(
        store.clone(),
        collaborators,
        settings(retry),
    ));
    Harness { store, processor }
}

pub fn seed(name: &str) -> ProfileSeed {
    ProfileSeed {
        source_ref: None,
        name: name.to_string(),
        company: Some("Example Labs".to_string()),
        email: None,
        profile_url: None,
        additional_info: None,
    }
}

pub fn add_profile(store: &MemoryProfileStore, name: &str) -> Uuid {
    let profile = Profile::from_seed(&seed(name));
    let id = profile.id;
    store.insert(profile);
    id
}

/// Asserts that every (run, stage, attempt) key has exactly one `started`
/// entry followed by exactly one terminal entry.
pub fn assert_paired(entries: &[ProcessingLogEntry]) {
    let mut seen: BTreeMap<(u32, Stage, u32), Vec<LogOutcome>> = BTreeMap::new();
    for entry in entries {
        seen.entry((entry.run, entry.stage, entry.attempt))
            .or_default()
            .push(entry.outcome);
    }
    for ((run, stage, attempt), outcomes) in &seen {
        assert_eq!(
            outcomes.len(),
            2,
            "run {run} {stage} attempt {attempt} has entries {outcomes:?}"
        );
        assert_eq!(outcomes[0], LogOutcome::Started, "run {run} {stage} attempt {attempt}");
        assert!(outcomes[1].is_terminal(), "run {run} {stage} attempt {attempt}");
    }
}

pub fn outcomes_for(entries: &[ProcessingLogEntry], stage: Stage) -> Vec<LogOutcome> {
    entries
        .iter()
        .filter(|e| e.stage == stage)
        .map(|e| e.outcome)
        .collect()
}
