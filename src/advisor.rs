//! Sizing strategies
//!
//! A `SizingStrategy` turns a batch of VM requirements into a
//! `RecommendationBatch`. Two strategies exist:
//!
//! - `DeterministicStrategy`: the ratio-based engine in `sizing`.
//! - `AiAdvisor`: asks an LLM to choose among pre-filtered catalog candidates,
//!   given the VM's server statistics and business context.
//!
//! The AI path never fails a batch. Each VM that cannot be answered by the
//! model (timeout, exhausted retries, unparsable or invalid response) is
//! answered by the deterministic engine instead, with the failure recorded
//! in `ai_error`.

use crate::catalog::{lookup, parse_price, value_as_string, Catalog, InstanceSpec, Manufacturer};
use crate::config::AiConfig;
use crate::error::{Result, SizectlError};
use crate::requirements::VmRequirement;
use crate::retry::{ExponentialBackoffPolicy, NoRetryPolicy, RetryPolicy};
use crate::sizing::{
    self, resolve_manufacturer, vcpu_memory_ratio, Alternative, Method, Recommendation,
    RecommendationBatch, RecommendationDetail, TRADITIONAL_METHOD,
};
use crate::utils::{format_price_precise, round1};
use crate::validation::validate_instance_type;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Batch `method` for the AI strategy
pub const AI_METHOD: &str = "ai_intelligent_analysis";

/// Candidates shown to the model in the prompt
const PROMPT_CANDIDATES: usize = 10;

pub const SYSTEM_PROMPT: &str = "You are an AWS EC2 cost optimization expert. Analyze server statistics and recommend the cheapest instance from the newest generation that meets all requirements. NEVER recommend T-instances. Always respond with valid JSON only.";

const SERVER_STATS_KEYS: &[&str] = &[
    "Server Statistics",
    "server_statistics",
    "server_stats",
    "Server Stats",
    "statistics",
    "workload_info",
    "performance_data",
    "usage_patterns",
];
const BUDGET_KEYS: &[&str] = &["budget", "Budget", "cost", "Cost"];
const ENVIRONMENT_KEYS: &[&str] = &["environment", "Environment", "criticality", "Criticality"];
const COMPLIANCE_KEYS: &[&str] = &[
    "compliance",
    "Compliance",
    "security",
    "Security",
    "requirements",
    "Requirements",
];
const OPERATIONAL_FIELDS: &[(&str, &str)] = &[
    ("wave", "MIGRATION WAVE"),
    ("ProjectId", "PROJECT ID"),
    ("Tags", "RESOURCE TAGS"),
    ("SourceIpAddress", "SOURCE IP"),
    ("SSMKey", "SSM KEY"),
    ("Testing Subnet", "TESTING SUBNET"),
    ("Testing Security Groups", "TESTING SECURITY GROUPS"),
    ("Prod Subnet", "PRODUCTION SUBNET"),
    ("Prod Security Groups", "PRODUCTION SECURITY GROUPS"),
    ("Public Ip", "PUBLIC IP REQUIRED"),
    ("boot mode", "BOOT MODE"),
];

/// Produces recommendations for a batch of VMs
#[async_trait]
pub trait SizingStrategy: Send + Sync {
    async fn recommend_batch(
        &self,
        requirements: &[VmRequirement],
        catalog: &Catalog,
        default_manufacturer: Manufacturer,
    ) -> RecommendationBatch;
}

/// The ratio-based engine as a strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicStrategy;

#[async_trait]
impl SizingStrategy for DeterministicStrategy {
    async fn recommend_batch(
        &self,
        requirements: &[VmRequirement],
        catalog: &Catalog,
        default_manufacturer: Manufacturer,
    ) -> RecommendationBatch {
        let recommendations = sizing::recommend(requirements, catalog, default_manufacturer);
        RecommendationBatch::new(recommendations, TRADITIONAL_METHOD, default_manufacturer)
    }
}

/// Sends a prompt to a language model and returns the raw text reply
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions over HTTP
pub struct HttpCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let endpoint = config.require_endpoint()?;
        Ok(Self::new(endpoint, config.model.clone(), config.api_key()))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| SizectlError::Advisor {
            message: format!("Completion request to {} failed", self.endpoint),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SizectlError::advisor(format!(
                "Completion endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(|e| SizectlError::Advisor {
            message: "Completion response is not JSON".to_string(),
            source: Some(Box::new(e)),
        })?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SizectlError::advisor("Completion response has no choices[0].message.content"))
    }
}

/// A catalog row offered to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    #[serde(rename = "type")]
    pub instance_type: String,
    pub vcpus: u32,
    pub memory_gb: f64,
    pub manufacturer: Manufacturer,
    pub price_per_hour: String,
    pub family: String,
    pub generation: u32,
    /// Position in the sorted candidate list, 1-based
    pub cost_rank: usize,
}

/// First run of digits in an instance type ("m7i.large" → 7), 0 if none
pub fn instance_generation(instance_type: &str) -> u32 {
    static GENERATION: OnceLock<Option<Regex>> = OnceLock::new();
    GENERATION
        .get_or_init(|| Regex::new(r"[0-9]+").ok())
        .as_ref()
        .and_then(|re| re.find(instance_type))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Rows the model may choose from: eligible, not burstable (t*), of the
/// preferred manufacturer (Intel when the catalog has none of it), newest
/// generation first and cheapest first within a generation.
pub fn prepare_candidates(
    catalog: &Catalog,
    cpu: u32,
    memory_gb: f64,
    manufacturer: Manufacturer,
    limit: usize,
) -> Vec<Candidate> {
    let manufacturer = if catalog.has_manufacturer(manufacturer) {
        manufacturer
    } else {
        debug!("No instances for manufacturer {}, defaulting to Intel", manufacturer);
        Manufacturer::Intel
    };

    let mut rows: Vec<(&InstanceSpec, u32)> = catalog
        .eligible(cpu, memory_gb, Some(manufacturer))
        .filter(|row| !row.instance_type.starts_with('t'))
        .map(|row| (row, instance_generation(&row.instance_type)))
        .collect();

    rows.sort_by(|(a, gen_a), (b, gen_b)| {
        gen_b
            .cmp(gen_a)
            .then_with(|| a.hourly_price.total_cmp(&b.hourly_price))
    });

    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (row, generation))| Candidate {
            instance_type: row.instance_type.clone(),
            vcpus: row.vcpus,
            memory_gb: round1(row.memory_gb),
            manufacturer: row.manufacturer,
            price_per_hour: format_price_precise(row.hourly_price),
            family: row
                .instance_type
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            generation,
            cost_rank: i + 1,
        })
        .collect()
}

fn non_empty_field(metadata: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| metadata.get(*k))
        .filter_map(value_as_string)
        .find(|s| !s.is_empty())
}

/// Server statistics, if the row carries any
pub fn server_statistics(metadata: &Map<String, Value>) -> Option<String> {
    non_empty_field(metadata, SERVER_STATS_KEYS)
}

/// Business and operational context from the original row
pub fn metadata_context(metadata: &Map<String, Value>) -> String {
    let mut sections = Vec::new();

    if let Some(stats) = server_statistics(metadata) {
        sections.push(format!("DETAILED SERVER STATISTICS & WORKLOAD ANALYSIS:\n{}", stats));
    }
    if let Some(budget) = non_empty_field(metadata, BUDGET_KEYS) {
        sections.push(format!("BUDGET CONSTRAINT: {}", budget));
    }
    if let Some(env) = non_empty_field(metadata, ENVIRONMENT_KEYS) {
        sections.push(format!("ENVIRONMENT/CRITICALITY: {}", env));
    }
    if let Some(compliance) = non_empty_field(metadata, COMPLIANCE_KEYS) {
        sections.push(format!("COMPLIANCE/SECURITY: {}", compliance));
    }
    for (field, label) in OPERATIONAL_FIELDS {
        if let Some(value) = lookup(metadata, &[*field]).and_then(value_as_string) {
            if !value.is_empty() {
                sections.push(format!("{}: {}", label, value));
            }
        }
    }

    if sections.is_empty() {
        "No additional server statistics or metadata provided".to_string()
    } else {
        sections.join("\n\n")
    }
}

/// Build the user prompt for one VM
pub fn build_prompt(
    requirement: &VmRequirement,
    manufacturer: Manufacturer,
    candidates: &[Candidate],
) -> String {
    let ratio = vcpu_memory_ratio(requirement.cpu, requirement.memory_gb);
    let shown = &candidates[..candidates.len().min(PROMPT_CANDIDATES)];
    let options = serde_json::to_string_pretty(shown).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"VM ANALYSIS FOR AWS EC2 MIGRATION

BASIC VM SPECS:
- Name: {name}
- CPU: {cpu} cores
- Memory: {memory} GB
- CPU:Memory Ratio: {ratio:.1}:1
- Manufacturer Preference: {manufacturer}

SERVER STATISTICS & BUSINESS CONTEXT:
{context}

AVAILABLE EC2 OPTIONS (sorted by generation, then cost):
{options}

ANALYSIS REQUIREMENTS:
1. Analyze server statistics for workload patterns, performance requirements and scaling needs
2. Consider business context, compliance and SLA requirements from the metadata
3. Factor in storage IOPS, network bandwidth and seasonal patterns if mentioned
4. Weigh cost against performance based on business criticality
5. Recommend the cheapest instance from the newest generation that meets ALL requirements
6. Never recommend T-instances (burstable) for production
7. Provide alternatives for different scenarios (cost-optimized, performance-optimized)

RESPOND WITH VALID JSON ONLY:
{{
    "primary_instance": "instance-type",
    "manufacturer": "selected-manufacturer",
    "vcpus": number,
    "memory_gb": number,
    "price": "$X.XXX",
    "generation": "Xth",
    "reasoning": "analysis based on server statistics and business context",
    "alternatives": [
        {{
            "instance_type": "alt-type",
            "manufacturer": "alt-manufacturer",
            "price": "$X.XXX",
            "use_case": "when to use this alternative"
        }}
    ]
}}"#,
        name = requirement.name,
        cpu = requirement.cpu,
        memory = requirement.memory_gb,
        ratio = ratio,
        manufacturer = manufacturer,
        context = metadata_context(&requirement.metadata),
        options = options,
    )
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

#[derive(Debug, Deserialize)]
struct AiAlternative {
    instance_type: String,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    vcpus: Option<f64>,
    #[serde(default)]
    memory_gb: Option<f64>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    use_case: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AiResponse {
    primary_instance: String,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    vcpus: Option<f64>,
    #[serde(default)]
    memory_gb: Option<f64>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    generation: Option<Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    alternatives: Vec<AiAlternative>,
}

fn price_text(price: Option<&Value>) -> Option<String> {
    price.and_then(|p| match p {
        Value::Number(n) => n.as_f64().map(format_price_precise),
        other => value_as_string(other).filter(|s| !s.is_empty()),
    })
}

/// Parse a model reply into a recommendation body
pub fn parse_ai_response(text: &str) -> Result<RecommendationDetail> {
    let parsed: AiResponse = serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        SizectlError::Advisor {
            message: "AI response is not the expected JSON".to_string(),
            source: Some(Box::new(e)),
        }
    })?;

    let primary = parsed.primary_instance.trim().to_string();
    validate_instance_type(&primary).map_err(|e| {
        SizectlError::advisor(format!("AI recommended an invalid instance type: {}", e))
    })?;

    let price = price_text(parsed.price.as_ref());
    let alternatives = parsed
        .alternatives
        .into_iter()
        .map(|alt| {
            let price = price_text(alt.price.as_ref()).unwrap_or_default();
            Alternative {
                instance_type: alt.instance_type.trim().to_string(),
                manufacturer: alt.manufacturer.as_deref().and_then(Manufacturer::parse),
                vcpus: alt.vcpus.map(|v| v as u32),
                memory_gb: alt.memory_gb.map(round1),
                hourly_price: Some(parse_price(&price)).filter(|p| *p > 0.0),
                price,
                use_case: alt.use_case.unwrap_or_default(),
            }
        })
        .collect();

    Ok(RecommendationDetail {
        primary_instance: primary,
        manufacturer: parsed.manufacturer.as_deref().and_then(Manufacturer::parse),
        vcpus: parsed.vcpus.map(|v| v as u32),
        memory_gb: parsed.memory_gb.map(round1),
        hourly_price: price.as_deref().map(parse_price).filter(|p| *p > 0.0),
        price,
        alternatives,
        reasoning: parsed.reasoning,
        method: Method::AiEnhancedAnalysis,
        generation: parsed.generation.as_ref().and_then(value_as_string),
        ai_error: None,
    })
}

/// In-process cache of AI answers, keyed by the VM's sizing inputs
pub struct RecommendationCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, RecommendationDetail)>>,
}

impl RecommendationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Key on cpu, memory, manufacturer and server statistics
    pub fn key(requirement: &VmRequirement, manufacturer: Manufacturer) -> String {
        json!({
            "cpu": requirement.cpu,
            "memory_gb": requirement.memory_gb,
            "manufacturer": manufacturer,
            "server_stats": server_statistics(&requirement.metadata).unwrap_or_default(),
        })
        .to_string()
    }

    /// Cached answer if still fresh; expired entries are evicted
    pub async fn get(&self, key: &str) -> Option<RecommendationDetail> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored, detail)) if stored.elapsed() < self.ttl => Some(detail.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: String, detail: RecommendationDetail) {
        self.entries.lock().await.insert(key, (Instant::now(), detail));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Tunables for the AI strategy
#[derive(Debug, Clone)]
pub struct AdvisorSettings {
    pub max_retries: u32,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub max_concurrency: usize,
    pub candidate_limit: usize,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
            max_concurrency: 10,
            candidate_limit: 20,
        }
    }
}

impl From<&AiConfig> for AdvisorSettings {
    fn from(config: &AiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.timeout(),
            cache_ttl: config.cache_ttl(),
            max_concurrency: config.max_concurrency.max(1),
            candidate_limit: config.candidate_limit,
        }
    }
}

/// LLM-backed sizing with deterministic fallback
pub struct AiAdvisor<C> {
    client: C,
    settings: AdvisorSettings,
    retry: ExponentialBackoffPolicy,
    cache: RecommendationCache,
    progress: Option<ProgressBar>,
}

impl<C: CompletionClient> AiAdvisor<C> {
    pub fn new(client: C, settings: AdvisorSettings) -> Self {
        Self {
            client,
            retry: ExponentialBackoffPolicy::new(settings.max_retries),
            cache: RecommendationCache::new(settings.cache_ttl),
            settings,
            progress: None,
        }
    }

    /// Replace the retry policy (tests use a short initial delay)
    pub fn with_retry_policy(mut self, retry: ExponentialBackoffPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Tick a progress bar once per VM
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache(&self) -> &RecommendationCache {
        &self.cache
    }

    async fn ask_model(&self, requirement: &VmRequirement, prompt: &str) -> Result<RecommendationDetail> {
        let secs = self.settings.timeout.as_secs();
        let attempt = || async move {
            let reply = tokio::time::timeout(
                self.settings.timeout,
                self.client.complete(SYSTEM_PROMPT, prompt),
            )
            .await
            .map_err(|_| SizectlError::Timeout {
                operation: format!("AI completion for {}", requirement.name),
                secs,
            })??;
            parse_ai_response(&reply)
        };

        // A single attempt reports the model's own error, not a Retryable wrapper
        if self.retry.max_attempts() <= 1 {
            NoRetryPolicy.execute_with_retry(attempt).await
        } else {
            self.retry.execute_with_retry(attempt).await
        }
    }

    async fn advise(
        &self,
        requirement: &VmRequirement,
        catalog: &Catalog,
        default_manufacturer: Manufacturer,
    ) -> Recommendation {
        if requirement.predefined_instance_type.is_some() {
            return sizing::recommend_one(requirement, catalog, default_manufacturer);
        }

        let manufacturer = resolve_manufacturer(
            requirement.manufacturer_preference.as_deref(),
            default_manufacturer,
        );

        let key = RecommendationCache::key(requirement, manufacturer);
        if let Some(mut detail) = self.cache.get(&key).await {
            debug!("{}: using cached AI recommendation", requirement.name);
            detail.method = Method::AiCached;
            return Recommendation::new(requirement, detail);
        }

        let candidates = prepare_candidates(
            catalog,
            requirement.cpu,
            requirement.memory_gb,
            manufacturer,
            self.settings.candidate_limit,
        );

        let outcome = if candidates.is_empty() {
            Err(SizectlError::advisor(format!(
                "No candidate instances for {} vCPU / {:.1} GB ({})",
                requirement.cpu, requirement.memory_gb, manufacturer
            )))
        } else {
            let prompt = build_prompt(requirement, manufacturer, &candidates);
            self.ask_model(requirement, &prompt).await
        };

        match outcome {
            Ok(detail) => {
                self.cache.insert(key, detail.clone()).await;
                Recommendation::new(requirement, detail)
            }
            Err(e) => {
                warn!("AI analysis failed for {}: {}", requirement.name, e);
                let mut rec = sizing::recommend_one(requirement, catalog, default_manufacturer);
                rec.recommendation.ai_error = Some(e.to_string());
                rec
            }
        }
    }
}

#[async_trait]
impl<C: CompletionClient> SizingStrategy for AiAdvisor<C> {
    async fn recommend_batch(
        &self,
        requirements: &[VmRequirement],
        catalog: &Catalog,
        default_manufacturer: Manufacturer,
    ) -> RecommendationBatch {
        // `buffered` keeps input order while running up to N VMs at once
        let pending: Vec<_> = requirements
            .iter()
            .map(|requirement| async move {
                let rec = self.advise(requirement, catalog, default_manufacturer).await;
                if let Some(progress) = &self.progress {
                    progress.inc(1);
                }
                rec
            })
            .collect();
        let recommendations: Vec<Recommendation> = stream::iter(pending)
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let count = |method: Method| {
            recommendations
                .iter()
                .filter(|r| r.recommendation.method == method)
                .count()
        };
        let cache_hits = count(Method::AiCached);
        let ai_calls = count(Method::AiEnhancedAnalysis);
        info!(
            "AI sizing finished: {} VMs, {} model answers, {} cache hits",
            recommendations.len(),
            ai_calls,
            cache_hits
        );

        let mut batch = RecommendationBatch::new(recommendations, AI_METHOD, default_manufacturer);
        batch.cache_hits = Some(cache_hits);
        batch.ai_calls = Some(ai_calls);
        batch
    }
}
