use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prism_core::{
    FileRecord, Finding, FrameworkInfo, PassKind, ProviderError, ReviewConfig, ScoringConfig, Severity,
};
use prism_graph::build_graph;
use prism_graph::graph::DependencyGraph;
use prism_graph::source::FileSet;
use prism_graph::walker::walk_repo;
use prism_review::llm::{ChatProvider, ModelConfig};
use prism_review::{ReviewInput, ReviewPipeline};

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<String, ProviderError>>,
    calls: Vec<(String, String)>,
}

/// Replays canned responses and records every prompt it receives.
#[derive(Clone, Default)]
struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        let provider = Self::default();
        provider.state.lock().unwrap().responses = responses.into();
        provider
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        _model: &ModelConfig,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((system.to_string(), user.to_string()));
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"summary":"nothing","findings":[]}"#.to_string()))
    }
}

struct Repo {
    files: FileSet,
    graph: DependencyGraph,
    frameworks: FrameworkInfo,
}

impl Repo {
    fn new(records: Vec<FileRecord>) -> Self {
        let files = FileSet::new(records);
        let graph = build_graph(&files, &ScoringConfig::default());
        Self {
            files,
            graph,
            frameworks: FrameworkInfo::default(),
        }
    }

    fn sample() -> Self {
        Self::new(vec![
            FileRecord::inline("package.json", r#"{"dependencies":{"express":"4"}}"#),
            FileRecord::inline("README.md", "# Shop\n"),
            FileRecord::inline(
                "src/index.ts",
                "import { router } from './routes/api';\nimport { query } from './db';\n",
            ),
            FileRecord::inline(
                "src/routes/api.ts",
                "import { login } from '../auth/login';\nexport const router = {};\n",
            ),
            FileRecord::inline(
                "src/auth/login.ts",
                "import { query } from '../db';\nexport function login(token) { return query(token); }\n",
            ),
            FileRecord::inline("src/db/index.ts", "export function query(sql) { return sql; }\n"),
        ])
    }

    fn input<'a>(&'a self, static_findings: &'a [Finding]) -> ReviewInput<'a> {
        ReviewInput {
            graph: &self.graph,
            files: &self.files,
            frameworks: &self.frameworks,
            static_findings,
        }
    }
}

fn pipeline(provider: &ScriptedProvider, config: ReviewConfig) -> ReviewPipeline {
    let model = ModelConfig {
        model: "test-model".into(),
        max_tokens: 1024,
        temperature: 0.0,
    };
    ReviewPipeline::new(Box::new(provider.clone()), model, config)
}

fn ok(body: &str) -> Result<String, ProviderError> {
    Ok(body.to_string())
}

#[tokio::test]
async fn passes_run_in_order_and_share_findings() {
    let repo = Repo::sample();
    let provider = ScriptedProvider::new(vec![
        ok(r#"{"summary":"layered","findings":[{"ruleId":"layering","severity":"medium","file":"src/db/index.ts","message":"Entry point bypasses the service layer"}]}"#),
        ok("```json\n{\"summary\":\"deep\",\"findings\":[{\"ruleId\":\"token\",\"severity\":\"warning\",\"file\":\"src/auth/login.ts\",\"line\":2,\"message\":\"Token is never verified\"}]}\n```"),
        ok(r#"Found one: {"summary":"sec","findings":[{"ruleId":"jwt","severity":"critical","file":"src/auth/login.ts","line":2,"message":"token is never verified!"}]}"#),
    ]);

    let report = pipeline(&provider, ReviewConfig::default()).run(&repo.input(&[])).await;

    let order: Vec<PassKind> = report.passes.iter().map(|p| p.pass).collect();
    assert_eq!(order, PassKind::ALL);

    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].0.contains("architect"));
    assert!(calls[0].1.contains("These are ALL 6 files"));
    assert!(calls[1].1.contains("ai/arch/layering"));
    assert!(calls[2].1.contains("Token is never verified"));

    let deep = &report.passes[1];
    assert_eq!(deep.included[0].path, "src/db/index.ts");
    assert_eq!(deep.included[0].reason, "Flagged by architecture review");

    assert_eq!(report.stats.findings_before_dedup, 3);
    assert_eq!(report.stats.findings_after_dedup, 2);
    assert_eq!(report.findings[0].rule_id, "ai/arch/layering");
    assert_eq!(report.findings[1].rule_id, "ai/security/jwt");
    assert_eq!(report.findings[1].severity, Severity::Error);
    assert_eq!(report.model, "test-model");
}

#[tokio::test]
async fn provider_failure_is_isolated_to_its_pass() {
    let repo = Repo::sample();
    let provider = ScriptedProvider::new(vec![
        ok(r#"{"summary":"ok","findings":[]}"#),
        Err(ProviderError::new("rate limited").with_status(429)),
        ok(r#"{"summary":"sec","findings":[{"ruleId":"sqli","severity":"error","file":"src/db/index.ts","line":1,"message":"Raw SQL"}]}"#),
    ]);

    let report = pipeline(&provider, ReviewConfig::default()).run(&repo.input(&[])).await;

    assert_eq!(provider.calls().len(), 3);
    let failed = &report.passes[1].findings[0];
    assert_eq!(failed.rule_id, "ai/provider");
    assert_eq!(failed.severity, Severity::Warning);
    assert_eq!(failed.file, ".");
    assert!(failed.message.contains("rate limited (status 429)"));
    assert_eq!(report.passes[2].findings.len(), 1);
    assert!(!provider.calls()[2].1.contains("ai/provider"));
}

#[tokio::test]
async fn abort_flag_skips_later_passes() {
    let repo = Repo::sample();
    let provider = ScriptedProvider::new(vec![Err(ProviderError::new("unauthorized").with_status(401))]);
    let config = ReviewConfig {
        abort_on_provider_error: true,
        ..ReviewConfig::default()
    };

    let report = pipeline(&provider, config).run(&repo.input(&[])).await;

    assert_eq!(provider.calls().len(), 1);
    assert_eq!(report.passes.len(), 3);
    assert!(report.passes[1].summary.starts_with("Skipped deep-dive review"));
    assert!(report.passes[2].included.is_empty());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].rule_id, "ai/provider");
}

#[tokio::test]
async fn empty_repository_skips_every_exchange() {
    let repo = Repo::new(Vec::new());
    let provider = ScriptedProvider::default();

    let report = pipeline(&provider, ReviewConfig::default()).run(&repo.input(&[])).await;

    assert!(provider.calls().is_empty());
    assert!(report.findings.is_empty());
    assert_eq!(
        report.passes[0].summary,
        "No files selected for architecture review; pass skipped."
    );
    assert_eq!(
        report.passes[2].summary,
        "No files selected for security review; pass skipped."
    );
}

#[tokio::test]
async fn malformed_response_yields_diagnostic_summary() {
    let repo = Repo::sample();
    let provider = ScriptedProvider::new(vec![ok("Sorry, I cannot review this.")]);

    let report = pipeline(&provider, ReviewConfig::default()).run(&repo.input(&[])).await;

    assert!(report.passes[0].findings.is_empty());
    assert_eq!(
        report.passes[0].summary,
        "Could not parse architecture response: Sorry, I cannot review this."
    );
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn progress_callback_sees_each_pass() {
    let repo = Repo::sample();
    let provider = ScriptedProvider::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    pipeline(&provider, ReviewConfig::default())
        .with_progress(move |pass| sink.lock().unwrap().push(pass))
        .run(&repo.input(&[]))
        .await;

    assert_eq!(*seen.lock().unwrap(), PassKind::ALL);
}

#[tokio::test]
async fn static_findings_lead_deep_dive_on_walked_repo() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/services")).unwrap();
    fs::write(root.join("package.json"), "{}").unwrap();
    fs::write(root.join("src/index.ts"), "import { pay } from './services/payments';\n").unwrap();
    fs::write(
        root.join("src/services/payments.ts"),
        "export function pay(amount) {\n  return amount * 1.2;\n}\n",
    )
    .unwrap();

    let records = walk_repo(root).unwrap();
    let repo = Repo::new(records);
    let statics = vec![
        Finding::new("lint/no-magic-numbers", Severity::Warning, "src/services/payments.ts", "Magic number")
            .at_line(2),
    ];
    let provider = ScriptedProvider::default();

    let report = pipeline(&provider, ReviewConfig::default())
        .run(&repo.input(&statics))
        .await;

    let deep = &report.passes[1];
    assert_eq!(deep.included[0].path, "src/services/payments.ts");
    assert_eq!(deep.included[0].reason, "1 static analysis finding");
    assert!(provider.calls()[1].1.contains("lint/no-magic-numbers"));
    assert_eq!(report.stats.files_considered, 3);
}

#[test]
fn review_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}
    let repo = Repo::sample();
    let provider = ScriptedProvider::default();
    let pipeline = pipeline(&provider, ReviewConfig::default());
    let input = repo.input(&[]);
    let future = pipeline.run(&input);
    assert_send(&future);
}
