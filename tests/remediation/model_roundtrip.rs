use std::sync::Arc;

use patchwarden::config::{Config, LinterKind};
use patchwarden::core::SessionContext;
use patchwarden::core::agent::{Kernel, RemediationTask, SessionOutcome};
use patchwarden::core::providers::{OpenAiCompatibleProvider, Provider};
use patchwarden::core::tools::remediation_tools;
use patchwarden::security::ModelAuditor;
use patchwarden::store::{AuditStatus, Store};
use patchwarden::verify::linter_from_config;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::harness::RecordingVcs;

const FIXED: &str = "export function render(el, name) {\n  el.textContent = name;\n}\n";

fn tool_turn(id: &str, name: &str, args: serde_json::Value) -> serde_json::Value {
    json!({
        "choices": [{"message": {
            "content": null,
            "tool_calls": [{
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": args.to_string()}
            }]
        }}]
    })
}

fn text_turn(text: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"content": text}}]})
}

async fn script_worker(server: &MockServer, replies: Vec<serde_json::Value>) {
    for reply in replies {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "worker"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

fn config_for(server: &MockServer, base: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.model.base_url = server.uri();
    config.model.api_key = Some("test-key".into());
    config.model.model = "worker".into();
    config.model.auditor_model = Some("auditor".into());
    config.sandbox.project_root = base.join("project").to_string_lossy().into_owned();
    config.sandbox.memory_root = Some(base.join("memory").to_string_lossy().into_owned());
    config.store.database_path = base.join("audit.db").to_string_lossy().into_owned();
    config.knowledge.path = Some(base.join("knowledge.json").to_string_lossy().into_owned());
    config.verify.linter = LinterKind::None;
    config
}

#[tokio::test]
async fn configured_session_round_trips_through_an_openai_compatible_server() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(base.join("project/src")).unwrap();
    std::fs::write(
        base.join("project/src/view.ts"),
        "export function render(el, name) {\n  el.innerHTML = name;\n}\n",
    )
    .unwrap();
    std::fs::write(
        base.join("knowledge.json"),
        json!({"xss": {
            "title": "Cross-site scripting",
            "description": "Never assign untrusted input to innerHTML.",
            "code": "el.textContent = value;"
        }})
        .to_string(),
    )
    .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "auditor"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_turn("RESULT: APPROVED\nREASON: textContent does not parse HTML")),
        )
        .mount(&server)
        .await;
    script_worker(
        &server,
        vec![
            tool_turn("c1", "get_knowledge", json!({"query": "xss in render"})),
            tool_turn("c2", "propose_fix", json!({"path": "src/view.ts", "code": FIXED})),
            tool_turn("c3", "write_fix", json!({"path": "src/view.ts", "code": FIXED})),
            text_turn("Done. REMEDIATION_COMPLETE"),
        ],
    )
    .await;

    let config = config_for(&server, &base);
    config.validate().unwrap();
    let store = Store::open(&config.database_path().unwrap()).await.unwrap();
    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiCompatibleProvider::from_config(&config.model));
    let auditor_provider: Arc<dyn Provider> = Arc::new(OpenAiCompatibleProvider::for_model(
        &config.model,
        config.model.auditor_model(),
    ));
    let mut ctx = SessionContext::from_config(
        &config,
        &store,
        Arc::new(ModelAuditor::new(auditor_provider)),
        linter_from_config(&config.verify),
    )
    .await
    .unwrap();
    assert_eq!(ctx.knowledge.len(), 1);

    let vcs = RecordingVcs::new();
    let kernel = Kernel::from_config(&config, provider, remediation_tools(), vcs.clone());
    let report = kernel
        .run(
            &mut ctx,
            &RemediationTask::new("src/view.ts", "DOM XSS via innerHTML"),
        )
        .await;

    assert_eq!(report.outcome, SessionOutcome::Success, "{report:?}");
    assert_eq!(report.tool_calls, 3);
    assert_eq!(
        std::fs::read_to_string(base.join("project/src/view.ts")).unwrap(),
        FIXED
    );
    let knowledge_reply = &ctx.transcript.messages()[3];
    assert!(knowledge_reply.content.contains("Cross-site scripting"));

    let writes = store
        .audit()
        .query(10, Some(AuditStatus::Success))
        .await
        .unwrap();
    assert!(writes.iter().any(|e| e.content_digest.is_some()));
    assert!(vcs.rollbacks().is_empty());
}

#[tokio::test]
async fn unreachable_model_fails_the_session_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(base.join("project")).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let mut config = config_for(&server, &base);
    config.knowledge.path = None;
    let store = Store::in_memory().await.unwrap();
    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiCompatibleProvider::from_config(&config.model));
    let mut ctx = SessionContext::from_config(
        &config,
        &store,
        Arc::new(ModelAuditor::new(Arc::clone(&provider))),
        linter_from_config(&config.verify),
    )
    .await
    .unwrap();

    let vcs = RecordingVcs::new();
    let report = Kernel::from_config(&config, provider, remediation_tools(), vcs.clone())
        .run(&mut ctx, &RemediationTask::new("src/view.ts", "xss"))
        .await;

    assert!(matches!(report.outcome, SessionOutcome::Failure { .. }));
    assert_eq!(report.steps, 1);
    assert_eq!(vcs.rollbacks().len(), 1);
}
