//! Generation through the assembler with a scripted model

use futures::StreamExt;
use porfiry_core::combine::executive_summary_request;
use porfiry_core::prelude::*;
use porfiry_core::prompt::EXECUTIVE_SUMMARY_PROMPT;
use porfiry_core::{ChatMessage, ModelOptions, Role, Screenshot};
use porfiry_test_utils::ScriptedModel;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn two_shots() -> Vec<Screenshot> {
    vec![
        Screenshot::new("screenshot1.png", b"first".to_vec()),
        Screenshot::new("screenshot2.png", b"second".to_vec()),
    ]
}

fn request() -> AssemblyRequest {
    AssemblyRequest::new(
        PromptVariant::Report,
        vec![ChatMessage::user("# IDOR\n\nchanged the id")],
        two_shots(),
    )
}

#[tokio::test]
async fn streamed_generation_forwards_tokens_then_completes() {
    let model = Arc::new(ScriptedModel::new(["## Finding\n", "Login\n", "works ", "![a](screenshot2.png)"]));
    let assembler = Assembler::new(model.clone());

    let events: Vec<AssemblyEvent> = assembler.generate_events(request()).await.unwrap().collect().await;

    assert_eq!(events.len(), 5);
    assert_eq!(events[0], AssemblyEvent::Token("## Finding\n".into()));
    let AssemblyEvent::Completed(assembly) = &events[4] else {
        panic!("expected completion, got {:?}", events[4]);
    };
    assert_eq!(assembly.raw, "## Finding\nLogin works ![a](screenshot2.png)");
    assert_eq!(
        assembly.markdown,
        format!("## Finding\nLogin works ![a]({})", two_shots()[1].data_uri())
    );

    let sent = model.last_request().unwrap();
    assert_eq!(sent.messages[0].role, Role::System);
    assert_eq!(sent.messages[1].images.len(), 2);
}

#[tokio::test]
async fn mid_stream_failure_ends_with_failed_event() {
    let model = Arc::new(ScriptedModel::new(["a", "b", "c"]).failing_after(2, "model crashed"));
    let assembler = Assembler::new(model);

    let events: Vec<AssemblyEvent> = assembler.generate_events(request()).await.unwrap().collect().await;
    assert_eq!(
        events,
        vec![
            AssemblyEvent::Token("a".into()),
            AssemblyEvent::Token("b".into()),
            AssemblyEvent::Failed("scripted error: model crashed".into()),
        ]
    );

    let wire: Vec<String> = assembler.raw_stream(request()).await.unwrap().collect().await;
    assert_eq!(wire.concat(), "ab\n[ERROR] scripted error: model crashed");
}

#[tokio::test]
async fn unreachable_model_is_a_capability_failure() {
    let assembler = Assembler::new(Arc::new(ScriptedModel::new(["x"]).unreachable("connection refused")));

    let err = assembler.generate(request()).await.unwrap_err();
    assert!(matches!(err, AssemblyError::CapabilityFailure(_)));
    assert!(!err.is_retryable());

    assert!(matches!(
        assembler.raw_stream(request()).await,
        Err(AssemblyError::CapabilityFailure(_))
    ));
}

#[tokio::test]
async fn generation_is_unbounded_unless_single_flight() {
    let open = Assembler::new(Arc::new(ScriptedModel::new(["x"])));
    let _held = open.raw_stream(request()).await.unwrap();
    assert!(open.generate(request()).await.is_ok());

    let gated = Assembler::new(Arc::new(ScriptedModel::new(["x"]))).with_single_flight(true);
    let held = gated.raw_stream(request()).await.unwrap();
    assert!(gated.is_busy());

    let err = gated.generate(request()).await.unwrap_err();
    assert!(err.is_admission_rejection());
    assert_eq!(err.to_string(), "generation busy, try again later");

    let drained: Vec<String> = held.collect().await;
    assert_eq!(drained, vec!["x".to_string()]);
    assert!(!gated.is_busy());
    assert_eq!(gated.generate(request()).await.unwrap().raw, "x");
}

#[tokio::test]
async fn executive_summary_uses_its_prompt_and_options() {
    let model = Arc::new(ScriptedModel::new(["Overall risk is high."]));
    let assembler = Assembler::new(model.clone());

    let summary = assembler
        .generate(executive_summary_request(["## SQLi\n![p](data:image/png;base64,AAAA)"]))
        .await
        .unwrap();
    assert_eq!(summary.markdown, "Overall risk is high.");

    let sent = model.last_request().unwrap();
    assert_eq!(sent.options, ModelOptions::executive_summary());
    assert_eq!(sent.messages[0].content, EXECUTIVE_SUMMARY_PROMPT);
    assert_eq!(sent.messages[1].content, "Below are the vulnerabilities found\n\n## SQLi\n");
    assert!(sent.messages[1].images.is_empty());
}
