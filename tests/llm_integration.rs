//! Integration tests against a live LiteLLM-compatible endpoint.
//!
//! Run with: LITELLM_API_BASE=http://localhost:4000 cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use selfmod::codegen::{extract_code, render_update_prompt, BundleMarkers, SYSTEM_PROMPT};
use selfmod::llm::{GenerationRequest, LiteLlmClient, LlmProvider, LlmTextGenerator, Message, TextGenerator};

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::from_env().expect("LITELLM_API_BASE environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        "",
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);
}

#[tokio::test]
#[ignore]
async fn test_update_prompt_yields_both_sections() {
    let provider: Arc<dyn LlmProvider> = Arc::new(create_test_client());
    let generator = LlmTextGenerator::new(provider)
        .with_system_prompt(SYSTEM_PROMPT)
        .with_temperature(0.0);

    let markers = BundleMarkers::default();
    let prompt = render_update_prompt(
        "write a function add(a, b) that returns the sum of two numbers",
        std::path::Path::new("utils/generated_utils.py"),
        std::path::Path::new("tests/test_generated_utils.py"),
        &markers,
    );

    let bundle = generator.generate(&prompt).await.expect("Generation should succeed");
    let code = extract_code(&bundle, &markers).expect("Bundle should carry both sections");

    assert!(code.main_code.contains("def add"), "main code: {}", code.main_code);
    assert!(code.test_code.contains("def test_"), "test code: {}", code.test_code);
}

#[tokio::test]
#[ignore]
async fn test_unreachable_endpoint_reports_request_failure() {
    let client = LiteLlmClient::new("http://127.0.0.1:9".to_string(), None, "any".to_string());
    let request = GenerationRequest::new("any", vec![Message::user("hello")]);

    let err = client.generate(request).await.expect_err("Request should fail");
    assert!(err.to_string().contains("HTTP request failed"), "got: {}", err);
}
