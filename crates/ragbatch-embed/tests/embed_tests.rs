use ragbatch_core::config::{EmbedderSettings, ProviderKind};
use ragbatch_core::EmbedderCapability;
use ragbatch_embed::{build_embedder, FakeEmbedder, FAKE_DIM};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(FAKE_DIM);
    let texts = vec!["hello world".to_string(), "hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed(&texts).await.expect("embed");
    assert_eq!(embs.len(), 3, "one vector per input");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), FAKE_DIM, "embedding dim is {FAKE_DIM}");

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Deterministic for same input
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
    assert_ne!(v1, &embs[2], "different text, different vector");
}

#[tokio::test]
async fn build_embedder_uses_explicit_settings() {
    let settings = EmbedderSettings { provider: ProviderKind::Fake, request_timeout_secs: Some(3), ..Default::default() };
    let embedder = build_embedder(&settings).expect("fake embedder");
    assert_eq!(embedder.name(), "Fake");
    assert_eq!(embedder.profile().request_timeout.as_secs(), 3);
    embedder.check_ready().await.expect("fake is always ready");
}

#[test]
fn build_embedder_requires_key_for_hosted() {
    let settings = EmbedderSettings {
        provider: ProviderKind::OpenAi,
        api_key: Some("   ".to_string()),
        ..Default::default()
    };
    // Only fails when OPENAI_API_KEY is absent from the environment too.
    if std::env::var("OPENAI_API_KEY").is_err() {
        assert!(build_embedder(&settings).is_err());
    }
}
