//! Tests for the language model adapter: streaming callback, system prompt
//! handling and finish-reason reporting.

use std::sync::Arc;

use archief_rag::mock::MockChatModel;
use archief_rag::{
    ChunkMeta, FinishReason, GenerationOptions, Generator, RagError, Role, StreamingChunk,
};

fn chunk(content: &str, model: Option<&str>, finish_reason: Option<FinishReason>) -> StreamingChunk {
    StreamingChunk {
        content: content.to_string(),
        meta: ChunkMeta { index: 0, model: model.map(str::to_string), finish_reason },
    }
}

#[tokio::test]
async fn streaming_multiple_candidates_is_rejected_before_any_call() {
    let model = Arc::new(MockChatModel::new("mock").with_reply("nooit"));
    let generator = Generator::new(model.clone());

    let mut on_chunk = |_: &StreamingChunk| {};
    let options = GenerationOptions::default().with_n(2);
    let err = generator.generate("vraag", None, Some(&mut on_chunk), Some(&options)).await.unwrap_err();

    assert!(matches!(err, RagError::ConfigError(_)));
    assert!(err.to_string().contains("n=1"));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn construction_time_candidate_count_is_checked_too() {
    let model = Arc::new(MockChatModel::new("mock").with_reply("nooit"));
    let generator =
        Generator::new(model.clone()).with_options(GenerationOptions::default().with_n(3));

    let mut on_chunk = |_: &StreamingChunk| {};
    let err = generator.generate("vraag", None, Some(&mut on_chunk), None).await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn blocking_call_returns_one_reply_per_candidate() {
    let model = Arc::new(MockChatModel::new("mock").with_reply("Kasteel Amerongen"));
    let generator = Generator::new(model.clone());

    let options = GenerationOptions::default().with_n(2);
    let generation = generator.generate("vraag", None, None, Some(&options)).await.unwrap();

    assert_eq!(generation.replies.len(), 2);
    assert_eq!(generation.replies[1].meta.index, 1);
    assert!(generation.replies.iter().all(|r| r.text == "Kasteel Amerongen"));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn callback_sees_chunks_in_arrival_order() {
    let model = Arc::new(MockChatModel::new("mock").with_chunks(vec![
        chunk("Godard ", None, None),
        chunk("van ", Some("gpt-4o-mini-2024-07-18"), None),
        chunk("Reede", None, None),
        chunk("", None, Some(FinishReason::Stop)),
    ]));
    let generator = Generator::new(model);

    let mut seen = Vec::new();
    let mut on_chunk = |c: &StreamingChunk| seen.push(c.content.clone());
    let generation = generator.generate("vraag", None, Some(&mut on_chunk), None).await.unwrap();

    assert_eq!(seen, vec!["Godard ", "van ", "Reede", ""]);
    let reply = generation.into_first().unwrap();
    assert_eq!(reply.text, "Godard van Reede");
    assert_eq!(reply.meta.model, "gpt-4o-mini-2024-07-18");
    assert_eq!(reply.meta.finish_reason, Some(FinishReason::Stop));
    assert!(!reply.degraded);
}

#[tokio::test]
async fn empty_chunks_without_finish_reason_are_not_forwarded() {
    let model = Arc::new(MockChatModel::new("mock").with_chunks(vec![
        chunk("", Some("gpt-4o-mini"), None),
        chunk("Amerongen", None, None),
        chunk("", None, Some(FinishReason::Stop)),
        chunk("", None, None),
    ]));
    let generator = Generator::new(model);

    let mut seen = Vec::new();
    let mut on_chunk = |c: &StreamingChunk| seen.push((c.content.clone(), c.meta.finish_reason.clone()));
    let generation = generator.generate("vraag", None, Some(&mut on_chunk), None).await.unwrap();

    assert_eq!(
        seen,
        vec![("Amerongen".to_string(), None), (String::new(), Some(FinishReason::Stop))]
    );
    let reply = generation.into_first().unwrap();
    assert_eq!(reply.text, "Amerongen");
    assert_eq!(reply.meta.model, "gpt-4o-mini");
    assert_eq!(reply.meta.finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn length_finish_marks_reply_degraded() {
    let model = Arc::new(
        MockChatModel::new("mock")
            .with_reply_finishing("Het kasteel werd in 1672", FinishReason::Length)
            .with_reply_finishing("Het kasteel werd in 1672", FinishReason::Length),
    );
    let generator = Generator::new(model);

    let blocking = generator.generate("vraag", None, None, None).await.unwrap();
    assert!(blocking.replies[0].degraded);
    assert_eq!(blocking.replies[0].text, "Het kasteel werd in 1672");

    let mut on_chunk = |_: &StreamingChunk| {};
    let streamed = generator.generate("vraag", None, Some(&mut on_chunk), None).await.unwrap();
    let reply = streamed.into_first().unwrap();
    assert!(reply.degraded);
    assert_eq!(reply.meta.finish_reason, Some(FinishReason::Length));
}

#[tokio::test]
async fn content_filter_is_degraded_not_an_error() {
    let model = Arc::new(
        MockChatModel::new("mock").with_reply_finishing("", FinishReason::ContentFilter),
    );
    let generation = Generator::new(model).generate("vraag", None, None, None).await.unwrap();
    assert!(generation.replies[0].degraded);
}

#[tokio::test]
async fn per_call_system_prompt_overrides_the_default() {
    let model = Arc::new(MockChatModel::new("mock").with_reply("a").with_reply("b"));
    let generator = Generator::new(model.clone()).with_system_prompt("Je bent een archiefgids.");

    generator.generate("eerste", None, None, None).await.unwrap();
    generator.generate("tweede", Some("Antwoord in het Engels."), None, None).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[0].content, "Je bent een archiefgids.");
    assert_eq!(requests[1].messages[0].content, "Antwoord in het Engels.");
    assert_eq!(requests[1].messages[1].content, "tweede");
}

#[tokio::test]
async fn no_system_prompt_sends_only_the_user_message() {
    let model = Arc::new(MockChatModel::new("mock").with_reply("a"));
    Generator::new(model.clone()).generate("vraag", None, None, None).await.unwrap();

    let messages = &model.requests()[0].messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn empty_stream_is_a_model_error() {
    let model = Arc::new(MockChatModel::new("mock").with_chunks(Vec::new()));
    let mut on_chunk = |_: &StreamingChunk| {};
    let err = Generator::new(model)
        .generate("vraag", None, Some(&mut on_chunk), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ModelError { .. }));
}
