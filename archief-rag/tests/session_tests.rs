//! Tests for the chat session: progressive updates, history bookkeeping and
//! the error placeholder.

use std::sync::Arc;

use archief_rag::mock::{MockChatModel, MockEmbeddingProvider};
use archief_rag::{
    ChatSession, Document, DocumentWriter, InMemoryVectorStore, MetadataDiscipline,
    PresentationConfig, QueryPipeline, RagConfig, Role,
};

const DIM: usize = 8;

async fn store_with_letters(embedder: Arc<MockEmbeddingProvider>) -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    DocumentWriter::new(embedder, store.clone())
        .write(vec![
            Document::new("brief-1", "Brief van Godard van Reede")
                .with_meta("file_path", "brieven/1690.pdf")
                .with_meta("representatieve\nafbeelding", "img/brief.jpg")
                .with_meta("invnr", "INV-42"),
            Document::new("brief-2", "Tweede brief van Godard van Reede")
                .with_meta("file_path", "brieven/1690.pdf")
                .with_meta("representatieve\nafbeelding", serde_json::Value::Null)
                .with_meta("invnr", "INV-42"),
        ])
        .await
        .unwrap();
    store
}

fn pipeline(
    embedder: Arc<MockEmbeddingProvider>,
    store: Arc<InMemoryVectorStore>,
    model: Arc<MockChatModel>,
) -> QueryPipeline {
    QueryPipeline::builder()
        .config(RagConfig::builder().embedding_dimensions(DIM).build().unwrap())
        .embedding_provider(embedder)
        .vector_store(store)
        .chat_model(model)
        .build()
        .unwrap()
}

#[tokio::test]
async fn streamed_turn_updates_progressively_then_records_history() {
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let store = store_with_letters(embedder.clone()).await;
    let model = Arc::new(MockChatModel::new("mock").with_reply("Godard van Reede schreef vaak."));
    let pipeline = pipeline(embedder, store, model);

    let mut session = ChatSession::default();
    let mut texts = Vec::new();
    let reply = session
        .ask(&pipeline, "Wie schreef deze brieven?", |state| texts.push(state.text.clone()))
        .await;

    // One update per chunk plus the final one; each is a prefix of the next.
    assert!(texts.len() > 2);
    assert!(texts.windows(2).all(|w| w[1].starts_with(w[0].as_str())));
    assert_eq!(texts.last().unwrap(), "Godard van Reede schreef vaak.");

    assert!(!reply.failed);
    assert_eq!(reply.state.source_paths, vec!["brieven/1690.pdf"]);
    assert_eq!(reply.state.image_paths, vec!["img/brief.jpg"]);
    assert_eq!(reply.state.archive_numbers, vec!["INV-42"]);

    let turns = session.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].content, "Godard van Reede schreef vaak.");
    assert_eq!(turns[1].attachments.as_ref().unwrap().archive_numbers, vec!["INV-42"]);
}

#[tokio::test]
async fn blocking_turn_replays_as_one_update() {
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let store = store_with_letters(embedder.clone()).await;
    let model = Arc::new(MockChatModel::new("mock").with_reply("Twee brieven."));
    let pipeline = pipeline(embedder, store, model);

    let mut session = ChatSession::new(PresentationConfig {
        discipline: MetadataDiscipline::Positional,
        ..Default::default()
    })
    .with_streaming(false);

    let mut updates = 0;
    let reply = session.ask(&pipeline, "Hoeveel brieven?", |_| updates += 1).await;

    assert_eq!(updates, 1);
    assert_eq!(reply.state.text, "Twee brieven.");
    assert_eq!(reply.state.source_paths, vec!["brieven/1690.pdf", "brieven/1690.pdf"]);
    assert_eq!(reply.state.archive_numbers, vec!["INV-42", "INV-42"]);
    assert_eq!(reply.state.image_paths, vec!["img/brief.jpg"]);
}

#[tokio::test]
async fn failed_turn_shows_placeholder_without_earlier_sources() {
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let store = store_with_letters(embedder.clone()).await;
    let model = Arc::new(MockChatModel::new("mock").with_reply("Eerste antwoord."));
    let working = pipeline(embedder, store.clone(), model);

    let mut session = ChatSession::default();
    let first = session.ask(&working, "Eerste vraag", |_| {}).await;
    assert!(!first.state.source_paths.is_empty());

    let broken = pipeline(
        Arc::new(MockEmbeddingProvider::failing(DIM, "connection reset")),
        store,
        Arc::new(MockChatModel::new("mock").with_reply("Herschreven vraag")),
    );
    let second = session.ask(&broken, "Tweede vraag", |_| {}).await;

    assert!(second.failed);
    assert!(second.state.text.starts_with("An error occurred: "));
    assert!(second.state.text.contains("connection reset"));
    assert!(second.state.source_paths.is_empty());
    assert!(second.state.image_paths.is_empty());
    assert!(second.state.archive_numbers.is_empty());
    assert!(second.state.attributions.is_empty());

    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn second_turn_sends_history_to_the_rephraser() {
    let embedder = Arc::new(MockEmbeddingProvider::new(DIM));
    let store = store_with_letters(embedder.clone()).await;
    let model = Arc::new(
        MockChatModel::new("mock")
            .with_reply("Godard van Reede.")
            .with_reply("Wanneer leefde Godard van Reede?")
            .with_reply("In de zeventiende eeuw."),
    );
    let pipeline = pipeline(embedder, store, model.clone());

    let mut session = ChatSession::default();
    session.ask(&pipeline, "Wie schreef de brief?", |_| {}).await;
    let reply = session.ask(&pipeline, "Wanneer leefde hij?", |_| {}).await;

    assert_eq!(reply.state.text, "In de zeventiende eeuw.");
    assert_eq!(model.calls(), 3);
    let rephrase_prompt = &model.requests()[1].messages[0].content;
    assert!(rephrase_prompt.contains("Godard van Reede."));
    assert!(rephrase_prompt.contains("Wanneer leefde hij?"));
}
