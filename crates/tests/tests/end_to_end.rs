//! Cross-crate integration and E2E tests
//!
//! These tests run the full flow: plots and queries are embedded through the
//! Voyage provider against a mock embedding server, the plot vectors are
//! loaded into an in-memory store, and queries go through the similarity
//! client.

use std::sync::Arc;
use std::time::Duration;

use cinevec_embed::testing::{MockEmbeddingServer, hashed_embedding, normalize};
use cinevec_embed::{EmbedRequest, EmbeddingProvider, InputType, VoyageConfig, VoyageProvider};
use cinevec_store::{
    Document, EmbeddingVector, IndexState, InMemoryStore, QueryFilter, SearchOutcome,
    SimilarityClient, SimilarityFunction, SimilarityQuery, StoreError, VectorIndexDefinition,
};

const DIMENSIONS: usize = 2048;
const FIELD: &str = "plot_embedding_voyage_3_large";
const MODEL: &str = "voyage-3-large";

/// Keyword groups, one embedding axis each. Axis 0 is time travel.
const TOPICS: &[&[&str]] = &[
    &["time", "travel", "travels", "past", "future", "century"],
    &["alien", "aliens", "planet", "spaceship", "creature"],
    &["love", "romance", "marry", "wedding"],
    &["police", "heist", "gang", "detective", "thief"],
    &["shark", "ocean", "iceberg", "island"],
    &["boxer", "fighter", "pilot", "championship"],
];

/// Topic-lexicon embedding: keyword counts on fixed axes plus a small
/// deterministic per-text component, normalized to unit length.
fn lexicon_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut values: Vec<f32> = hashed_embedding(text, dimensions)
        .into_iter()
        .map(|v| v * 0.1)
        .collect();

    let lower = text.to_lowercase();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        for (axis, keywords) in TOPICS.iter().enumerate() {
            if keywords.contains(&word) {
                values[axis] += 1.0;
            }
        }
    }

    normalize(&mut values);
    values
}

struct Movie {
    title: &'static str,
    year: i64,
    plot: &'static str,
    time_travel: bool,
}

const fn movie(title: &'static str, year: i64, plot: &'static str, time_travel: bool) -> Movie {
    Movie {
        title,
        year,
        plot,
        time_travel,
    }
}

/// Fixed reference corpus.
const CORPUS: &[Movie] = &[
    movie("Back to the Future", 1985, "A teenager travels thirty years into the past in a time machine built from a car.", true),
    movie("The Terminator", 1984, "A cyborg is sent back in time from the future to kill a waitress.", true),
    movie("Time Bandits", 1981, "A boy and a band of thieves travel through time using a stolen map.", true),
    movie("Bill & Ted's Excellent Adventure", 1989, "Two slackers travel through time in a phone booth to collect historical figures.", true),
    movie("Peggy Sue Got Married", 1986, "A woman faints at her reunion and wakes up in her past, twenty five years back in time.", true),
    movie("Somewhere in Time", 1980, "A playwright travels back in time to 1912 and falls in love with an actress.", true),
    movie("Groundhog Day", 1993, "A weatherman is stuck in a time loop reliving the same day in the past.", true),
    movie("Twelve Monkeys", 1995, "A convict travels from the future into the past to stop a plague.", true),
    movie("Timecop", 1994, "An agent travels in time to stop criminals from changing the past.", true),
    movie("Primer", 2004, "Two engineers build a machine that lets them travel a few hours into the past.", true),
    movie("The Time Machine", 1960, "An inventor travels to the far future, eight hundred thousand years ahead in time.", true),
    movie("Looper", 2012, "Assassins kill targets sent back in time from the future.", true),
    movie("Aliens", 1986, "Marines fight a hive of alien creatures on a distant planet.", false),
    movie("E.T. the Extra-Terrestrial", 1982, "A boy befriends a stranded alien and helps it phone home.", false),
    movie("The Breakfast Club", 1985, "Five students from different cliques spend a Saturday detention together.", false),
    movie("Top Gun", 1986, "A hotshot navy pilot competes at an elite flight school.", false),
    movie("Die Hard", 1988, "A police officer fights a gang of thieves holding a tower hostage.", false),
    movie("When Harry Met Sally...", 1989, "Two friends wonder for years whether men and women can be friends without love.", false),
    movie("Rocky IV", 1985, "A boxer goes to Moscow to face a Soviet fighter.", false),
    movie("Ghostbusters", 1984, "Three parapsychologists start a ghost removal service in New York.", false),
    movie("Jaws", 1975, "A police chief hunts a great white shark off a resort island.", false),
    movie("Titanic", 1997, "A romance aboard a liner that strikes an iceberg in the ocean.", false),
    movie("Heat", 1995, "A detective pursues a professional heist crew through Los Angeles.", false),
    movie("Alien", 1979, "The crew of a spaceship is hunted by a deadly alien creature.", false),
];

fn is_time_travel(title: &str) -> bool {
    CORPUS.iter().any(|m| m.title == title && m.time_travel)
}

fn movie_index() -> VectorIndexDefinition {
    VectorIndexDefinition::new("vector_index", FIELD, DIMENSIONS, SimilarityFunction::DotProduct)
        .with_filter_field("year")
}

async fn start_server() -> MockEmbeddingServer {
    MockEmbeddingServer::builder()
        .embed_fn(lexicon_embedding)
        .api_key("test-key")
        .start()
        .await
}

fn provider(server: &MockEmbeddingServer) -> VoyageProvider {
    let config = VoyageConfig::new("test-key")
        .with_base_url(server.url())
        .with_model(MODEL)
        .with_output_dimension(DIMENSIONS);
    VoyageProvider::new(config).unwrap()
}

async fn embed(provider: &VoyageProvider, texts: Vec<String>, input_type: InputType) -> Vec<EmbeddingVector> {
    let request = EmbedRequest::new(texts, MODEL, DIMENSIONS).with_input_type(input_type);
    provider.embed(request).await.unwrap().into_vectors()
}

/// Embed the corpus plots in one request and wrap them as documents.
async fn corpus_documents(provider: &VoyageProvider) -> Vec<Document> {
    let plots = CORPUS.iter().map(|m| m.plot.to_string()).collect();
    let vectors = embed(provider, plots, InputType::Document).await;
    assert_eq!(vectors.len(), CORPUS.len());

    CORPUS
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (m, vector))| {
            Document::new(format!("movie-{:02}", i))
                .with_field("title", m.title)
                .with_field("year", m.year)
                .with_field("plot", m.plot)
                .with_field(FIELD, vector)
        })
        .collect()
}

async fn query_vector(provider: &VoyageProvider, text: &str) -> EmbeddingVector {
    embed(provider, vec![text.to_string()], InputType::Query)
        .await
        .remove(0)
}

fn titles(outcome: &SearchOutcome) -> Vec<&str> {
    outcome
        .matches
        .iter()
        .map(|m| m.document.get_str("title").unwrap())
        .collect()
}

fn scores(outcome: &SearchOutcome) -> Vec<f64> {
    outcome.matches.iter().map(|m| m.score.unwrap()).collect()
}

/// Mean drop between consecutive scores.
fn average_score_delta(scores: &[f64]) -> f64 {
    assert!(scores.len() >= 2);
    (scores[0] - scores[scores.len() - 1]) / (scores.len() - 1) as f64
}

fn assert_descending(scores: &[f64]) {
    assert!(
        scores.windows(2).all(|w| w[0] >= w[1]),
        "scores not descending: {:?}",
        scores
    );
}

/// E2E Test: "time travel" with limit 10 and no filter
///
/// All ten matches should be time-travel films, best first.
#[tokio::test]
async fn test_e2e_time_travel_query() {
    let server = start_server().await;
    let provider = provider(&server);
    let store = InMemoryStore::new()
        .with_documents(corpus_documents(&provider).await)
        .with_ready_index(movie_index());
    let client = SimilarityClient::new(Arc::new(store)).with_index(movie_index());

    let vector = query_vector(&provider, "time travel").await;
    assert_eq!(vector.dimensions(), DIMENSIONS);

    let outcome = client
        .search(SimilarityQuery::new(FIELD, vector, 10))
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.len(), 10);
    assert_descending(&scores(&outcome));
    for title in titles(&outcome) {
        assert!(is_time_travel(title), "unexpected match: {}", title);
    }
    // Vector field is projected out by default.
    assert!(outcome.matches.iter().all(|m| m.document.get(FIELD).is_none()));

    // One request for the corpus, one for the query.
    server.assert_request_count(2);
    let requests = server.captured_requests();
    assert_eq!(requests[0].input_type.as_deref(), Some("document"));
    assert_eq!(requests[1].input_type.as_deref(), Some("query"));
    assert_eq!(requests[1].output_dimension, Some(DIMENSIONS));
    assert_eq!(requests[1].authorization.as_deref(), Some("Bearer test-key"));
}

/// E2E Test: year 1980-1989 pre-filter
///
/// The filter narrows candidates before ranking, so fewer time-travel films
/// qualify and the scores fall off faster than without the filter.
#[tokio::test]
async fn test_e2e_year_prefilter_steepens_drop_off() {
    let server = start_server().await;
    let provider = provider(&server);
    let store = InMemoryStore::new()
        .with_documents(corpus_documents(&provider).await)
        .with_ready_index(movie_index());
    let client = SimilarityClient::new(Arc::new(store)).with_index(movie_index());
    let vector = query_vector(&provider, "time travel").await;

    let unfiltered = client
        .search(SimilarityQuery::new(FIELD, vector.clone(), 10))
        .await
        .unwrap();
    let filtered = client
        .search(
            SimilarityQuery::new(FIELD, vector, 10)
                .with_filter(QueryFilter::between("year", 1980, 1989)),
        )
        .await
        .unwrap();

    assert!(filtered.len() <= 10);
    assert!(filtered.len() >= 2);
    for m in &filtered.matches {
        let year = m.document.get_i64("year").unwrap();
        assert!((1980..=1989).contains(&year), "{} out of range", year);
    }
    assert_descending(&scores(&filtered));
    assert!(is_time_travel(titles(&filtered)[0]));

    let filtered_delta = average_score_delta(&scores(&filtered));
    let unfiltered_delta = average_score_delta(&scores(&unfiltered));
    assert!(
        filtered_delta > unfiltered_delta,
        "filtered delta {} should exceed unfiltered delta {}",
        filtered_delta,
        unfiltered_delta
    );
}

/// E2E Test: repeated identical filtered queries give identical results
#[tokio::test]
async fn test_e2e_repeated_query_is_deterministic() {
    let server = start_server().await;
    let provider = provider(&server);
    let store = InMemoryStore::new()
        .with_documents(corpus_documents(&provider).await)
        .with_ready_index(movie_index());
    let client = SimilarityClient::new(Arc::new(store)).with_index(movie_index());

    let mut runs = Vec::new();
    for _ in 0..3 {
        let vector = query_vector(&provider, "time travel").await;
        let query = SimilarityQuery::new(FIELD, vector, 5)
            .with_filter(QueryFilter::between("year", 1980, 1989));
        runs.push(client.search(query).await.unwrap());
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

/// E2E Test: index lifecycle from absent to ready
///
/// Queries fail while the index is absent, come back empty without error
/// while it builds, and return matches once it is ready. Creating it twice
/// is a no-op.
#[tokio::test]
async fn test_e2e_index_lifecycle() {
    let server = start_server().await;
    let provider = provider(&server);
    let store = InMemoryStore::new()
        .with_documents(corpus_documents(&provider).await)
        .with_build_polls(3);
    let client = SimilarityClient::new(Arc::new(store)).with_index(movie_index());
    let vector = query_vector(&provider, "time travel").await;

    let err = client
        .search(SimilarityQuery::new(FIELD, vector.clone(), 10))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::IndexNotFound { .. }));

    assert_eq!(client.create_missing_indexes().await.unwrap(), vec!["vector_index"]);
    assert!(client.create_missing_indexes().await.unwrap().is_empty());

    let building = client
        .search(SimilarityQuery::new(FIELD, vector.clone(), 10))
        .await
        .unwrap();
    assert!(building.is_empty());
    assert_eq!(building.index_state, IndexState::Building);

    tokio::time::timeout(
        Duration::from_secs(5),
        client.wait_until_ready(Duration::from_millis(5)),
    )
    .await
    .expect("index never became ready")
    .unwrap();
    assert!(client.create_missing_indexes().await.unwrap().is_empty());

    let ready = client
        .search(SimilarityQuery::new(FIELD, vector, 10))
        .await
        .unwrap();
    assert!(ready.is_complete());
    assert_eq!(ready.len(), 10);
}

/// E2E Test: wrong-length query vectors are rejected before the store
#[tokio::test]
async fn test_e2e_dimension_mismatch() {
    let server = start_server().await;
    let provider = provider(&server);
    let store = InMemoryStore::new()
        .with_documents(corpus_documents(&provider).await)
        .with_ready_index(movie_index());
    let client = SimilarityClient::new(Arc::new(store)).with_index(movie_index());

    let full = query_vector(&provider, "time travel").await.into_inner();
    let short = full[..1024].to_vec();

    let err = client
        .search(SimilarityQuery::new(FIELD, EmbeddingVector::new(short), 10))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { .. }));
}

/// E2E Test: embeddings stay aligned with inputs when the provider reorders
#[tokio::test]
async fn test_e2e_embedding_order_preserved() {
    let server = MockEmbeddingServer::builder()
        .embed_fn(lexicon_embedding)
        .reverse_order(true)
        .start()
        .await;
    let provider = provider(&server);

    let texts: Vec<String> = CORPUS.iter().take(5).map(|m| m.plot.to_string()).collect();
    let vectors = provider.embed_texts(texts.clone()).await.unwrap();

    assert_eq!(vectors.len(), texts.len());
    for (text, vector) in texts.iter().zip(&vectors) {
        assert_eq!(vector.as_slice(), lexicon_embedding(text, DIMENSIONS).as_slice());
    }
}

/// E2E Test: a provider failure surfaces once and is not retried
#[tokio::test]
async fn test_e2e_provider_failure_not_retried() {
    let server = start_server().await;
    server.queue_failure(503, "Service temporarily unavailable");
    let provider = provider(&server);

    let err = provider
        .embed_texts(vec!["time travel".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Service temporarily unavailable"));
    server.assert_request_count(1);
}
