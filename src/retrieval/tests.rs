use super::*;
use crate::store::ChunkRecord;
use crate::test_support::{FailingModel, TableModel};

fn knowledge_base(entries: &[(&str, Vec<f32>)]) -> KnowledgeBase {
    let dimension = entries.first().map_or(2, |(_, v)| v.len());
    let mut knowledge_base = KnowledgeBase::new(dimension);
    let vectors: Vec<Vec<f32>> = entries.iter().map(|(_, v)| v.clone()).collect();
    let records = entries
        .iter()
        .map(|(text, _)| ChunkRecord {
            source: format!("kb/{}.txt", text),
            text: (*text).to_string(),
        })
        .collect();
    knowledge_base
        .append(&vectors, records)
        .expect("append succeeds");
    knowledge_base
}

fn sample_base() -> KnowledgeBase {
    knowledge_base(&[
        ("exact", vec![1.0, 0.0]),
        ("close", vec![0.8, 0.6]),
        ("orthogonal", vec![0.0, 1.0]),
    ])
}

#[test]
fn results_are_ordered_and_thresholded() {
    let knowledge_base = sample_base();
    let embedder = Embedder::new(TableModel::default().with("question", vec![1.0, 0.0]));
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    let results = retriever
        .retrieve("question", 5, 0.3)
        .expect("retrieval succeeds");

    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["exact", "close"]);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!((results[1].score - 0.8).abs() < 1e-6);
    assert_eq!(results[1].source, "kb/close.txt");
}

#[test]
fn k_caps_the_result_count() {
    let knowledge_base = sample_base();
    let embedder = Embedder::new(TableModel::default().with("question", vec![1.0, 0.0]));
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    let results = retriever
        .retrieve("question", 1, -1.0)
        .expect("retrieval succeeds");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "exact");

    let everything = retriever
        .retrieve("question", 10, -1.0)
        .expect("retrieval succeeds");
    assert_eq!(everything.len(), 3);
}

#[test]
fn equal_scores_keep_insertion_order() {
    let knowledge_base = knowledge_base(&[
        ("first", vec![0.0, 1.0]),
        ("second", vec![0.0, 1.0]),
        ("other", vec![1.0, 0.0]),
    ]);
    let embedder = Embedder::new(TableModel::default().with("question", vec![0.0, 1.0]));
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    let results = retriever
        .retrieve("question", 2, 0.5)
        .expect("retrieval succeeds");
    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[test]
fn query_vector_is_normalized() {
    let knowledge_base = sample_base();
    let embedder = Embedder::new(TableModel::default().with("question", vec![25.0, 0.0]));
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    let results = retriever
        .retrieve("question", 1, 0.0)
        .expect("retrieval succeeds");
    assert!(results[0].score <= 1.0 + 1e-6);
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn missing_or_empty_knowledge_base_returns_nothing() {
    let embedder = Embedder::new(FailingModel);

    let missing = Retriever::new(None, &embedder);
    assert!(
        missing
            .retrieve("anything", 5, 0.3)
            .expect("no error for a missing knowledge base")
            .is_empty()
    );

    let empty_base = KnowledgeBase::new(2);
    let empty = Retriever::new(Some(&empty_base), &embedder);
    assert!(
        empty
            .retrieve("anything", 5, 0.3)
            .expect("no error for an empty knowledge base")
            .is_empty()
    );
}

#[test]
fn invalid_parameters_are_rejected() {
    let knowledge_base = sample_base();
    let embedder = Embedder::new(TableModel::default());
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    assert!(matches!(
        retriever.retrieve("question", 0, 0.3),
        Err(KbError::Config(_))
    ));
    assert!(matches!(
        retriever.retrieve("question", 5, 1.5),
        Err(KbError::Config(_))
    ));
    assert!(matches!(
        retriever.retrieve("question", 5, f32::NAN),
        Err(KbError::Config(_))
    ));
}

#[test]
fn embedding_errors_propagate() {
    let knowledge_base = sample_base();
    let embedder = Embedder::new(FailingModel);
    let retriever = Retriever::new(Some(&knowledge_base), &embedder);

    assert!(matches!(
        retriever.retrieve("question", 5, 0.3),
        Err(KbError::Embedding(_))
    ));
}
