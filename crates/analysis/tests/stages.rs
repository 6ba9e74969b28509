use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;
use vibesense_analysis::{
    latest_aggregate, AggregationStage, AnalysisError, AnalysisStage, Analyzer,
};
use vibesense_core::{
    pipeline, AggregateReport, AnalysisResult, AnalyzedBatch, BatchItem, CommentBatch,
    PipelineMessage, SentimentLabel,
};
use vibesense_queue::{Consumer, Envelope, MemoryBus, Outcome, Publisher, StageConsumer};
use vibesense_store::{MemoryStore, ResultStore};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

/// Labels texts containing "love" positive, everything else negative.
/// Fails with a 503 for the first `outages` calls.
struct KeywordAnalyzer {
    outages: AtomicUsize,
    calls: AtomicUsize,
}

impl KeywordAnalyzer {
    fn new(outages: usize) -> Self {
        Self {
            outages: AtomicUsize::new(outages),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Analyzer for KeywordAnalyzer {
    async fn analyze(&self, texts: &[String]) -> Result<Vec<AnalysisResult>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AnalysisError::Api {
                status: 503,
                body: "model loading".into(),
            });
        }
        Ok(texts
            .iter()
            .map(|t| AnalysisResult {
                comment_id: None,
                sentiment: if t.contains("love") {
                    SentimentLabel::Positive
                } else {
                    SentimentLabel::Negative
                },
                confidence: 0.8,
                summary: Some(format!("about {t}")),
            })
            .collect())
    }
}

fn comment_batch(job_id: Uuid, causation: DateTime<Utc>, texts: &[(&str, &str)]) -> Envelope {
    let items = texts
        .iter()
        .map(|(id, text)| BatchItem {
            comment_id: id.to_string(),
            text: text.to_string(),
        })
        .collect();
    let msg = PipelineMessage::new(
        job_id,
        causation,
        CommentBatch {
            items,
            batch_index: 0,
            batch_count: 1,
        },
    );
    Envelope::new(pipeline::ANALYSIS, &msg).unwrap()
}

fn bus() -> Arc<MemoryBus> {
    Arc::new(MemoryBus::new(Duration::from_secs(30)))
}

async fn step(bus: &MemoryBus, consumer: &StageConsumer) -> Outcome {
    let delivery = bus.receive(consumer.channel()).await.unwrap().unwrap();
    consumer.process(delivery).await
}

#[tokio::test]
async fn batch_flows_through_analysis_and_aggregation() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let analysis = StageConsumer::builder(pipeline::ANALYSIS).build(
        bus.clone(),
        Arc::new(AnalysisStage::new(Arc::new(KeywordAnalyzer::new(0)))),
    );
    let aggregation = StageConsumer::builder(pipeline::AGGREGATION)
        .build(bus.clone(), Arc::new(AggregationStage::new(store.clone())));

    let job_id = Uuid::new_v4();
    bus.publish(comment_batch(
        job_id,
        at(1),
        &[("c1", "love it"), ("c2", "meh"), ("c3", "love the edit"), ("c4", "boring")],
    ))
    .await
    .unwrap();

    assert_eq!(step(&bus, &analysis).await, Outcome::Forwarded);
    let analyzed: PipelineMessage<AnalyzedBatch> =
        bus.pending(pipeline::AGGREGATION).await[0].decode().unwrap();
    let ids: Vec<_> = analyzed
        .payload
        .results
        .iter()
        .map(|r| r.comment_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    assert_eq!(analyzed.causation_timestamp, at(1));

    assert_eq!(step(&bus, &aggregation).await, Outcome::Forwarded);
    let report: PipelineMessage<AggregateReport> =
        bus.pending(pipeline::NOTIFICATION).await[0].decode().unwrap();
    assert_eq!(report.job_id, job_id);
    assert_eq!(report.payload.aggregate.interval_sentiment, 0.5);
    assert_eq!(report.payload.aggregate.overall_sentiment, 0.5);
    assert_eq!(report.payload.aggregate.sample_count, 1);
    assert!(report.payload.summary.unwrap().contains("about love it"));

    let history = store.history(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].comment_count, 4);
    assert_eq!(history[0].timestamp, at(1));
}

#[tokio::test]
async fn duplicate_delivery_does_not_double_count() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let aggregation = StageConsumer::builder(pipeline::AGGREGATION)
        .build(bus.clone(), Arc::new(AggregationStage::new(store.clone())));
    let job_id = Uuid::new_v4();

    let analyzed = |ids: &[&str], sentiment| {
        let results = ids
            .iter()
            .map(|id| AnalysisResult {
                comment_id: Some(id.to_string()),
                sentiment,
                confidence: 0.9,
                summary: None,
            })
            .collect();
        Envelope::new(
            pipeline::AGGREGATION,
            &PipelineMessage::new(job_id, at(2), AnalyzedBatch { results }),
        )
        .unwrap()
    };

    bus.publish(analyzed(&["a", "b"], SentimentLabel::Positive)).await.unwrap();
    bus.publish(analyzed(&["c"], SentimentLabel::Negative)).await.unwrap();
    assert_eq!(step(&bus, &aggregation).await, Outcome::Forwarded);
    assert_eq!(step(&bus, &aggregation).await, Outcome::Forwarded);
    let once = latest_aggregate(store.as_ref(), job_id).await.unwrap().unwrap();

    // Redelivery of the first batch, ids in a different order.
    bus.publish(analyzed(&["b", "a"], SentimentLabel::Positive)).await.unwrap();
    assert_eq!(step(&bus, &aggregation).await, Outcome::Forwarded);

    assert_eq!(store.history(job_id).await.unwrap().len(), 2);
    let reports = bus.pending(pipeline::NOTIFICATION).await;
    let last: PipelineMessage<AggregateReport> = reports[2].decode().unwrap();
    assert_eq!(last.payload.aggregate.overall_sentiment, once.overall_sentiment);
    assert_eq!(last.payload.aggregate.confidence_interval, once.confidence_interval);
    assert_eq!(last.payload.aggregate.sample_count, 2);
}

#[tokio::test]
async fn model_outage_is_redelivered_not_dropped() {
    let bus = bus();
    let analyzer = Arc::new(KeywordAnalyzer::new(2));
    let analysis = StageConsumer::builder(pipeline::ANALYSIS)
        .build(bus.clone(), Arc::new(AnalysisStage::new(analyzer.clone())));

    bus.publish(comment_batch(Uuid::new_v4(), at(3), &[("c1", "love")]))
        .await
        .unwrap();

    assert_eq!(step(&bus, &analysis).await, Outcome::Redelivered);
    assert_eq!(step(&bus, &analysis).await, Outcome::Redelivered);
    assert_eq!(step(&bus, &analysis).await, Outcome::Forwarded);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(bus.depth(pipeline::ANALYSIS).await.unwrap(), 0);
}

#[tokio::test]
async fn undecodable_payload_is_dead_lettered() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let aggregation = StageConsumer::builder(pipeline::AGGREGATION)
        .build(bus.clone(), Arc::new(AggregationStage::new(store)));

    let bogus = PipelineMessage::new(Uuid::new_v4(), at(4), "not a batch".to_string());
    bus.publish(Envelope::new(pipeline::AGGREGATION, &bogus).unwrap())
        .await
        .unwrap();

    assert_eq!(step(&bus, &aggregation).await, Outcome::DeadLettered);
    let dead = pipeline::dead_letter(pipeline::AGGREGATION);
    assert_eq!(bus.depth(&dead).await.unwrap(), 1);
}

#[tokio::test]
async fn no_history_means_no_aggregate() {
    let store = MemoryStore::new();
    assert!(latest_aggregate(&store, Uuid::new_v4()).await.unwrap().is_none());
}
