use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use time::{Duration as TimeDuration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use lode_domain::{Artifact, EMBEDDING_DIM, UpsertOutcome};
use lode_orchestrator::{Error, FailureKind, MemoryJournal, Pipeline, RunContext, StepJournal};
use lode_testkit::{CountSkew, FakeSummarizer, Fakes, embedding_for, stored_document};

fn ctx(run_id: &str) -> RunContext {
	RunContext::new(run_id, CancellationToken::new())
}

#[tokio::test]
async fn single_chunk_snippet_is_indexed() {
	let fakes = Fakes::new();
	let pipeline = fakes.pipeline();
	let report = pipeline
		.ingest_artifact(&ctx("snippet-ingestion-s1"), &Artifact::new("s1", "def f(): return 1"))
		.await
		.expect("Ingestion must succeed.");

	assert_eq!(report.artifact_id, "s1");
	assert_eq!(report.chunk_count, 1);
	assert_eq!(report.overall_summary, FakeSummarizer::summary_for("def f(): return 1"));
	assert_eq!(report.store_result.outcome, UpsertOutcome::Created);

	let doc = fakes.store.get("s1").expect("Document must be stored.");

	assert_eq!(doc.overall_embedding.len(), EMBEDDING_DIM);
	assert_eq!(doc.chunks.len(), 1);
	assert_eq!(doc.chunks[0].chunk_index, 0);
	assert_eq!(doc.chunks[0].code, "def f(): return 1");
}

#[tokio::test]
async fn chunk_records_keep_their_positions() {
	let fakes = Fakes::new();
	let pipeline = fakes.pipeline();
	let content = "fn a() {}\n\nfn b() {}\n\nfn c() {}";

	pipeline
		.ingest_artifact(&ctx("run"), &Artifact::new("multi", content))
		.await
		.expect("Ingestion must succeed.");

	let doc = fakes.store.get("multi").expect("Document must be stored.");
	let expected = ["fn a() {}", "fn b() {}", "fn c() {}"];

	assert_eq!(doc.chunks.len(), expected.len());

	for (idx, (chunk, code)) in doc.chunks.iter().zip(expected).enumerate() {
		let summary = FakeSummarizer::chunk_summary_for(idx, code);

		assert_eq!(chunk.chunk_index, idx as u32);
		assert_eq!(chunk.code, code);
		assert_eq!(chunk.embedding, embedding_for(&summary, EMBEDDING_DIM));
		assert_eq!(chunk.summary, summary);
	}
}

#[tokio::test]
async fn reingesting_an_id_updates_one_document() {
	let fakes = Fakes::new();
	let first_write = OffsetDateTime::now_utc() - TimeDuration::days(1);

	fakes.store.insert(stored_document("s1", first_write));

	let report = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", "def f(): return 2"))
		.await
		.expect("Ingestion must succeed.");
	let doc = fakes.store.get("s1").expect("Document must be stored.");

	assert_eq!(report.store_result.outcome, UpsertOutcome::Updated);
	assert_eq!(fakes.store.len(), 1);
	assert_eq!(doc.created_at, first_write);
	assert!(doc.updated_at >= first_write);
	assert_eq!(doc.code, "def f(): return 2");
}

async fn assert_fatal_count_mismatch(fakes: &Fakes, step: &str) {
	let err = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", "a\n\nb"))
		.await
		.expect_err("Count mismatch must fail the run.");

	assert!(
		matches!(
			err,
			Error::Step(ref failure)
				if failure.step == step
					&& failure.kind == FailureKind::Fatal
					&& failure.attempts == 1
		),
		"Unexpected error: {err:?}"
	);
	assert!(fakes.store.is_empty());
}

#[tokio::test]
async fn chunk_summary_count_mismatch_fails_without_writing() {
	for skew in [CountSkew::OneShort, CountSkew::OneExtra] {
		let fakes = Fakes::new();

		fakes.summarizer.skew_chunk_summaries(skew);

		assert_fatal_count_mismatch(&fakes, "summarize_chunks").await;
		assert_eq!(fakes.summarizer.chunk_calls.load(Ordering::SeqCst), 1);
	}
}

#[tokio::test]
async fn chunk_embedding_count_mismatch_fails_without_writing() {
	for skew in [CountSkew::OneShort, CountSkew::OneExtra] {
		let fakes = Fakes::new();

		fakes.embedder.skew_batch(skew);

		assert_fatal_count_mismatch(&fakes, "embed_chunk_summaries").await;
		// One call for the overall summary, one for the chunk batch.
		assert_eq!(fakes.embedder.calls.load(Ordering::SeqCst), 2);
	}
}

#[tokio::test]
async fn wrong_embedding_length_is_fatal() {
	let fakes = Fakes::new();

	fakes.embedder.set_dimension(EMBEDDING_DIM - 1);

	let err = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", "def f(): return 1"))
		.await
		.expect_err("Dimension mismatch must fail the run.");

	assert!(matches!(
		err,
		Error::Step(ref failure)
			if failure.step == "embed_summary" && failure.kind == FailureKind::Fatal
	));
	assert_eq!(fakes.embedder.calls.load(Ordering::SeqCst), 1);
	assert!(fakes.store.is_empty());
}

#[tokio::test]
async fn transient_failures_are_absorbed_by_retries() {
	let fakes = Fakes::new();

	fakes.summarizer.failures.fail_times(2, FailureKind::Retryable);
	fakes.store.failures.fail_times(1, FailureKind::Retryable);

	let report = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", "def f(): return 1"))
		.await
		.expect("Retries must absorb transient failures.");

	assert_eq!(report.chunk_count, 1);
	assert_eq!(fakes.summarizer.summarize_calls.load(Ordering::SeqCst), 3);
	assert_eq!(fakes.store.upserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_content_is_indexed_without_chunks() {
	let fakes = Fakes::new();
	let report = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("pkg/__init__.py", "  \n"))
		.await
		.expect("Empty content must be indexed.");

	assert_eq!(report.chunk_count, 0);
	assert_eq!(fakes.summarizer.chunk_calls.load(Ordering::SeqCst), 0);
	assert_eq!(fakes.embedder.calls.load(Ordering::SeqCst), 1);

	let doc = fakes.store.get("pkg/__init__.py").expect("Document must be stored.");

	assert!(doc.chunks.is_empty());
	assert_eq!(doc.code, "  \n");
}

#[tokio::test]
async fn blank_id_is_rejected_before_any_step() {
	let fakes = Fakes::new();
	let err = fakes
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new(" ", "x = 1"))
		.await
		.expect_err("Blank ids must be rejected.");

	assert!(matches!(err, Error::InvalidInput(_)));
	assert_eq!(fakes.summarizer.summarize_calls.load(Ordering::SeqCst), 0);
	assert_eq!(fakes.chunker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn parallel_chunking_produces_the_same_document() {
	let sequential = Fakes::new();
	let parallel = Fakes::new();
	let content = "fn a() {}\n\nfn b() {}";
	let mut pipeline = parallel.pipeline();

	pipeline.parallel_chunking = true;

	sequential
		.pipeline()
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", content))
		.await
		.expect("Sequential ingestion must succeed.");
	pipeline
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", content))
		.await
		.expect("Parallel ingestion must succeed.");

	let a = sequential.store.get("s1").expect("Document must be stored.");
	let b = parallel.store.get("s1").expect("Document must be stored.");

	assert_eq!(a.overall_summary, b.overall_summary);
	assert_eq!(a.overall_embedding, b.overall_embedding);
	assert_eq!(a.chunks, b.chunks);
}

#[tokio::test]
async fn journaled_steps_are_not_repeated() {
	let fakes = Fakes::new();
	let journal = Arc::new(MemoryJournal::new());

	journal.record("run", "summarize", serde_json::json!("summary from an earlier attempt"));

	let pipeline = Pipeline::new(
		fakes.collaborators(),
		journal.clone(),
		lode_testkit::fast_steps(),
		false,
	);
	let report = pipeline
		.ingest_artifact(&ctx("run"), &Artifact::new("s1", "def f(): return 1"))
		.await
		.expect("Ingestion must succeed.");

	assert_eq!(report.overall_summary, "summary from an earlier attempt");
	assert_eq!(fakes.summarizer.summarize_calls.load(Ordering::SeqCst), 0);
	assert!(journal.load("run", "index").is_some());
}

#[tokio::test]
async fn cancellation_stops_at_the_next_step_boundary() {
	let fakes = Fakes::new();
	let pipeline = fakes.pipeline();
	let ctx = ctx("run");

	fakes.summarizer.gate.close();

	let cancel = ctx.cancel.clone();
	let gate_owner = fakes.summarizer.clone();
	let release = tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		cancel.cancel();
		gate_owner.gate.open();
	});
	let err = pipeline
		.ingest_artifact(&ctx, &Artifact::new("s1", "def f(): return 1"))
		.await
		.expect_err("Cancelled run must not complete.");

	release.await.expect("Release task panicked.");

	assert!(matches!(err, Error::Cancelled));
	assert!(fakes.store.is_empty());
	assert_eq!(fakes.embedder.calls.load(Ordering::SeqCst), 0);
}
