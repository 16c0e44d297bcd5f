//! Scripted in-memory collaborators for orchestration tests.

use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use time::OffsetDateTime;
use tokio::sync::watch;

use lode_domain::{EMBEDDING_DIM, SnippetDocument, StoreReceipt, TreeNode, UpsertOutcome};
use lode_orchestrator::{
	BoxFuture, Chunker, Collaborators, ContentFetcher, DocumentStore, Embedder, FailureKind,
	Lister, MemoryJournal, Pipeline, Runtime, RuntimeSettings, StepError, Summarizer,
};

type StepResult<T> = std::result::Result<T, StepError>;

/// Failures handed out one per call before calls start succeeding.
#[derive(Debug, Default)]
pub struct FailureScript {
	queue: Mutex<VecDeque<StepError>>,
}
impl FailureScript {
	pub fn fail_times(&self, times: usize, kind: FailureKind) {
		let mut queue = self.queue.lock().unwrap_or_else(|err| err.into_inner());

		for attempt in 0..times {
			queue.push_back(StepError::new(kind, format!("Scripted failure {}.", attempt + 1)));
		}
	}

	fn next(&self) -> Option<StepError> {
		self.queue.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
	}
}

/// A latch that blocks callers until opened. Starts open.
#[derive(Debug)]
pub struct Gate {
	tx: watch::Sender<bool>,
}
impl Gate {
	pub fn open(&self) {
		self.tx.send_replace(true);
	}

	pub fn close(&self) {
		self.tx.send_replace(false);
	}

	pub async fn wait(&self) {
		let mut rx = self.tx.subscribe();
		let _ = rx.wait_for(|open| *open).await;
	}
}
impl Default for Gate {
	fn default() -> Self {
		Self { tx: watch::Sender::new(true) }
	}
}

/// Deterministic stand-in for an embedding: the first component is the text length, the rest
/// depend on its bytes.
pub fn embedding_for(text: &str, dim: usize) -> Vec<f32> {
	let byte_sum = text.bytes().map(u64::from).sum::<u64>();
	let mut vec = vec![(byte_sum % 997) as f32 / 997.0; dim];

	if let Some(first) = vec.first_mut() {
		*first = text.len() as f32;
	}

	vec
}

/// How far a batch result's length strays from its input's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountSkew {
	#[default]
	Exact,
	OneShort,
	OneExtra,
}
impl CountSkew {
	fn apply<T: Clone>(self, mut items: Vec<T>, extra: impl FnOnce() -> T) -> Vec<T> {
		match self {
			Self::Exact => {},
			Self::OneShort => {
				items.pop();
			},
			Self::OneExtra => items.push(extra()),
		}

		items
	}
}

#[derive(Debug, Default)]
pub struct FakeSummarizer {
	pub summarize_calls: AtomicUsize,
	pub chunk_calls: AtomicUsize,
	pub failures: FailureScript,
	pub chunk_failures: FailureScript,
	/// Blocks `summarize` until opened.
	pub gate: Gate,
	chunk_skew: Mutex<CountSkew>,
}
impl FakeSummarizer {
	pub fn summary_for(text: &str) -> String {
		format!("summary: {text}")
	}

	pub fn chunk_summary_for(index: usize, chunk: &str) -> String {
		format!("part {}: {chunk}", index + 1)
	}

	/// Makes `summarize_chunks` return one summary too few or too many.
	pub fn skew_chunk_summaries(&self, skew: CountSkew) {
		*self.chunk_skew.lock().unwrap_or_else(|err| err.into_inner()) = skew;
	}
}
impl Summarizer for FakeSummarizer {
	fn summarize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<String>> {
		Box::pin(async move {
			self.gate.wait().await;
			self.summarize_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.failures.next() {
				return Err(err);
			}

			Ok(Self::summary_for(text))
		})
	}

	fn summarize_chunks<'a>(
		&'a self,
		chunks: &'a [String],
	) -> BoxFuture<'a, StepResult<Vec<String>>> {
		Box::pin(async move {
			self.chunk_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.chunk_failures.next() {
				return Err(err);
			}

			let summaries = chunks
				.iter()
				.enumerate()
				.map(|(index, chunk)| Self::chunk_summary_for(index, chunk))
				.collect::<Vec<_>>();
			let skew = *self.chunk_skew.lock().unwrap_or_else(|err| err.into_inner());

			Ok(skew.apply(summaries, || "part extra".to_string()))
		})
	}
}

#[derive(Debug)]
pub struct FakeEmbedder {
	pub calls: AtomicUsize,
	pub failures: FailureScript,
	dimension: AtomicUsize,
	batch_skew: Mutex<CountSkew>,
}
impl FakeEmbedder {
	/// Makes every later vector `dim` long.
	pub fn set_dimension(&self, dim: usize) {
		self.dimension.store(dim, Ordering::SeqCst);
	}

	/// Makes `embed_batch` return one vector too few or too many.
	pub fn skew_batch(&self, skew: CountSkew) {
		*self.batch_skew.lock().unwrap_or_else(|err| err.into_inner()) = skew;
	}

	fn vector(&self, text: &str) -> Vec<f32> {
		embedding_for(text, self.dimension.load(Ordering::SeqCst))
	}
}
impl Default for FakeEmbedder {
	fn default() -> Self {
		Self {
			calls: AtomicUsize::new(0),
			failures: FailureScript::default(),
			dimension: AtomicUsize::new(EMBEDDING_DIM),
			batch_skew: Mutex::default(),
		}
	}
}
impl Embedder for FakeEmbedder {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<f32>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.failures.next() {
				return Err(err);
			}

			Ok(self.vector(text))
		})
	}

	fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, StepResult<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.failures.next() {
				return Err(err);
			}

			let vectors = texts.iter().map(|text| self.vector(text)).collect::<Vec<_>>();
			let skew = *self.batch_skew.lock().unwrap_or_else(|err| err.into_inner());

			Ok(skew.apply(vectors, || self.vector("extra")))
		})
	}
}

/// Splits on blank lines, so text without one is a single chunk.
#[derive(Debug, Default)]
pub struct FakeChunker {
	pub calls: AtomicUsize,
}
impl Chunker for FakeChunker {
	fn chunk<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<String>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(text
				.split("\n\n")
				.map(str::trim)
				.filter(|chunk| !chunk.is_empty())
				.map(str::to_string)
				.collect())
		})
	}
}

/// Document store keyed by artifact id with the same timestamp rules as the Qdrant store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	pub upserts: AtomicUsize,
	pub failures: FailureScript,
	docs: Mutex<HashMap<String, SnippetDocument>>,
}
impl MemoryStore {
	pub const COLLECTION: &'static str = "memory";

	pub fn get(&self, artifact_id: &str) -> Option<SnippetDocument> {
		self.docs.lock().unwrap_or_else(|err| err.into_inner()).get(artifact_id).cloned()
	}

	pub fn len(&self) -> usize {
		self.docs.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Seeds a document as if an earlier run had written it.
	pub fn insert(&self, doc: SnippetDocument) {
		self.docs
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(doc.artifact_id.clone(), doc);
	}
}
impl DocumentStore for MemoryStore {
	fn upsert<'a>(&'a self, doc: &'a SnippetDocument) -> BoxFuture<'a, StepResult<StoreReceipt>> {
		Box::pin(async move {
			if let Some(err) = self.failures.next() {
				return Err(err);
			}

			self.upserts.fetch_add(1, Ordering::SeqCst);

			let mut docs = self.docs.lock().unwrap_or_else(|err| err.into_inner());
			let mut stored = doc.clone();
			let outcome = match docs.get(&doc.artifact_id) {
				Some(previous) => {
					stored.created_at = previous.created_at;
					stored.updated_at = doc.updated_at.max(previous.updated_at);

					UpsertOutcome::Updated
				},
				None => UpsertOutcome::Created,
			};

			docs.insert(doc.artifact_id.clone(), stored);

			Ok(StoreReceipt {
				collection: Self::COLLECTION.to_string(),
				document_id: doc.artifact_id.clone(),
				outcome,
				chunk_count: doc.chunk_count(),
			})
		})
	}
}

/// A file tree served from memory, with per-path listing counters.
#[derive(Debug, Default)]
pub struct FakeTree {
	dirs: HashMap<String, Vec<TreeNode>>,
	files: HashMap<String, String>,
	failing: HashSet<String>,
	gates: HashMap<String, Arc<Gate>>,
	list_calls: Mutex<HashMap<String, usize>>,
	fetch_calls: AtomicUsize,
}
impl FakeTree {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn dir(mut self, path: &str, children: impl IntoIterator<Item = TreeNode>) -> Self {
		self.dirs.insert(path.to_string(), children.into_iter().collect());

		self
	}

	pub fn file(mut self, path: &str, content: &str) -> Self {
		self.files.insert(path.to_string(), content.to_string());

		self
	}

	/// Listing `path` always fails with a retryable error.
	pub fn failing_dir(mut self, path: &str) -> Self {
		self.failing.insert(path.to_string());

		self
	}

	/// Listing `path` waits on the returned gate, which starts closed.
	pub fn gated_dir(mut self, path: &str) -> (Self, Arc<Gate>) {
		let gate = Arc::new(Gate::default());

		gate.close();
		self.gates.insert(path.to_string(), gate.clone());

		(self, gate)
	}

	pub fn list_calls(&self, path: &str) -> usize {
		let calls = self.list_calls.lock().unwrap_or_else(|err| err.into_inner());

		calls.get(path).copied().unwrap_or(0)
	}

	pub fn fetch_calls(&self) -> usize {
		self.fetch_calls.load(Ordering::SeqCst)
	}
}
impl Lister for FakeTree {
	fn list<'a>(
		&'a self,
		_owner: &'a str,
		path: &'a str,
	) -> BoxFuture<'a, StepResult<Vec<TreeNode>>> {
		Box::pin(async move {
			if let Some(gate) = self.gates.get(path) {
				gate.wait().await;
			}

			*self
				.list_calls
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.entry(path.to_string())
				.or_default() += 1;

			if self.failing.contains(path) {
				return Err(StepError::retryable(format!("Listing {path:?} is unavailable.")));
			}

			Ok(self.dirs.get(path).cloned().unwrap_or_default())
		})
	}
}
impl ContentFetcher for FakeTree {
	fn fetch<'a>(&'a self, owner: &'a str, path: &'a str) -> BoxFuture<'a, StepResult<String>> {
		Box::pin(async move {
			self.fetch_calls.fetch_add(1, Ordering::SeqCst);

			self.files
				.get(path)
				.cloned()
				.ok_or_else(|| StepError::not_found(format!("File {path} not found for {owner}.")))
		})
	}
}

/// One instance of every fake, wired into collaborator sets, pipelines and runtimes.
pub struct Fakes {
	pub summarizer: Arc<FakeSummarizer>,
	pub embedder: Arc<FakeEmbedder>,
	pub chunker: Arc<FakeChunker>,
	pub store: Arc<MemoryStore>,
	pub tree: Arc<FakeTree>,
	pub journal: Arc<MemoryJournal>,
}
impl Fakes {
	pub fn new() -> Self {
		Self::with_tree(FakeTree::new())
	}

	pub fn with_tree(tree: FakeTree) -> Self {
		Self {
			summarizer: Arc::default(),
			embedder: Arc::default(),
			chunker: Arc::default(),
			store: Arc::default(),
			tree: Arc::new(tree),
			journal: Arc::default(),
		}
	}

	pub fn collaborators(&self) -> Collaborators {
		Collaborators {
			summarizer: self.summarizer.clone(),
			embedder: self.embedder.clone(),
			chunker: self.chunker.clone(),
			store: self.store.clone(),
			lister: self.tree.clone(),
			fetcher: self.tree.clone(),
		}
	}

	pub fn pipeline(&self) -> Pipeline {
		Pipeline::new(self.collaborators(), self.journal.clone(), crate::fast_steps(), false)
	}

	/// Starts a runtime over [`Fakes::pipeline`]. Must be called inside a Tokio runtime.
	pub fn runtime(&self, settings: RuntimeSettings) -> Runtime {
		Runtime::new(self.pipeline(), settings)
	}
}
impl Default for Fakes {
	fn default() -> Self {
		Self::new()
	}
}

/// A document as an earlier run would have stored it.
pub fn stored_document(artifact_id: &str, at: OffsetDateTime) -> SnippetDocument {
	SnippetDocument {
		artifact_id: artifact_id.to_string(),
		code: "previous".to_string(),
		overall_summary: "previous".to_string(),
		overall_embedding: vec![0.0; EMBEDDING_DIM],
		chunks: Vec::new(),
		created_at: at,
		updated_at: at,
	}
}
