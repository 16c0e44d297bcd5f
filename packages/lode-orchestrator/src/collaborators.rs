//! Narrow interfaces to everything outside the orchestration layer, plus the default adapters
//! over the HTTP providers, the token chunker and the Qdrant store.

use std::sync::Arc;

use lode_chunking::{ChunkingConfig, Tokenizer};
use lode_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, Source};
use lode_domain::{SnippetDocument, StoreReceipt, TreeNode};
use lode_providers::{embedding, source, summarizer};
use lode_storage::SnippetStore;

use crate::{BoxFuture, Error, Result, StepError};

type StepResult<T> = std::result::Result<T, StepError>;

pub trait Summarizer
where
	Self: Send + Sync,
{
	fn summarize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<String>>;

	/// One summary per chunk, in chunk order.
	fn summarize_chunks<'a>(&'a self, chunks: &'a [String])
	-> BoxFuture<'a, StepResult<Vec<String>>>;
}

pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<f32>>>;

	/// One vector per text, in input order.
	fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, StepResult<Vec<Vec<f32>>>>;
}

pub trait Chunker
where
	Self: Send + Sync,
{
	fn chunk<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<String>>>;
}

pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, doc: &'a SnippetDocument) -> BoxFuture<'a, StepResult<StoreReceipt>>;
}

pub trait Lister
where
	Self: Send + Sync,
{
	fn list<'a>(&'a self, owner: &'a str, path: &'a str)
	-> BoxFuture<'a, StepResult<Vec<TreeNode>>>;
}

pub trait ContentFetcher
where
	Self: Send + Sync,
{
	fn fetch<'a>(&'a self, owner: &'a str, path: &'a str) -> BoxFuture<'a, StepResult<String>>;
}

#[derive(Clone)]
pub struct Collaborators {
	pub summarizer: Arc<dyn Summarizer>,
	pub embedder: Arc<dyn Embedder>,
	pub chunker: Arc<dyn Chunker>,
	pub store: Arc<dyn DocumentStore>,
	pub lister: Arc<dyn Lister>,
	pub fetcher: Arc<dyn ContentFetcher>,
}
impl Collaborators {
	/// Builds the default collaborators. Loads the chunking tokenizer, falling back to the
	/// embedding model's repository when none is configured.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let tokenizer_repo = cfg
			.chunking
			.tokenizer_repo
			.clone()
			.unwrap_or_else(|| cfg.providers.embedding.model.clone());
		let tokenizer = lode_chunking::load_tokenizer(&tokenizer_repo).map_err(|err| {
			Error::Setup { message: format!("Failed to load tokenizer {tokenizer_repo}: {err}.") }
		})?;
		let store = SnippetStore::new(&cfg.storage.qdrant)
			.map_err(|err| Error::Setup {
				message: format!("Failed to build Qdrant client: {err}."),
			})?;
		let source = Arc::new(GraphqlSource { cfg: cfg.source.clone() });

		Ok(Self {
			summarizer: Arc::new(HttpSummarizer { cfg: cfg.providers.summarizer.clone() }),
			embedder: Arc::new(HttpEmbedder { cfg: cfg.providers.embedding.clone() }),
			chunker: Arc::new(TokenChunker {
				cfg: ChunkingConfig {
					max_tokens: cfg.chunking.max_tokens,
					overlap_tokens: cfg.chunking.overlap_tokens,
				},
				tokenizer: Arc::new(tokenizer),
			}),
			store: Arc::new(store),
			lister: source.clone(),
			fetcher: source,
		})
	}
}

pub struct HttpSummarizer {
	pub cfg: LlmProviderConfig,
}
impl Summarizer for HttpSummarizer {
	fn summarize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<String>> {
		Box::pin(async move { Ok(summarizer::summarize(&self.cfg, text).await?) })
	}

	fn summarize_chunks<'a>(
		&'a self,
		chunks: &'a [String],
	) -> BoxFuture<'a, StepResult<Vec<String>>> {
		Box::pin(async move {
			let mut summaries = Vec::with_capacity(chunks.len());

			for (index, chunk) in chunks.iter().enumerate() {
				summaries.push(summarizer::summarize_chunk(&self.cfg, index, chunk).await?);
			}

			Ok(summaries)
		})
	}
}

pub struct HttpEmbedder {
	pub cfg: EmbeddingProviderConfig,
}
impl Embedder for HttpEmbedder {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<f32>>> {
		Box::pin(async move {
			let texts = [text.to_string()];
			let mut vectors = embedding::embed(&self.cfg, &texts).await?;

			vectors.pop().ok_or_else(|| StepError::fatal("Embedding response is empty."))
		})
	}

	fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, StepResult<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(&self.cfg, texts).await?) })
	}
}

pub struct TokenChunker {
	pub cfg: ChunkingConfig,
	pub tokenizer: Arc<Tokenizer>,
}
impl Chunker for TokenChunker {
	fn chunk<'a>(&'a self, text: &'a str) -> BoxFuture<'a, StepResult<Vec<String>>> {
		let text = text.to_string();
		let cfg = self.cfg.clone();
		let tokenizer = self.tokenizer.clone();

		// Tokenization is CPU bound.
		Box::pin(async move {
			tokio::task::spawn_blocking(move || lode_chunking::split_code(&text, &cfg, &tokenizer))
				.await
				.map_err(|err| StepError::retryable(format!("Chunking task failed: {err}.")))?
				.map_err(|err| StepError::fatal(format!("Chunking failed: {err}.")))
		})
	}
}

impl DocumentStore for SnippetStore {
	fn upsert<'a>(&'a self, doc: &'a SnippetDocument) -> BoxFuture<'a, StepResult<StoreReceipt>> {
		Box::pin(async move { Ok(SnippetStore::upsert(self, doc).await?) })
	}
}

pub struct GraphqlSource {
	pub cfg: Source,
}
impl Lister for GraphqlSource {
	fn list<'a>(
		&'a self,
		owner: &'a str,
		path: &'a str,
	) -> BoxFuture<'a, StepResult<Vec<TreeNode>>> {
		Box::pin(async move { Ok(source::list_directory(&self.cfg, owner, path).await?) })
	}
}
impl ContentFetcher for GraphqlSource {
	fn fetch<'a>(&'a self, owner: &'a str, path: &'a str) -> BoxFuture<'a, StepResult<String>> {
		Box::pin(async move { Ok(source::fetch_content(&self.cfg, owner, path).await?) })
	}
}
