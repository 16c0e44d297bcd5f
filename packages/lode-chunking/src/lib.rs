//! Token-budgeted chunking for source code. Chunks are built from whole lines so that a chunk never
//! starts in the middle of a statement unless a single line exceeds the budget on its own.

pub use tokenizers::Tokenizer;

use unicode_segmentation::UnicodeSegmentation;

pub type TokenizerError = tokenizers::Error;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}
impl Default for ChunkingConfig {
	fn default() -> Self {
		Self { max_tokens: 512, overlap_tokens: 0 }
	}
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer, TokenizerError> {
	Tokenizer::from_pretrained(repo, None)
}

/// Splits `code` into ordered chunks of at most `cfg.max_tokens` tokens. Empty or whitespace-only
/// input yields no chunks.
pub fn split_code(
	code: &str,
	cfg: &ChunkingConfig,
	tokenizer: &Tokenizer,
) -> Result<Vec<String>, TokenizerError> {
	let mut builder = ChunkBuilder { cfg, tokenizer, chunks: Vec::new(), current: String::new() };

	for line in code.split_inclusive('\n') {
		if count_tokens(tokenizer, line)? > cfg.max_tokens as usize {
			builder.flush()?;

			for piece in line.split_word_bounds() {
				builder.push(piece)?;
			}
		} else {
			builder.push(line)?;
		}
	}

	builder.finish()
}

struct ChunkBuilder<'a> {
	cfg: &'a ChunkingConfig,
	tokenizer: &'a Tokenizer,
	chunks: Vec<String>,
	current: String,
}
impl ChunkBuilder<'_> {
	fn push(&mut self, piece: &str) -> Result<(), TokenizerError> {
		let candidate = format!("{}{}", self.current, piece);

		if count_tokens(self.tokenizer, &candidate)? > self.cfg.max_tokens as usize
			&& !self.current.trim().is_empty()
		{
			let overlap = overlap_tail(&self.current, self.cfg.overlap_tokens, self.tokenizer)?;

			self.flush()?;

			self.current = overlap;
		}

		self.current.push_str(piece);

		Ok(())
	}

	fn flush(&mut self) -> Result<(), TokenizerError> {
		let current = std::mem::take(&mut self.current);

		if !current.trim().is_empty() {
			self.chunks.push(current);
		}

		Ok(())
	}

	fn finish(mut self) -> Result<Vec<String>, TokenizerError> {
		self.flush()?;

		Ok(self.chunks)
	}
}

fn count_tokens(tokenizer: &Tokenizer, text: &str) -> Result<usize, TokenizerError> {
	Ok(tokenizer.encode(text, false)?.len())
}

/// Returns the suffix of `text` covering its last `overlap_tokens` tokens, sliced from the original
/// text so that code formatting survives.
fn overlap_tail(
	text: &str,
	overlap_tokens: u32,
	tokenizer: &Tokenizer,
) -> Result<String, TokenizerError> {
	if overlap_tokens == 0 {
		return Ok(String::new());
	}

	let encoding = tokenizer.encode(text, false)?;
	let offsets = encoding.get_offsets();
	let start = offsets.len().saturating_sub(overlap_tokens as usize);
	let Some((byte_start, _)) = offsets.get(start) else {
		return Ok(String::new());
	};

	Ok(text.get(*byte_start..).unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use super::*;

	// Word-level tokenizer where every word or punctuation run is one token.
	const WORD_TOKENIZER_JSON: &str = r#"{
		"version": "1.0",
		"truncation": null,
		"padding": null,
		"added_tokens": [],
		"normalizer": null,
		"pre_tokenizer": { "type": "Whitespace" },
		"post_processor": null,
		"decoder": null,
		"model": { "type": "WordLevel", "vocab": { "[UNK]": 0 }, "unk_token": "[UNK]" }
	}"#;

	fn word_tokenizer() -> Tokenizer {
		Tokenizer::from_str(WORD_TOKENIZER_JSON).expect("Failed to build word tokenizer.")
	}

	#[test]
	fn short_code_is_one_chunk() {
		let cfg = ChunkingConfig { max_tokens: 64, overlap_tokens: 0 };
		let chunks = split_code("def f(): return 1", &cfg, &word_tokenizer()).unwrap();

		assert_eq!(chunks, vec!["def f(): return 1".to_string()]);
	}

	#[test]
	fn empty_code_has_no_chunks() {
		let cfg = ChunkingConfig::default();

		assert!(split_code("", &cfg, &word_tokenizer()).unwrap().is_empty());
		assert!(split_code("\n\n  \n", &cfg, &word_tokenizer()).unwrap().is_empty());
	}

	#[test]
	fn splits_on_line_boundaries_in_order() {
		let cfg = ChunkingConfig { max_tokens: 4, overlap_tokens: 0 };
		let code = "a b\nc d\ne f\n";
		let chunks = split_code(code, &cfg, &word_tokenizer()).unwrap();

		assert_eq!(chunks, vec!["a b\nc d\n".to_string(), "e f\n".to_string()]);
		assert_eq!(chunks.concat(), code);
	}

	#[test]
	fn overlong_line_falls_back_to_word_bounds() {
		let cfg = ChunkingConfig { max_tokens: 3, overlap_tokens: 0 };
		let chunks = split_code("one two three four five", &cfg, &word_tokenizer()).unwrap();

		assert!(chunks.len() >= 2);
		assert_eq!(chunks.concat(), "one two three four five");
	}

	#[test]
	fn overlap_repeats_the_tail_of_the_previous_chunk() {
		let cfg = ChunkingConfig { max_tokens: 4, overlap_tokens: 1 };
		let chunks = split_code("a b\nc d\ne f\n", &cfg, &word_tokenizer()).unwrap();

		assert_eq!(chunks[0], "a b\nc d\n");
		assert!(chunks[1].starts_with("d\n"));
	}
}
