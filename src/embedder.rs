use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use once_cell::sync::Lazy;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;

use crate::error::DbsError;
use crate::models::EngineConfig;

/// A loaded (session, tokenizer) pair, shared process-wide by `model_name`.
/// The mutex is entered only around `Session::run`; tokenization happens
/// outside it so unrelated callers can overlap.
struct ModelEntry {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

static MODEL_CACHE: Lazy<Mutex<HashMap<String, Arc<ModelEntry>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn load_entry(model_name: &str) -> Result<Arc<ModelEntry>, DbsError> {
    {
        let cache = MODEL_CACHE.lock().unwrap();
        if let Some(entry) = cache.get(model_name) {
            return Ok(Arc::clone(entry));
        }
    }

    let api = hf_hub::api::sync::Api::new()
        .map_err(|e| DbsError::Inference(format!("hf-hub init failed: {e}")))?;
    let repo = api.model(model_name.to_string());

    let model_path = repo
        .get("model.onnx")
        .map_err(|e| DbsError::Inference(format!("failed to fetch model.onnx for {model_name}: {e}")))?;
    let tokenizer_path = repo
        .get("tokenizer.json")
        .map_err(|e| DbsError::Inference(format!("failed to fetch tokenizer.json for {model_name}: {e}")))?;

    let session = Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.commit_from_file(&model_path))
        .map_err(|e| DbsError::Inference(format!("failed to load ONNX session for {model_name}: {e}")))?;

    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| DbsError::Inference(format!("failed to load tokenizer for {model_name}: {e}")))?;

    let entry = Arc::new(ModelEntry {
        session: Mutex::new(session),
        tokenizer,
    });

    let mut cache = MODEL_CACHE.lock().unwrap();
    let entry = cache.entry(model_name.to_string()).or_insert(entry).clone();
    Ok(entry)
}

/// Thread-safe batch text-to-vector encoder for one engine's model.
pub struct Embedder {
    dimension: usize,
    max_token_length: usize,
    query_prefix: String,
    passage_prefix: String,
    entry: Arc<ModelEntry>,
}

impl Embedder {
    pub fn new(cfg: &EngineConfig) -> Result<Self, DbsError> {
        let entry = load_entry(&cfg.model_name)?;
        Ok(Self {
            dimension: cfg.vector_dimension,
            max_token_length: cfg.max_token_length,
            query_prefix: cfg.query_prefix.clone(),
            passage_prefix: cfg.passage_prefix.clone(),
            entry,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Empty input returns an empty `0 x D` matrix without touching the model.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DbsError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", self.passage_prefix, t))
            .collect();
        self.run_inference(&prefixed)
    }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, DbsError> {
        if text.trim().is_empty() {
            return Err(DbsError::Validation("query text must not be empty".to_string()));
        }
        let prefixed = format!("{}{}", self.query_prefix, text);
        let mut rows = self.run_inference(&[prefixed])?;
        let row = rows
            .pop()
            .ok_or_else(|| DbsError::Inference("embedder returned no rows for one input".to_string()))?;
        if row.len() != self.dimension {
            return Err(DbsError::Inference(format!(
                "shape mismatch: expected ({},) got ({},)",
                self.dimension,
                row.len()
            )));
        }
        Ok(row)
    }

    fn run_inference(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DbsError> {
        let encodings = self
            .entry
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| DbsError::Inference(format!("tokenization failed: {e}")))?;

        let longest = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let max_len = longest.min(self.max_token_length).max(1);
        let batch = encodings.len();

        // attention-mask values are cast to the input tensor's integer dtype
        // before being handed to the runtime.
        let mut input_ids = Array2::<i64>::zeros((batch, max_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, max_len));

        for (row, enc) in encodings.iter().enumerate() {
            let ids = enc.get_ids();
            let mask = enc.get_attention_mask();
            for col in 0..max_len.min(ids.len()) {
                input_ids[[row, col]] = ids[col] as i64;
                attention_mask[[row, col]] = mask[col] as i64;
            }
        }

        let outputs = {
            let mut session = self.entry.session.lock().unwrap();
            session
                .run(ort::inputs![
                    "input_ids" => Value::from_array(input_ids.clone())
                        .map_err(|e| DbsError::Inference(format!("failed to build input_ids tensor: {e}")))?,
                    "attention_mask" => Value::from_array(attention_mask.clone())
                        .map_err(|e| DbsError::Inference(format!("failed to build attention_mask tensor: {e}")))?,
                ]
                .map_err(|e| DbsError::Inference(format!("failed to assemble runtime inputs: {e}")))?)
                .map_err(|e| DbsError::Inference(format!("ONNX Runtime inference failed: {e}")))?
        };

        let (shape, data) = outputs["last_hidden_state"]
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| DbsError::Inference(format!("failed to extract embedding tensor: {e}")))?;

        let hidden = *shape.last().ok_or_else(|| DbsError::Inference("empty output shape".to_string()))? as usize;

        let mut rows = Vec::with_capacity(batch);
        for row in 0..batch {
            let mut pooled = vec![0f32; hidden];
            let mut count = 0f32;
            for col in 0..max_len {
                if attention_mask[[row, col]] == 0 {
                    continue;
                }
                count += 1.0;
                let base = (row * max_len + col) * hidden;
                for h in 0..hidden {
                    pooled[h] += data[base + h];
                }
            }
            if count > 0.0 {
                for v in pooled.iter_mut() {
                    *v /= count;
                }
            }
            rows.push(pooled);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    // Model-backed behavior (dimension round trip, empty-input short-circuit,
    // empty-query rejection) is covered by the end-to-end ingest/search tests
    // under tests/, which run against a tiny fixture model rather than
    // mocking ONNX Runtime here.
}
