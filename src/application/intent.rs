//! # Intent Classification
//!
//! Decides between the API and CLI layer for messages without an explicit directive.
//! The keyword strategy is a case-insensitive substring test against a fixed vocabulary.
//! The AI strategy asks an API executor for a label and falls back to keywords when the
//! call fails or the label cannot be read. Anything undecided goes to the API layer.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::types::{ExecutionRequest, ExecutorHandle, Layer};
use crate::strings::prompts;

/// Code, file and project-operation phrases that call for the CLI layer.
pub const CLI_KEYWORDS: &[&str] = &[
    "查看代码",
    "view code",
    "分析代码",
    "analyze code",
    "代码库",
    "codebase",
    "修改文件",
    "modify file",
    "读取文件",
    "read file",
    "写入文件",
    "write file",
    "创建文件",
    "create file",
    "执行命令",
    "execute command",
    "运行脚本",
    "run script",
    "分析项目",
    "analyze project",
    "项目结构",
    "project structure",
];

struct LabelCache {
    capacity: usize,
    order: VecDeque<String>,
    labels: HashMap<String, Layer>,
}

impl LabelCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            labels: HashMap::new(),
        }
    }

    fn get(&self, text: &str) -> Option<Layer> {
        self.labels.get(text).copied()
    }

    fn insert(&mut self, text: &str, layer: Layer) {
        if self.labels.insert(text.to_string(), layer).is_some() {
            return;
        }
        self.order.push_back(text.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.labels.remove(&oldest);
            }
        }
    }
}

pub struct IntentClassifier {
    keywords: Vec<String>,
    delegate: Option<ExecutorHandle>,
    timeout: Duration,
    cache: Mutex<LabelCache>,
}

impl IntentClassifier {
    /// Keyword strategy only.
    pub fn keywords() -> Self {
        Self {
            keywords: CLI_KEYWORDS.iter().map(|k| k.to_lowercase()).collect(),
            delegate: None,
            timeout: Duration::from_secs(60),
            cache: Mutex::new(LabelCache::new(1)),
        }
    }

    /// AI strategy backed by `executor`, with keywords as the fallback.
    pub fn ai(executor: ExecutorHandle, timeout: Duration, cache_size: usize) -> Self {
        Self {
            delegate: Some(executor),
            timeout,
            cache: Mutex::new(LabelCache::new(cache_size)),
            ..Self::keywords()
        }
    }

    pub fn uses_ai(&self) -> bool {
        self.delegate.is_some()
    }

    pub async fn classify(&self, text: &str) -> Layer {
        let Some(executor) = &self.delegate else {
            return self.classify_keywords(text);
        };

        if let Some(layer) = self.cached(text) {
            debug!("[INTENT] Using cached label {} for message", layer);
            return layer;
        }

        let request = ExecutionRequest::prompt(prompts::intent_classification(text))
            .with_param("max_tokens", serde_json::json!(200))
            .with_param("temperature", serde_json::json!(0.1));

        match tokio::time::timeout(self.timeout, executor.execute(request)).await {
            Ok(result) if result.success => match Self::parse_label(&result.text) {
                Some(layer) => {
                    info!("[INTENT] AI classification: {}", layer);
                    self.cache
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(text, layer);
                    return layer;
                }
                None => warn!(
                    "[INTENT] Unreadable label {:?}, falling back to keywords",
                    result.text.chars().take(200).collect::<String>()
                ),
            },
            Ok(result) => warn!(
                "[INTENT] AI classification failed: {}, falling back to keywords",
                result.display_text()
            ),
            Err(_) => warn!("[INTENT] AI classification timed out, falling back to keywords"),
        }

        self.classify_keywords(text)
    }

    pub fn classify_keywords(&self, text: &str) -> Layer {
        let lower = text.to_lowercase();
        match self.keywords.iter().find(|k| lower.contains(k.as_str())) {
            Some(keyword) => {
                info!("[INTENT] Keyword classification: cli (keyword: '{}')", keyword);
                Layer::Cli
            }
            None => {
                debug!("[INTENT] Keyword classification: api (no keywords found)");
                Layer::Api
            }
        }
    }

    /// Reads a label from a classifier reply: a JSON object with `needs_cli` (optionally
    /// inside a markdown fence), or a bare `api` / `cli` word.
    pub fn parse_label(response: &str) -> Option<Layer> {
        let mut body = response.trim();

        if let Some(start) = body.find("```") {
            let after = &body[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            body = match after.find("```") {
                Some(end) => after[..end].trim(),
                None => after.trim(),
            };
        }

        if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}'))
            && open < close
        {
            let value: serde_json::Value = serde_json::from_str(&body[open..=close]).ok()?;
            return match value.get("needs_cli")? {
                serde_json::Value::Bool(true) => Some(Layer::Cli),
                serde_json::Value::Bool(false) => Some(Layer::Api),
                _ => None,
            };
        }

        let word = body
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        word.parse().ok()
    }

    fn cached(&self, text: &str) -> Option<Layer> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(text)
    }
}
