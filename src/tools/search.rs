//! 互联网搜索工具
//!
//! 委托 Tavily 搜索 API，结果条数受 max_results 约束，格式化为编号文本。
//! 未配置 API Key 或请求失败时返回 Err，由运行时转为观察文本。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::SearchSection;
use crate::tools::Tool;

/// Tavily 搜索端点
pub const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// 搜索工具：外部搜索 API 的薄封装
pub struct SearchTool {
    client: Client,
    api_key: Option<String>,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearchTool {
    pub fn new(api_key: Option<String>, max_results: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            max_results,
        }
    }

    /// 按 [tools.search] 配置段创建，API Key 从配置指定的环境变量读取
    pub fn from_config(cfg: &SearchSection) -> Self {
        let api_key = std::env::var(&cfg.api_key_env).ok();
        Self::new(api_key, cfg.max_results, cfg.timeout_secs)
    }

    fn format_results(results: &[SearchResult]) -> String {
        if results.is_empty() {
            return "未找到相关结果".to_string();
        }
        let mut out = String::from("搜索结果：\n");
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   {}\n   {}\n", i + 1, r.title, r.url, r.content));
        }
        out
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "搜索互联网信息。Args: {\"query\": \"搜索关键词\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or("未配置搜索 API Key（TAVILY_API_KEY）")?;
        tracing::info!(query = %query, "search tool");

        let resp = self
            .client
            .post(TAVILY_API_URL)
            .json(&serde_json::json!({
                "api_key": api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| format!("Search request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Search HTTP {}", resp.status()));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("Search response parse: {}", e))?;

        let mut results = parsed.results;
        results.truncate(self.max_results);
        Ok(Self::format_results(&results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results() {
        let results = vec![
            SearchResult {
                title: "Rust 官网".to_string(),
                url: "https://www.rust-lang.org".to_string(),
                content: "一门系统编程语言".to_string(),
            },
            SearchResult {
                title: "Tokio".to_string(),
                url: "https://tokio.rs".to_string(),
                content: "异步运行时".to_string(),
            },
        ];
        let out = SearchTool::format_results(&results);
        assert!(out.starts_with("搜索结果："));
        assert!(out.contains("1. Rust 官网"));
        assert!(out.contains("2. Tokio"));
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(SearchTool::format_results(&[]), "未找到相关结果");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_err() {
        let tool = SearchTool::new(None, 2, 1);
        let err = tool
            .execute(serde_json::json!({ "query": "rust" }))
            .await
            .unwrap_err();
        assert!(err.contains("API Key"));
    }
}
