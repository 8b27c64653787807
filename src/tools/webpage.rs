//! 网页内容提取工具
//!
//! 带超时与浏览器请求头抓取 URL，剔除 script/style/nav/footer/header 区块后
//! 用 html2text 提取可读文本并压平空白。按契约，任何抓取/解析失败都返回
//! 结构化失败描述（JSON 文本，含原始 URL），绝不向外抛错。

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

/// 网页提取工具：抓取任意 URL 并提取正文文本
pub struct WebpageTool {
    client: Client,
    max_result_chars: usize,
}

/// 字节级大小写无关查找（标签名均为 ASCII，偏移必落在字符边界上）
fn find_ci(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|i| i + from)
}

/// 剔除整个 `<tag ...>...</tag>` 区块；未闭合时丢弃其后全部内容
fn remove_tag_blocks(html: &str, tag: &str) -> String {
    let bytes = html.as_bytes();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let mut out = String::with_capacity(html.len());
    let mut pos = 0usize;

    while let Some(start) = find_ci(bytes, open.as_bytes(), pos) {
        let after = start + open.len();
        // 仅匹配完整标签名（后随 >、空白或 /），避免 <head 命中 <header
        let is_tag = bytes
            .get(after)
            .map(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
            .unwrap_or(false);
        if !is_tag {
            out.push_str(&html[pos..after]);
            pos = after;
            continue;
        }

        out.push_str(&html[pos..start]);
        match find_ci(bytes, close.as_bytes(), after) {
            Some(close_start) => match bytes[close_start..].iter().position(|b| *b == b'>') {
                Some(gt) => pos = close_start + gt + 1,
                None => return out,
            },
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

impl WebpageTool {
    pub fn new(timeout_secs: u64, max_result_chars: usize) -> Self {
        // 移动端浏览器身份，部分站点对无头客户端直接拒绝
        const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers({
                use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                        .parse()
                        .unwrap(),
                );
                h.insert(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9".parse().unwrap());
                h
            })
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_result_chars,
        }
    }

    /// HTML -> 压平为单行可读文本
    fn extract_text(&self, html: &str) -> String {
        let mut cleaned = html.to_string();
        for tag in ["script", "style", "nav", "footer", "header"] {
            cleaned = remove_tag_blocks(&cleaned, tag);
        }
        let text = match from_read(cleaned.as_bytes(), 120) {
            Ok(t) if !t.trim().is_empty() => t,
            _ => strip_html_tags(&cleaned),
        };
        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() > self.max_result_chars {
            flat.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            flat
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        Ok(self.extract_text(&body))
    }
}

#[async_trait]
impl Tool for WebpageTool {
    fn name(&self) -> &str {
        "extract_webpage"
    }

    fn description(&self) -> &str {
        "提取网页正文内容（用户询问某个网址时使用）。Args: {\"url\": \"https://...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        tracing::info!(url = %url, "extract_webpage fetch");

        match self.fetch(url).await {
            Ok(content) => Ok(content),
            // 失败作为结构化描述返回，LLM 可将其转述给用户
            Err(e) => Ok(serde_json::json!({
                "success": false,
                "error": e,
                "url": url,
            })
            .to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_tag_blocks() {
        let html = "<html><head><script>var x=1;</script></head>\
                    <body><NAV>菜单</NAV><p>正文</p><footer>版权</footer></body></html>";
        let mut cleaned = html.to_string();
        for tag in ["script", "style", "nav", "footer", "header"] {
            cleaned = remove_tag_blocks(&cleaned, tag);
        }
        assert!(!cleaned.contains("var x=1"));
        assert!(!cleaned.contains("菜单"));
        assert!(!cleaned.contains("版权"));
        assert!(cleaned.contains("正文"));
    }

    #[test]
    fn test_header_not_confused_with_head() {
        let html = "<head><title>标题</title></head><header>导航</header><p>内容</p>";
        let cleaned = remove_tag_blocks(html, "header");
        assert!(cleaned.contains("标题"));
        assert!(!cleaned.contains("导航"));
        assert!(cleaned.contains("内容"));
    }

    #[test]
    fn test_extract_text_flattens_whitespace() {
        let tool = WebpageTool::new(1, 8000);
        let text = tool.extract_text("<p>第一段</p>\n\n\n<p>第二段   多空格</p>");
        assert!(!text.contains('\n'));
        assert!(text.contains("第一段"));
        assert!(text.contains("第二段"));
    }

    #[tokio::test]
    async fn test_failure_descriptor_contains_url() {
        let tool = WebpageTool::new(1, 8000);
        let out = tool
            .execute(serde_json::json!({ "url": "not-a-valid-url" }))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["url"], "not-a-valid-url");
        assert!(parsed["error"].as_str().unwrap().len() > 0);
    }
}
