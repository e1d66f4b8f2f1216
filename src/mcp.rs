use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::config::Settings;
use crate::search::{render_results_text, SearchService};

/// Tool name → backing engine tag. Fixed at compile time, matching the
/// registry's closed-tag philosophy: there are exactly two agent-tool
/// entry points and each always talks to one engine.
const SEARCH_DOCUMENTS_ENGINE: &str = "md";
const SEARCH_SQL_LOGS_ENGINE: &str = "sql";

struct ServerState {
    settings: Settings,
    services: Mutex<HashMap<String, Arc<SearchService>>>,
    rt: tokio::runtime::Runtime,
}

impl ServerState {
    fn new(settings: Settings) -> anyhow::Result<Self> {
        Ok(Self {
            settings,
            services: Mutex::new(HashMap::new()),
            rt: tokio::runtime::Runtime::new()?,
        })
    }

    fn service_for(&self, engine_tag: &str) -> anyhow::Result<Arc<SearchService>> {
        if let Some(s) = self.services.lock().unwrap().get(engine_tag) {
            return Ok(Arc::clone(s));
        }
        let settings = self.settings.clone();
        let engine_tag_owned = engine_tag.to_string();
        let service = self
            .rt
            .block_on(async move { SearchService::new(&settings, &engine_tag_owned).await })?;
        let service = Arc::new(service);
        self.services.lock().unwrap().insert(engine_tag.to_string(), Arc::clone(&service));
        Ok(service)
    }

    fn tool_list(&self, id: serde_json::Value) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [
                    {
                        "name": "search_documents",
                        "description": "Hybrid vector+full-text search over ingested Markdown/text documents",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "query": { "type": "string" },
                                "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
                                "source_filter": { "type": "string" }
                            },
                            "required": ["query"]
                        }
                    },
                    {
                        "name": "search_sql_logs",
                        "description": "Hybrid vector+full-text search over ingested SQL query-log records",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "query": { "type": "string" },
                                "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
                                "source_filter": { "type": "string" },
                                "min_time": { "type": "number" }
                            },
                            "required": ["query"]
                        }
                    }
                ]
            }
        })
    }

    fn tool_call(&self, id: serde_json::Value, params: &serde_json::Value) -> serde_json::Value {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let ok = |text: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": text }], "isError": false }
            })
        };
        let err = |text: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": text }], "isError": true }
            })
        };

        let engine_tag = match name {
            "search_documents" => SEARCH_DOCUMENTS_ENGINE,
            "search_sql_logs" => SEARCH_SQL_LOGS_ENGINE,
            _ => return err(format!("Tool not found: {name}")),
        };

        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return err("Missing query".to_string());
        };
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
        let source_filter = args.get("source_filter").and_then(|v| v.as_str());
        let min_time = args.get("min_time").and_then(|v| v.as_f64());

        let service = match self.service_for(engine_tag) {
            Ok(s) => s,
            Err(e) => return err(format!("engine '{engine_tag}' unavailable: {e}")),
        };

        let result = self
            .rt
            .block_on(async move { service.execute_query(query, source_filter, limit, min_time).await });

        match result {
            Ok(results) => ok(render_results_text(&results)),
            Err(e) => err(format!("search failed: {e}")),
        }
    }
}

pub fn run_stdio_server(settings: Settings) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    let state = ServerState::new(settings)?;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let id = msg.get("id").cloned().unwrap_or(json!(null));
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");

        let reply = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": msg.get("params").and_then(|p| p.get("protocolVersion")).cloned().unwrap_or(json!("2024-11-05")),
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": { "name": "dbs-vector", "version": env!("CARGO_PKG_VERSION") }
                }
            }),
            "tools/list" => state.tool_list(id),
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(json!({}));
                state.tool_call(id, &params)
            }
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found" }
            }),
        };

        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    Ok(())
}
