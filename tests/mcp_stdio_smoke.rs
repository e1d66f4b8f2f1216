use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

/// Drives the `mcp` subcommand over stdin/stdout and checks the JSON-RPC
/// handshake, tool listing, and graceful error handling for an
/// unconfigured engine (no `config.yaml` is present in the test's temp
/// working directory, so every engine lookup fails fast without needing
/// to load a model).
#[test]
fn mcp_stdio_smoke() {
    let bin = env!("CARGO_BIN_EXE_dbsv");
    let workdir = tempfile::tempdir().unwrap();

    let mut child = Command::new(bin)
        .arg("mcp")
        .current_dir(workdir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn dbsv mcp");

    {
        let stdin = child.stdin.as_mut().expect("child stdin");

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": { "protocolVersion": "2024-11-05" }
            })
        )
        .unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/list"
            })
        )
        .unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {
                    "name": "search_documents",
                    "arguments": { "query": "anything" }
                }
            })
        )
        .unwrap();
    }

    drop(child.stdin.take());

    let stdout = child.stdout.take().expect("child stdout");
    let reader = BufReader::new(stdout);

    let mut replies_by_id: HashMap<i64, serde_json::Value> = HashMap::new();
    for line in reader.lines() {
        let line = line.expect("read stdout line");
        if line.trim().is_empty() {
            continue;
        }
        let v: serde_json::Value = serde_json::from_str(&line).expect("stdout is json");
        if let Some(id) = v.get("id").and_then(|x| x.as_i64()) {
            replies_by_id.insert(id, v);
        }
        if replies_by_id.len() >= 3 {
            break;
        }
    }

    let status = child.wait().expect("wait child");
    assert!(status.success(), "mcp process should exit cleanly");

    {
        let v = replies_by_id.get(&1).expect("initialize reply");
        let result = v.get("result").expect("initialize result");
        assert!(result.get("capabilities").is_some());
    }

    {
        let v = replies_by_id.get(&2).expect("tools/list reply");
        let tools = v
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .expect("tools array");
        let names: std::collections::HashSet<&str> = tools
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .collect();
        assert!(names.contains("search_documents"));
        assert!(names.contains("search_sql_logs"));
    }

    {
        let v = replies_by_id.get(&3).expect("tools/call reply");
        let result = v.get("result").expect("tools/call result");
        assert_eq!(
            result.get("isError").and_then(|x| x.as_bool()),
            Some(true),
            "unconfigured engine should surface as a tool error, not a crash"
        );
    }
}
