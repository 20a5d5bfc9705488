use crate::ipc;
use serde_json::json;
use std::path::PathBuf;

const USAGE: &str = "usage:
  quizd --workspace DIR import-students [CSV_PATH]
  quizd --workspace DIR import-questions [--test TEST_ID] JSON_PATH...

With no arguments, quizd serves the JSON IPC protocol on stdin/stdout.
import-students defaults to questions/participants.csv under the workspace.
import-questions targets the most recently created test unless --test is given.";

/// One-shot command mode. Shares the IPC handlers so the scriptable form and
/// the interactive form behave identically.
pub fn run(args: &[String]) -> i32 {
    let mut workspace: Option<PathBuf> = None;
    let mut test_id: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--workspace" => {
                i += 1;
                let Some(v) = args.get(i) else {
                    eprintln!("--workspace requires a directory\n{}", USAGE);
                    return 2;
                };
                workspace = Some(PathBuf::from(v));
            }
            "--test" => {
                i += 1;
                let Some(v) = args.get(i) else {
                    eprintln!("--test requires a test id\n{}", USAGE);
                    return 2;
                };
                test_id = Some(v.clone());
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                return 0;
            }
            other if other.starts_with("--") => {
                eprintln!("unknown flag: {}\n{}", other, USAGE);
                return 2;
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let Some(workspace) = workspace else {
        eprintln!("missing --workspace\n{}", USAGE);
        return 2;
    };
    let Some(command) = positional.first().cloned() else {
        eprintln!("missing command\n{}", USAGE);
        return 2;
    };
    let file_args = &positional[1..];

    let (method, params) = match command.as_str() {
        "import-students" => {
            let path = match file_args {
                [] => workspace.join("questions").join("participants.csv"),
                [p] => PathBuf::from(p),
                _ => {
                    eprintln!("import-students takes at most one CSV path\n{}", USAGE);
                    return 2;
                }
            };
            (
                "students.importCsv",
                json!({ "path": path.to_string_lossy() }),
            )
        }
        "import-questions" => {
            if file_args.is_empty() {
                eprintln!("import-questions requires at least one JSON path\n{}", USAGE);
                return 2;
            }
            let mut params = json!({ "paths": file_args });
            if let Some(id) = &test_id {
                params["testId"] = json!(id);
            }
            ("quizzes.importQuestions", params)
        }
        other => {
            eprintln!("unknown command: {}\n{}", other, USAGE);
            return 2;
        }
    };

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    let select = ipc::handle_request(
        &mut state,
        ipc::Request {
            id: "cli-workspace".to_string(),
            method: "workspace.select".to_string(),
            params: json!({ "path": workspace.to_string_lossy() }),
        },
    );
    if select.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        eprintln!("{}", select);
        return 1;
    }

    let resp = ipc::handle_request(
        &mut state,
        ipc::Request {
            id: "cli".to_string(),
            method: method.to_string(),
            params,
        },
    );
    if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        eprintln!("{}", resp);
        return 1;
    }

    let result = resp.get("result").cloned().unwrap_or(json!({}));
    println!("{}", result);

    // Skips are expected (idempotent re-imports); failed files are not.
    let failed = result.get("failed").and_then(|v| v.as_i64()).unwrap_or(0);
    if failed > 0 {
        return 1;
    }
    0
}
