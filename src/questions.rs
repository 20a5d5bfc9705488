use serde_json::Value;

#[derive(Debug)]
pub struct ParsedQuiz {
    pub name: Option<String>,
    pub student: Option<String>,
    pub questions: Vec<ParsedQuestion>,
}

#[derive(Debug)]
pub struct ParsedQuestion {
    pub code_snippet: String,
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub teacher_note: String,
    pub penalty: f64,
    pub source: String,
}

/// Parse a quiz question file. The root is either an array of question
/// objects or an object with a "questions" list plus optional "name" and
/// "student" strings.
pub fn parse_quiz_payload(content: &str) -> anyhow::Result<ParsedQuiz> {
    let payload: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => anyhow::bail!("invalid JSON: {}", e),
    };

    let mut name: Option<String> = None;
    let mut student: Option<String> = None;
    let entries: &Vec<Value> = match &payload {
        Value::Object(obj) => {
            let Some(questions) = obj.get("questions") else {
                anyhow::bail!("expected a 'questions' list in the JSON object");
            };
            name = obj
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
            student = obj
                .get("student")
                .and_then(|v| v.as_str())
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
            match questions.as_array() {
                Some(list) => list,
                None => anyhow::bail!("'questions' must be a list"),
            }
        }
        Value::Array(list) => list,
        _ => anyhow::bail!("the JSON root must be either a list or an object with a 'questions' list"),
    };

    if entries.is_empty() {
        anyhow::bail!("provide at least one question in the 'questions' list");
    }

    let mut questions = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        questions.push(parse_question_entry(entry, i + 1)?);
    }

    Ok(ParsedQuiz {
        name,
        student,
        questions,
    })
}

/// Title resolution: "name - student" when both are present, else whichever
/// exists, else the uploaded file's stem.
pub fn quiz_title(parsed: &ParsedQuiz, fallback_stem: &str) -> String {
    match (&parsed.name, &parsed.student) {
        (Some(n), Some(s)) => format!("{} - {}", n, s),
        (Some(n), None) => n.clone(),
        (None, Some(s)) => s.clone(),
        (None, None) => {
            let stem = fallback_stem.trim();
            if stem.is_empty() {
                "Untitled quiz".to_string()
            } else {
                stem.to_string()
            }
        }
    }
}

fn parse_question_entry(entry: &Value, index: usize) -> anyhow::Result<ParsedQuestion> {
    let Some(obj) = entry.as_object() else {
        anyhow::bail!("entry #{} must be an object with question fields", index);
    };

    let question = obj
        .get("question")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let Some(question) = question else {
        anyhow::bail!("entry #{} is missing a non-empty 'question' field", index);
    };

    let answers_raw = obj.get("answers").and_then(|v| v.as_array());
    let Some(answers_raw) = answers_raw.filter(|a| !a.is_empty()) else {
        anyhow::bail!("entry #{} must include a non-empty 'answers' list", index);
    };

    let explicit_index = match obj.get("correct_answer_index") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => anyhow::bail!("entry #{} has non-integer 'correct_answer_index'", index),
        },
    };

    let mut correct_index: Option<i64> = explicit_index;
    let mut answers: Vec<String> = Vec::with_capacity(answers_raw.len());
    for (answer_index, raw_answer) in answers_raw.iter().enumerate() {
        let Some(raw) = raw_answer.as_str() else {
            anyhow::bail!(
                "entry #{} contains a non-string answer at position {}",
                index,
                answer_index + 1
            );
        };
        let mut normalized = raw.trim().to_string();
        if normalized.ends_with('*') {
            normalized = normalized.trim_end_matches('*').trim_end().to_string();
            // An explicit 'correct_answer_index' wins over the marker.
            if explicit_index.is_none() {
                if correct_index.is_some() {
                    anyhow::bail!(
                        "entry #{} marks more than one answer as correct (use '*' once)",
                        index
                    );
                }
                correct_index = Some(answer_index as i64);
            }
        }
        normalized = strip_choice_prefix(&normalized);
        answers.push(normalized);
    }

    let Some(correct_index) = correct_index else {
        anyhow::bail!(
            "entry #{} must include 'correct_answer_index' or mark one answer with '*'",
            index
        );
    };
    if correct_index < 0 || correct_index as usize >= answers.len() {
        anyhow::bail!(
            "entry #{} has 'correct_answer_index' out of range for the answers list",
            index
        );
    }

    let penalty_raw = match obj.get("weight") {
        Some(v) => Some(v),
        None => obj.get("penalty"),
    };
    let penalty = match penalty_raw {
        None => 0.0,
        Some(v) => match coerce_number(v) {
            Some(n) => n,
            None => anyhow::bail!("entry #{} has a non-numeric 'penalty'", index),
        },
    };

    let source = match obj.get("source") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => anyhow::bail!("entry #{} has a non-string 'source'", index),
    };

    Ok(ParsedQuestion {
        code_snippet: obj
            .get("code_snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        question,
        answers,
        correct_answer_index: correct_index as usize,
        explanation: obj
            .get("explanation")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        teacher_note: obj
            .get("teacher_note")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        penalty,
        source,
    })
}

// Answers often arrive pre-enumerated ("a) Paris"). Strip the prefix so the
// rendered choices don't double-letter.
fn strip_choice_prefix(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && matches!(bytes[0], b'a'..=b'f')
        && bytes[1] == b')'
    {
        return s[2..].trim_start().to_string();
    }
    s.to_string()
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        // Some exports quote the weight; accept numeric strings.
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
