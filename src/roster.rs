use serde_json::{json, Value};
use std::collections::HashMap;

pub struct RosterRow {
    pub line_no: usize,
    pub name: String,
    pub email: String,
    pub course: String,
    pub group: String,
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Parse a participants roster. Expected header: name,email,course,group
/// (column order is taken from the header, falling back to position).
/// Returns (rows, warnings, total data lines seen).
pub fn parse_roster_rows(text: &str) -> (Vec<RosterRow>, Vec<Value>, usize) {
    let mut warnings = Vec::new();
    let mut rows = Vec::new();
    let lines = text.lines().collect::<Vec<_>>();
    if lines.is_empty() {
        return (rows, warnings, 0);
    }

    let header_fields = parse_csv_record(lines[0])
        .into_iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    let mut idx = HashMap::<String, usize>::new();
    for (i, f) in header_fields.iter().enumerate() {
        idx.insert(f.clone(), i);
    }

    let name_col = idx.get("name").copied().unwrap_or(0);
    let email_col = idx.get("email").copied().unwrap_or(1);
    let course_col = idx.get("course").copied().unwrap_or(2);
    let group_col = idx.get("group").copied().unwrap_or(3);

    let mut total = 0usize;
    for (line_no, raw_line) in lines.iter().enumerate().skip(1) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        total += 1;
        let fields = parse_csv_record(line);

        let name = fields
            .get(name_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let email = fields
            .get(email_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if email.is_empty() {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "missing_email",
                "message": "email is required"
            }));
            continue;
        }
        if name.is_empty() {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "missing_name",
                "message": "name is required"
            }));
            continue;
        }
        let course = fields
            .get(course_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let group = fields
            .get(group_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        rows.push(RosterRow {
            line_no: line_no + 1,
            name,
            email,
            course,
            group,
        });
    }

    (rows, warnings, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_record_handles_quoted_commas() {
        let fields = parse_csv_record("\"Doe, Jane\",jane@x.com,\"CS \"\"101\"\"\",A");
        assert_eq!(fields[0], "Doe, Jane");
        assert_eq!(fields[1], "jane@x.com");
        assert_eq!(fields[2], "CS \"101\"");
        assert_eq!(fields[3], "A");
    }

    #[test]
    fn quote_roundtrips_through_parse() {
        let raw = "Doe, \"JD\" Jane";
        let quoted = csv_quote(raw);
        let fields = parse_csv_record(&quoted);
        assert_eq!(fields, vec![raw.to_string()]);
    }

    #[test]
    fn roster_rows_follow_header_order() {
        let text = "email,name,group,course\na@x.com,Alice,G1,CS101\n";
        let (rows, warnings, total) = parse_roster_rows(text);
        assert_eq!(total, 1);
        assert!(warnings.is_empty());
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].email, "a@x.com");
        assert_eq!(rows[0].course, "CS101");
        assert_eq!(rows[0].group, "G1");
    }

    #[test]
    fn roster_rows_skip_missing_email_with_warning() {
        let text = "name,email,course,group\nAlice,,CS101,A\nBob,bob@x.com,CS101,B\n";
        let (rows, warnings, total) = parse_roster_rows(text);
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "bob@x.com");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].get("code").and_then(|c| c.as_str()),
            Some("missing_email")
        );
        assert_eq!(warnings[0].get("line").and_then(|l| l.as_i64()), Some(2));
    }

    #[test]
    fn roster_rows_ignore_blank_lines() {
        let text = "name,email,course,group\n\nAlice,a@x.com,CS101,A\n\n";
        let (rows, warnings, total) = parse_roster_rows(text);
        assert_eq!(total, 1);
        assert!(warnings.is_empty());
        assert_eq!(rows[0].line_no, 3);
    }
}
