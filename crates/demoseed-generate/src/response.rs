//! Pulling the record array out of free-form model output.

use serde_json::Value;

/// Extract the first balanced JSON array from a model answer.
///
/// Code fences are stripped and trailing commas before `]` or `}` removed.
/// Text around the array is ignored, including bracketed prose such as
/// `[Summit Outfitters]` or `[1]` ahead of the records: the first bracket
/// that opens an array of objects wins.
pub fn extract_json_array(text: &str) -> Result<Vec<Value>, String> {
    let cleaned = strip_code_fences(text);
    let mut starts = cleaned.match_indices('[').map(|(start, _)| start).peekable();
    let Some(&first) = starts.peek() else {
        return Err("no JSON array in response".to_string());
    };
    if balanced_array(&cleaned[first..]).is_none() {
        return Err("JSON array is not closed (answer truncated?)".to_string());
    }

    let mut first_error = None;
    for start in starts {
        let Some(slice) = balanced_array(&cleaned[start..]) else {
            continue;
        };
        match parse_array(slice) {
            Ok(items) if items.iter().all(Value::is_object) => return Ok(items),
            Ok(_) => {
                first_error.get_or_insert_with(|| "JSON array holds non-object items".to_string());
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| "no JSON array in response".to_string()))
}

fn parse_array(slice: &str) -> Result<Vec<Value>, String> {
    let parsed = match serde_json::from_str::<Value>(slice) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&remove_trailing_commas(slice))
            .map_err(|err| format!("invalid JSON array: {err}"))?,
    };

    match parsed {
        Value::Array(items) => Ok(items),
        _ => Err("response is not a JSON array".to_string()),
    }
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Balanced `[...]` slice starting at the first `[` of `text`.
fn balanced_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_fences_and_prose() {
        let text = "Here are your records:\n```json\n[{\"name\": \"Ada\"}]\n```\nEnjoy!";
        assert_eq!(extract_json_array(text).unwrap(), vec![json!({"name": "Ada"})]);
    }

    #[test]
    fn brackets_inside_strings_do_not_end_the_array() {
        let text = r#"[{"name": "Tent [2p]", "note": "say \"]\" loudly"}] trailing [1]"#;
        let items = extract_json_array(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], json!("Tent [2p]"));
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        let text = "[{\"a\": 1, \"b\": \"x,]\",}, {\"a\": 2},\n]";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items, vec![json!({"a": 1, "b": "x,]"}), json!({"a": 2})]);
    }

    #[test]
    fn bracketed_prose_before_the_array_is_skipped() {
        let text = "Here are 2 records for [Summit Outfitters]:\n[{\"email\": \"a@x.com\"}, {\"email\": \"b@x.com\"}]";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items, vec![json!({"email": "a@x.com"}), json!({"email": "b@x.com"})]);
    }

    #[test]
    fn nested_arrays_inside_objects_are_not_taken_alone() {
        let text = "Note [1]: tags follow.\n[{\"tags\": [\"a\", \"b\"]}]";
        assert_eq!(extract_json_array(text).unwrap(), vec![json!({"tags": ["a", "b"]})]);
    }

    #[test]
    fn truncated_or_missing_arrays_are_errors() {
        assert!(extract_json_array("[{\"a\": 1}, {\"a\":").unwrap_err().contains("not closed"));
        assert!(extract_json_array("I cannot help with that.").unwrap_err().contains("no JSON array"));
    }
}
