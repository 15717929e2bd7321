/// Pulls a single SQL statement out of free-form LLM text.
///
/// Tries, in order: a fenced ` ```sql ` block, a fenced generic ` ``` `
/// block, then a bare `SELECT`/`WITH` clause up to the first semicolon.
/// This is the one extraction helper both the teacher's
/// `RefinerAgent::extract_sql` and the upstream `sql_generator._extract_sql`
/// independently reinvented; this rewrite keeps a single copy.
pub fn extract_sql(content: &str) -> Option<String> {
    if let Some(fenced) = extract_fenced_block(content, Some("sql")) {
        return Some(normalize_sql(&fenced));
    }
    if let Some(fenced) = extract_fenced_block(content, None) {
        return Some(normalize_sql(&fenced));
    }

    let upper = content.to_uppercase();
    let start = upper
        .find("SELECT")
        .into_iter()
        .chain(upper.find("WITH"))
        .min()?;
    let rest = &content[start..];
    let stmt = match rest.find(';') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    Some(normalize_sql(stmt))
}

fn normalize_sql(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    format!("{trimmed};")
}

/// Pulls a JSON object/array out of free-form LLM text, mirroring
/// `SelectorAgent::extract_json`'s three-strategy fallback.
pub fn extract_json(content: &str) -> String {
    if let Some(fenced) = extract_fenced_block(content, Some("json")) {
        return fenced.trim().to_string();
    }
    if let Some(fenced) = extract_fenced_block(content, None) {
        return fenced.trim().to_string();
    }
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end >= start {
            return content[start..=end].trim().to_string();
        }
    }
    content.trim().to_string()
}

fn extract_fenced_block(content: &str, language: Option<&str>) -> Option<String> {
    let fence_start = content.find("```")?;
    let after_fence = &content[fence_start + 3..];

    let (first_line_end, body_start) = match after_fence.find('\n') {
        Some(idx) => (idx, idx + 1),
        None => (after_fence.len(), after_fence.len()),
    };
    let first_line = after_fence[..first_line_end].trim().to_lowercase();

    if let Some(lang) = language {
        if first_line != lang {
            return None;
        }
    }

    let body = &after_fence[body_start..];
    let fence_end = body.find("```")?;
    Some(body[..fence_end].to_string())
}
