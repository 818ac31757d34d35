//! Splitting SQL scripts into individual statements.

/// Split a script on `;`, ignoring semicolons inside quoted text, comments
/// and `CREATE TRIGGER ... BEGIN ... END` bodies. Comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(close) = quote {
            current.push(c);
            if c == close {
                // A doubled closing quote is an escaped quote.
                if let Some(escaped) = chars.next_if_eq(&close) {
                    current.push(escaped);
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '[' => {
                quote = Some(']');
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                current.push(' ');
            }
            ';' if inside_trigger_body(&current) => current.push(c),
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}

/// Whether `partial` is a trigger definition whose body is still open.
fn inside_trigger_body(partial: &str) -> bool {
    let words = keywords(partial);
    let mut iter = words.iter().map(String::as_str);

    if iter.next() != Some("CREATE") {
        return false;
    }
    let is_trigger = match iter.next() {
        Some("TEMP" | "TEMPORARY") => iter.next() == Some("TRIGGER"),
        Some("TRIGGER") => true,
        _ => false,
    };
    if !is_trigger {
        return false;
    }

    let mut depth = 0usize;
    let mut began = false;
    for word in &words {
        match word.as_str() {
            "BEGIN" => {
                began = true;
                depth += 1;
            }
            "CASE" => depth += 1,
            "END" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    !began || depth > 0
}

/// Upper-cased bare words of `sql`, skipping quoted text.
fn keywords(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        if let Some(close) = quote {
            if c == close {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            c if c.is_ascii_alphanumeric() || c == '_' => {
                word.push(c.to_ascii_uppercase());
                continue;
            }
            _ => {}
        }
        if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}
