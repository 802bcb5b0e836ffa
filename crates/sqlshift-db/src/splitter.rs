//! Line-oriented statement splitting that keeps trigger bodies intact.
//!
//! A trigger body (`CREATE TRIGGER ... BEGIN ...; ...; END;`) contains
//! terminators of its own, so splitting on every `;` would cut it into
//! fragments that fail or, worse, partially apply. The splitter instead
//! works a line at a time:
//!
//! * full-line `--` comments and blank lines are dropped;
//! * outside a trigger, a statement ends at a line whose trimmed text ends
//!   with `;`;
//! * from a `CREATE [TEMP|TEMPORARY] TRIGGER` line up to a line that is
//!   exactly `END;` (any case), everything is one statement.
//!
//! Limitation: a string literal that spans lines and has a line ending in
//! `;` is split at that line. A `;` inside a line never splits.

const COMMENT_MARKER: &str = "--";
const TERMINATOR: char = ';';
const BLOCK_END: &str = "END;";

/// Split one script into individually executable statements, in order.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut in_trigger_body = false;
    // Postgres triggers have no BEGIN block and end at their first `;`.
    let mut saw_begin = false;

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            continue;
        }

        if in_trigger_body {
            buffer.push(line);
            saw_begin = saw_begin || has_begin_keyword(trimmed);
            if trimmed.eq_ignore_ascii_case(BLOCK_END)
                || (!saw_begin && trimmed.ends_with(TERMINATOR))
            {
                flush(&mut buffer, &mut statements);
                in_trigger_body = false;
            }
            continue;
        }

        if starts_trigger(trimmed) {
            flush(&mut buffer, &mut statements);
            buffer.push(line);
            saw_begin = has_begin_keyword(trimmed);
            let done = if saw_begin {
                ends_block(trimmed)
            } else {
                trimmed.ends_with(TERMINATOR)
            };
            if done {
                flush(&mut buffer, &mut statements);
            } else {
                in_trigger_body = true;
            }
            continue;
        }

        buffer.push(line);
        if trimmed.ends_with(TERMINATOR) {
            flush(&mut buffer, &mut statements);
        }
    }

    flush(&mut buffer, &mut statements);
    statements
}

fn flush(buffer: &mut Vec<&str>, statements: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let statement = buffer.join("\n").trim().to_string();
    buffer.clear();
    if !statement.is_empty() {
        statements.push(statement);
    }
}

fn starts_trigger(trimmed: &str) -> bool {
    let mut words = trimmed.split_whitespace();
    if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("CREATE")) {
        return false;
    }
    match words.next() {
        Some(w) if w.eq_ignore_ascii_case("TRIGGER") => true,
        Some(w) if w.eq_ignore_ascii_case("TEMP") || w.eq_ignore_ascii_case("TEMPORARY") => {
            words.next().is_some_and(|w| w.eq_ignore_ascii_case("TRIGGER"))
        }
        _ => false,
    }
}

fn has_begin_keyword(trimmed: &str) -> bool {
    trimmed
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| word.eq_ignore_ascii_case("BEGIN"))
}

/// A one-line trigger such as `... BEGIN DELETE FROM t; END;`.
fn ends_block(trimmed: &str) -> bool {
    let upper = trimmed.to_ascii_uppercase();
    match upper.strip_suffix(BLOCK_END) {
        Some("") => true,
        Some(rest) => rest.ends_with(|c: char| c.is_whitespace() || c == TERMINATOR),
        None => false,
    }
}

/// Collapse whitespace and cut a statement down for error messages.
pub fn preview(statement: &str, max_chars: usize) -> String {
    let collapsed = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements_and_drops_comments() {
        let script = "-- users\nCREATE TABLE users (\n  id INTEGER PRIMARY KEY,\n  name TEXT\n);\n\n  -- indented comment\nCREATE INDEX idx_users_name ON users(name);\n";
        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE users (\n  id INTEGER PRIMARY KEY,\n  name TEXT\n);",
                "CREATE INDEX idx_users_name ON users(name);",
            ]
        );
    }

    #[test]
    fn trigger_block_stays_atomic() {
        let script = "\
CREATE TRIGGER t AFTER INSERT ON gists
BEGIN
  INSERT INTO gist_log (gist_id) VALUES (new.id);
  UPDATE gists SET updated = 1 WHERE id = new.id;
END;
CREATE INDEX idx ON gists(id);";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TRIGGER t"));
        assert!(statements[0].ends_with("END;"));
        assert!(statements[0].contains("UPDATE gists SET updated = 1"));
        assert_eq!(statements[1], "CREATE INDEX idx ON gists(id);");
    }

    #[test]
    fn trigger_keywords_are_case_insensitive() {
        let script = "create temp trigger t after delete on a begin\n  delete from b;\nend;\nselect 1;";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("end;"));
        assert_eq!(statements[1], "select 1;");
    }

    #[test]
    fn single_line_trigger_is_emitted_at_once() {
        let script = "CREATE TRIGGER t AFTER INSERT ON a BEGIN DELETE FROM b; END;\nCREATE TABLE c (id INTEGER);";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "CREATE TABLE c (id INTEGER);");
    }

    #[test]
    fn begin_less_trigger_ends_at_first_terminator() {
        let script = "CREATE TRIGGER gists_touch BEFORE UPDATE ON gists\n  FOR EACH ROW EXECUTE FUNCTION touch();\nCREATE INDEX idx ON gists(id);";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("touch();"));
    }

    #[test]
    fn identifier_ending_in_end_does_not_close_one_line_trigger() {
        assert!(!ends_block("BEGIN SELECT 1 FROM legend;"));
        assert!(ends_block("BEGIN SELECT 1; END;"));
        assert!(ends_block("end;"));
    }

    #[test]
    fn unterminated_pending_statement_is_flushed_before_trigger() {
        let script = "CREATE TABLE a (id INTEGER)\nCREATE TRIGGER t AFTER INSERT ON a BEGIN\n SELECT 1;\nEND;";
        let statements = split_statements(script);
        assert_eq!(statements[0], "CREATE TABLE a (id INTEGER)");
        assert!(statements[1].starts_with("CREATE TRIGGER"));
    }

    #[test]
    fn trailing_statement_without_terminator_is_kept() {
        let statements = split_statements("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)");
        assert_eq!(statements, vec!["CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"]);
    }

    #[test]
    fn comment_only_script_yields_nothing() {
        assert!(split_statements("-- nothing here\n\n   \n").is_empty());
    }

    #[test]
    fn mid_line_terminator_in_literal_is_not_split() {
        let statements =
            split_statements("INSERT INTO settings VALUES ('sep', ';');\nSELECT 1;");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO settings VALUES ('sep', ';');");
    }

    #[test]
    fn line_final_terminator_inside_literal_splits() {
        // Known limitation of line-based splitting.
        let script = "INSERT INTO notes (body) VALUES ('first line;\nsecond line');";
        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec!["INSERT INTO notes (body) VALUES ('first line;", "second line');"]
        );
    }

    #[test]
    fn preview_collapses_and_truncates() {
        assert_eq!(preview("SELECT\n   1;", 80), "SELECT 1;");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
