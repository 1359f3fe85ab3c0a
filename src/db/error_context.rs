//! Error context for failed up/down scripts.

use sqlx::postgres::{PgDatabaseError, PgErrorPosition};

/// What went wrong while running a migration script
#[derive(Debug, Clone)]
pub struct ScriptErrorContext {
    pub message: String,
    /// Line in the script, when the engine reports a position
    pub line_number: Option<usize>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// Engine error code (SQLSTATE for PostgreSQL and MySQL)
    pub code: Option<String>,
}

impl ScriptErrorContext {
    pub fn from_sqlx_error(error: &sqlx::Error, script: &str) -> Self {
        let Some(db_error) = error.as_database_error() else {
            return Self::plain(error.to_string());
        };

        // Only PostgreSQL reports a character position and hints
        if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
            let line_number = pg_error.position().map(|pos| match pos {
                PgErrorPosition::Original(p) => position_to_line(script, p),
                PgErrorPosition::Internal { position, .. } => position_to_line(script, position),
            });

            return Self {
                message: pg_error.message().to_string(),
                line_number,
                detail: pg_error.detail().map(str::to_string),
                hint: pg_error.hint().map(str::to_string),
                code: Some(pg_error.code().to_string()),
            };
        }

        Self {
            message: db_error.message().to_string(),
            line_number: None,
            detail: None,
            hint: None,
            code: db_error.code().map(|c| c.to_string()),
        }
    }

    fn plain(message: String) -> Self {
        Self {
            message,
            line_number: None,
            detail: None,
            hint: None,
            code: None,
        }
    }

    /// One-line form used in failure reports
    pub fn summary(&self) -> String {
        match self.line_number {
            Some(line) => format!("{} (line {})", self.message, line),
            None => self.message.clone(),
        }
    }

    /// Multi-line form with surrounding script lines, used in logs
    pub fn format(&self, label: &str, script: &str) -> String {
        let mut msg = format!("SQL error in {}", label);
        if let Some(line) = self.line_number {
            msg.push_str(&format!(" at line {}", line));
        }
        msg.push_str(&format!(":\n\n  {}\n", self.message));

        if let Some(code) = &self.code {
            msg.push_str(&format!("\n  Code: {}", code));
        }
        if let Some(detail) = &self.detail {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        if let Some(line) = self.line_number {
            msg.push_str(&format!("\n\n{}", format_line_context(script, line)));
        }

        msg
    }
}

/// Convert 1-indexed character position to line number
pub fn position_to_line(content: &str, position: usize) -> usize {
    content
        .chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

/// Script lines around the failing one, with the failing line marked
pub fn format_line_context(content: &str, error_line: usize) -> String {
    const CONTEXT_LINES: usize = 2;

    let lines: Vec<&str> = content.lines().collect();
    let error_idx = error_line.saturating_sub(1);
    let start = error_idx.saturating_sub(CONTEXT_LINES);
    let end = (error_idx + CONTEXT_LINES + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| {
            let line_num = start + offset + 1;
            let marker = if line_num == error_line { ">" } else { " " };
            format!("  {} {:4} | {}", marker, line_num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
