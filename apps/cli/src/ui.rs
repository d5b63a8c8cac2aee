//! Terminal output and prompts.

use serde::Serialize;
use snafu::ResultExt;
use smb_mount_core::{
    BatchResult, EntryOutcome, Error, MountDeclaration, Outcome, Progress, ResolvedMount, Result,
};

/// One row of `list` output.
#[derive(Debug, Serialize)]
pub struct ListRow {
    pub name: String,
    pub address: String,
    pub path: Option<String>,
    pub mounted: bool,
}

impl ListRow {
    /// Builds a row from a resolved entry.
    pub fn from_entry(entry: &ResolvedMount) -> Self {
        Self {
            name: entry.name().to_string(),
            address: entry.declaration.share_address(),
            path: entry.actual_path().map(|p| p.display().to_string()),
            mounted: entry.is_mounted,
        }
    }
}

/// Renders rows as an aligned table.
pub fn render_table(rows: &[ListRow]) -> String {
    let headers = ["NAME", "ADDRESS", "PATH", "STATUS"];
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|row| {
            [
                row.name.clone(),
                row.address.clone(),
                row.path.clone().unwrap_or_else(|| "-".to_string()),
                status_label(row.mounted).to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_line = |fields: [&str; 4]| {
        let line = fields
            .iter()
            .zip(widths)
            .map(|(field, width)| format!("{:<width$}", field, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_line(headers);
    for row in &cells {
        push_line([&row[0], &row[1], &row[2], &row[3]]);
    }
    out
}

fn status_label(mounted: bool) -> &'static str {
    if mounted { "mounted" } else { "unmounted" }
}

/// Label shown in the selection menu.
pub fn selection_label(entry: &ResolvedMount) -> String {
    format!(
        "{} ({}) [{}]",
        entry.name(),
        entry.declaration.share_address(),
        status_label(entry.is_mounted)
    )
}

/// Multi-select over `entries`. Returns `None` when the user cancels.
pub fn select_entries(prompt: &str, entries: &[ResolvedMount]) -> Result<Option<Vec<usize>>> {
    let labels: Vec<String> = entries.iter().map(selection_label).collect();
    dialoguer::MultiSelect::new()
        .with_prompt(prompt)
        .items(&labels)
        .interact_opt()
        .whatever_context("failed to read selection")
}

/// Asks for the password of an entry that has none configured.
pub fn prompt_password(declaration: &MountDeclaration) -> Result<String> {
    println!("Mounting: {}", declaration.name);
    println!("SMB Address: {}:{}", declaration.smb_addr, declaration.port());
    println!("Username: {}", declaration.username);
    println!();

    dialoguer::Password::new()
        .with_prompt("Enter password")
        .allow_empty_password(true)
        .interact()
        .whatever_context(format!("failed to read password for '{}'", declaration.name))
}

/// Prints per-entry progress lines while a batch runs.
pub struct CliProgress;

impl Progress for CliProgress {
    fn started(&mut self, index: usize, total: usize, entry: &ResolvedMount) {
        println!("[{}/{}] {}", index + 1, total, entry.name());
    }

    fn escalating(&mut self, _entry: &ResolvedMount, error: &Error) {
        println!("  {}", error);
        println!("  Privilege escalation required...");
    }

    fn finished(&mut self, _index: usize, _total: usize, outcome: &EntryOutcome) {
        let path = outcome
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match &outcome.outcome {
            Outcome::Mounted { .. } => println!("  Successfully mounted at {}", path),
            Outcome::AlreadyMounted => println!("  Already mounted at: {}", path),
            Outcome::Unmounted { .. } => println!("  Successfully unmounted {}", path),
            Outcome::AlreadyUnmounted => println!("  Not mounted: {}", path),
            Outcome::Failed { reason } => eprintln!("  Failed: {}", reason),
        }
        println!();
    }
}

/// Formats `"<Op> complete: N succeeded, M failed"`.
pub fn summary_line(operation: &str, result: &BatchResult) -> String {
    format!(
        "{} complete: {} succeeded, {} failed",
        operation, result.succeeded, result.failed
    )
}

/// Prints the summary line between rules.
pub fn print_summary(operation: &str, result: &BatchResult) {
    let rule = "=".repeat(42);
    println!("{}", rule);
    println!("{}", summary_line(operation, result));
    println!("{}", rule);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, mounted: bool) -> ListRow {
        ListRow {
            name: name.to_string(),
            address: format!("//nas.lan:445/{}", name),
            path: Some(format!("/srv/smb/{}", name)),
            mounted,
        }
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = render_table(&[row("media", true), row("backup-archive", false)]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        let status_col = lines[0].find("STATUS").unwrap();
        assert_eq!(lines[1].find("mounted"), Some(status_col));
        assert_eq!(lines[2].find("unmounted"), Some(status_col));
    }

    #[test]
    fn test_render_table_unresolved_path() {
        let mut r = row("media", false);
        r.path = None;
        let table = render_table(&[r]);
        assert!(table.lines().nth(1).unwrap().contains(" - "));
    }

    #[test]
    fn test_summary_line() {
        let result = BatchResult {
            outcomes: Vec::new(),
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(
            summary_line("Mount", &result),
            "Mount complete: 2 succeeded, 1 failed"
        );
    }

    #[test]
    fn test_list_row_json() {
        let json = serde_json::to_value(row("media", true)).unwrap();
        assert_eq!(json["name"], "media");
        assert_eq!(json["mounted"], true);
        assert_eq!(json["path"], "/srv/smb/media");
    }
}
