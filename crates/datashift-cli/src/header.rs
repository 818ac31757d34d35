use std::path::Path;

use datashift_config::AppConfig;

/// Print the command header with a configuration summary.
pub fn print_header(command: &str, config: &AppConfig, config_file: Option<&Path>) {
    let version = env!("CARGO_PKG_VERSION");
    let migrations = &config.migrations;

    let data_dirs = if migrations.data_dirs.is_empty() {
        "none".to_string()
    } else {
        migrations
            .data_dirs
            .iter()
            .map(|d| display_path(d))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let config_file = config_file
        .map(display_path)
        .unwrap_or_else(|| "defaults".to_string());
    let mode = if migrations.dry_run { "dry run" } else { "live" };

    // Layout
    let width = 70;
    let label_w = 14;
    let value_w = width - label_w - 5; // "│ " + " " + "│" + padding

    let title = format!("datashift v{version}");
    let title_dashes = width - 2 - title.len() - 5; // 2 for ╭╮, 5 for "─── " + " "
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |l: &str, r: &str| format!("│ {l:<label_w$} {:<value_w$} │", truncate(r, value_w));

    println!("{top}");
    println!("{}", row("Command", command));
    println!("{}", row("Database", &display_path(&config.database.path)));
    println!(
        "{}",
        row(
            "Table",
            &format!(
                "{} ({}, {})",
                migrations.table, migrations.column, migrations.type_column
            )
        )
    );
    println!("{}", row("Migrations", &display_path(&migrations.directory)));
    println!("{}", row("Data dirs", &data_dirs));
    println!("{}", row("Config", &config_file));
    println!("{}", row("Mode", mode));
    println!("{bottom}");
}

/// Path with the home directory shortened to `~`.
fn display_path(path: &Path) -> String {
    let shown = path.to_string_lossy().to_string();
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => shown.replace(&home, "~"),
        _ => shown,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_values() {
        assert_eq!(truncate("short", 10), "short");
        let long = truncate("a/very/long/path/to/the/migrations", 10);
        assert_eq!(long.chars().count(), 10);
        assert!(long.ends_with('…'));
    }
}
