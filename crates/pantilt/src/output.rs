use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one serializable record.
///
/// Tables and pretty output flatten nested objects into dotted keys
/// (`stats.frames_sent`), so every report renders the same way.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    let value = match serde_json::to_value(record) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("error: cannot render output: {err}");
            return;
        }
    };

    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, text) in flatten(&value) {
                table.add_row(vec![key, text]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, text) in flatten(&value) {
                println!("{key}={text}");
            }
        }
    }
}

/// Print rows under a header with the same table preset as records.
pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, field, out);
            }
        }
        Value::String(text) => out.push((prefix.to_string(), text.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_objects() {
        let value = serde_json::json!({
            "outcome": {"reason": "peer_closed"},
            "stats": {"frames_sent": 3},
        });
        assert_eq!(
            flatten(&value),
            vec![
                ("outcome.reason".to_string(), "peer_closed".to_string()),
                ("stats.frames_sent".to_string(), "3".to_string()),
            ]
        );
    }
}
