use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use heizwire_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    source: &'a str,
    sequence: u64,
    size: usize,
    body: String,
    timestamp: String,
}

/// Print one extracted message to stdout.
///
/// `sequence` counts messages from 1 for the lifetime of the command.
pub fn print_message(message: &Message, source: &str, sequence: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                source,
                sequence,
                size: message.len(),
                body: body_preview(message.body()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "SIZE", "SOURCE", "BODY"])
                .add_row(vec![
                    sequence.to_string(),
                    message.len().to_string(),
                    source.to_string(),
                    body_preview(message.body()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "seq={} size={} source={} body={}",
                sequence,
                message.len(),
                source,
                body_preview(message.body())
            );
        }
        OutputFormat::Raw => {
            print_raw(message.as_bytes());
        }
    }
}

/// Write bytes verbatim, terminator included, so raw output can be replayed.
pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
