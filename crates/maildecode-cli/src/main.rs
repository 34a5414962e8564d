//! `maildecode` - inspect and decode MIME messages from the command line.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maildecode::{
    DEFAULT_MAX_DEPTH, DecodeConfig, DecodedMessage, DecoderManager, MessageDecoder, RawPart,
    structure,
};

#[derive(Parser)]
#[command(name = "maildecode", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Maximum multipart nesting depth
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH, env = "MAILDECODE_MAX_DEPTH")]
    max_depth: usize,

    /// Keep text bodies as lossy UTF-8 instead of converting their charset
    #[arg(long, global = true)]
    raw_charset: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a message and print its bodies and attachments
    Decode {
        file: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the part tree of a message
    Tree { file: PathBuf },
    /// Report structural problems and fallback decodes; exits 1 on warnings
    Validate { file: PathBuf },
    /// Find a part by Content-ID
    Cid { file: PathBuf, id: String },
    /// List the supported transfer encodings
    Encodings,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DecodeConfig::builder()
        .max_depth(cli.max_depth)
        .decode_charsets(!cli.raw_charset)
        .build();
    let decoder = MessageDecoder::with_config(DecoderManager::global(), config);

    match &cli.command {
        Commands::Decode { file, json } => cmd_decode(&decoder, file, *json)?,
        Commands::Tree { file } => cmd_tree(&decoder, file)?,
        Commands::Validate { file } => return cmd_validate(&decoder, file),
        Commands::Cid { file, id } => return cmd_cid(&decoder, file, id),
        Commands::Encodings => cmd_encodings(),
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "maildecode=info",
        1 => "maildecode=debug",
        _ => "maildecode=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(decoder: &MessageDecoder<'_>, path: &Path) -> anyhow::Result<(RawPart, DecodedMessage)> {
    let raw = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    info!(path = %path.display(), bytes = raw.len(), "decoding message");
    decoder
        .decode_message_with_tree(&raw)
        .with_context(|| format!("cannot decode {}", path.display()))
}

/// JSON view of a decoded message; attachment content is summarized.
#[derive(Serialize)]
struct MessageReport<'a> {
    headers: &'a std::collections::HashMap<String, String>,
    subject: Option<String>,
    text_body: &'a str,
    html_body: &'a str,
    attachments: Vec<AttachmentReport<'a>>,
    warnings: &'a [String],
}

#[derive(Serialize)]
struct AttachmentReport<'a> {
    filename: Option<&'a str>,
    content_type: &'a str,
    content_id: Option<&'a str>,
    disposition: &'a str,
    size: u64,
}

impl<'a> MessageReport<'a> {
    fn new(message: &'a DecodedMessage) -> Self {
        Self {
            headers: &message.headers,
            subject: message.subject(),
            text_body: &message.text_body,
            html_body: &message.html_body,
            attachments: message
                .attachments
                .iter()
                .map(|a| AttachmentReport {
                    filename: a.filename.as_deref(),
                    content_type: &a.content_type,
                    content_id: a.content_id.as_deref(),
                    disposition: &a.disposition,
                    size: a.size(),
                })
                .collect(),
            warnings: &message.warnings,
        }
    }
}

fn cmd_decode(decoder: &MessageDecoder<'_>, path: &Path, json: bool) -> anyhow::Result<()> {
    let (_, message) = load(decoder, path)?;
    let report = MessageReport::new(&message);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for name in ["From", "To", "Date", "Message-Id"] {
        if let Some(value) = message.header(name) {
            println!("{name}: {value}");
        }
    }
    if let Some(subject) = &report.subject {
        println!("Subject: {subject}");
    }

    if !message.text_body.is_empty() {
        println!("\n--- text/plain ---\n{}", message.text_body);
    }
    if !message.html_body.is_empty() {
        println!("\n--- text/html ---\n{}", message.html_body);
    }

    if !report.attachments.is_empty() {
        println!("\n--- attachments ({}) ---", report.attachments.len());
        for (i, a) in report.attachments.iter().enumerate() {
            println!(
                "{:>3}. {} {} bytes{}{}",
                i + 1,
                a.content_type,
                a.size,
                a.filename.map(|f| format!(" \"{f}\"")).unwrap_or_default(),
                a.content_id.map(|c| format!(" cid:{c}")).unwrap_or_default(),
            );
        }
    }

    for warning in &message.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_tree(decoder: &MessageDecoder<'_>, path: &Path) -> anyhow::Result<()> {
    let (tree, _) = load(decoder, path)?;
    print!("{}", structure::render_structure(&tree));
    println!("{} parts", structure::count_parts(&tree));
    Ok(())
}

fn cmd_validate(decoder: &MessageDecoder<'_>, path: &Path) -> anyhow::Result<ExitCode> {
    let (tree, message) = load(decoder, path)?;
    let warnings = structure::validate(Some(&tree), &message);

    if warnings.is_empty() {
        println!("OK");
        return Ok(ExitCode::SUCCESS);
    }
    for warning in &warnings {
        println!("{warning}");
    }
    debug!(count = warnings.len(), "validation finished with warnings");
    Ok(ExitCode::FAILURE)
}

fn cmd_cid(decoder: &MessageDecoder<'_>, path: &Path, id: &str) -> anyhow::Result<ExitCode> {
    let (tree, _) = load(decoder, path)?;

    let Some(part) = structure::find_by_content_id(&tree, id) else {
        eprintln!("no part with Content-ID {id}");
        return Ok(ExitCode::FAILURE);
    };

    println!("{} {} bytes", part.mime_type(), decoded_size(part));
    Ok(ExitCode::SUCCESS)
}

/// Decoded length of one part, using the same fallback as message decoding.
fn decoded_size(part: &RawPart) -> usize {
    DecoderManager::global()
        .decode_with_fallback(&part.body, part.transfer_encoding())
        .len()
}

fn cmd_encodings() {
    let mut names: Vec<String> = DecoderManager::global()
        .registry()
        .list_supported()
        .into_iter()
        .collect();
    names.sort();
    for name in names {
        println!("{name}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_size_comes_from_matched_part() {
        let raw = concat!(
            "Content-Type: multipart/related; boundary=rel\r\n\r\n",
            "--rel\r\nContent-Type: text/html\r\nContent-ID: <dup>\r\n\r\n<p>hello</p>\r\n",
            "--rel\r\nContent-Type: image/png\r\nContent-ID: <dup>\r\n",
            "Content-Transfer-Encoding: base64\r\n\r\niVBORw0KGgo=\r\n",
            "--rel--\r\n"
        );
        let decoder = MessageDecoder::new(DecoderManager::global());
        let (tree, message) = decoder.decode_message_with_tree(raw.as_bytes()).unwrap();

        let part = structure::find_by_content_id(&tree, "dup").unwrap();
        assert_eq!(part.mime_type(), "text/html");
        assert_eq!(decoded_size(part), "<p>hello</p>".len());
        assert_eq!(message.attachment_by_content_id("dup").unwrap().content.len(), 8);
    }
}
