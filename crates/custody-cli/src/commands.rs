use std::io::Read;

use anyhow::Context;
use colored::Colorize;
use custody_ledger::{Ledger, LedgerReader, LedgerWriter, ValidationReport};
use custody_server::{AppendResponse, ChainPage, CustodyServer, HealthResponse, ServerConfig};
use custody_types::{CustodyDefaults, Digest, RecordSubmission};
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Init => cmd_init(&config, format),
        Command::Append(args) => cmd_append(&config, format, args),
        Command::Verify(args) => cmd_verify(&config, format, args),
        Command::Audit(args) => cmd_audit(&config, format, args),
        Command::Dump(args) => cmd_dump(&config, format, args),
        Command::Status => cmd_status(&config, format),
        Command::Prove(args) => cmd_prove(&config, format, args),
        Command::Serve(args) => cmd_serve(config, args),
    }
}

/// Configuration file (if any), then command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.ledger.data_dir = dir.clone();
    }
    tracing::debug!(data_dir = %config.ledger.data_dir.display(), "resolved configuration");
    Ok(config)
}

fn open_ledger(config: &ServerConfig) -> anyhow::Result<Ledger> {
    let ledger = Ledger::open(config.ledger.clone())
        .with_context(|| format!("opening ledger in {}", config.ledger.data_dir.display()))?;
    ledger.initialize().context("replaying block log")?;
    Ok(ledger)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

fn cmd_init(config: &ServerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let count = ledger.block_count()?;
    ledger.shutdown()?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "dataDir": config.ledger.data_dir,
            "blockCount": count,
            "publicKey": ledger.verifying_key().to_hex(),
        })),
        OutputFormat::Text => {
            println!(
                "{} Ledger ready in {}",
                "✓".green().bold(),
                config.ledger.data_dir.display().to_string().bold()
            );
            println!("  Blocks: {}", count.to_string().bold());
            println!("  Writer key: {}", ledger.verifying_key().to_hex().cyan());
            Ok(())
        }
    }
}

fn cmd_append(config: &ServerConfig, format: OutputFormat, args: AppendArgs) -> anyhow::Result<()> {
    let text = if args.record == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading record from stdin")?;
        buf
    } else {
        args.record
    };
    let value: serde_json::Value = serde_json::from_str(&text).context("record is not valid JSON")?;

    let mut defaults = CustodyDefaults::for_origin(args.origin);
    if let Some(uploader) = args.uploader {
        defaults.uploader = uploader;
    }
    let data = RecordSubmission::from_value(value)?.into_block_data(&defaults)?;

    let ledger = open_ledger(config)?;
    let block = ledger.append(data)?;
    ledger.shutdown()?;

    match format {
        OutputFormat::Json => print_json(&AppendResponse::from(&block)),
        OutputFormat::Text => {
            println!("{} Appended block {}", "✓".green().bold(), block.index.to_string().bold());
            println!("  Hash: {}", block.hash.to_hex().yellow());
            println!("  Type: {}", block.data.payload.record_type());
            Ok(())
        }
    }
}

fn print_report(report: &ValidationReport) {
    if report.valid {
        println!(
            "{} Chain verified: {} blocks",
            "✓".green().bold(),
            report.blocks_checked
        );
    } else {
        println!(
            "{} Chain broken at block {}",
            "✗".red().bold(),
            report
                .first_broken_index
                .map_or_else(|| "?".to_string(), |i| i.to_string())
                .bold()
        );
        if let Some(kind) = report.kind {
            println!("  Check: {kind:?}");
        }
        if let Some(reason) = &report.reason {
            println!("  Reason: {reason}");
        }
    }
}

fn cmd_verify(config: &ServerConfig, format: OutputFormat, args: VerifyArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let report = if args.no_signatures {
        ledger.validate()?
    } else {
        ledger.validate_signatures()?
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }
    report.into_result()?;
    Ok(())
}

fn cmd_audit(config: &ServerConfig, format: OutputFormat, args: AuditArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let trail = ledger.audit_trail(&args.id)?;

    if format == OutputFormat::Json {
        return print_json(&trail);
    }
    if trail.blocks.is_empty() {
        println!("No records for {}.", args.id.yellow());
        return Ok(());
    }
    println!("Audit trail for {}", args.id.yellow().bold());
    for (entry, proof) in trail.chain_of_custody.iter().zip(&trail.merkle_proof) {
        let mark = if proof.verified { "✓".green() } else { "✗".red() };
        println!(
            "  {} #{} {} {} by {} from {}",
            mark,
            entry.block_index,
            format_time(entry.timestamp).dimmed(),
            entry.record_type.cyan(),
            entry.custody.uploader,
            entry.custody.origin
        );
    }
    if trail.verified {
        println!("{} All inclusion proofs verified", "✓".green().bold());
    } else {
        println!("{} Some inclusion proofs failed", "✗".red().bold());
    }
    Ok(())
}

fn cmd_dump(config: &ServerConfig, format: OutputFormat, args: DumpArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let limit = args.limit.min(config.max_page_size);
    let page = ChainPage {
        total: ledger.block_count()?,
        offset: args.offset,
        limit,
        blocks: ledger.read_range(args.offset, limit)?,
    };

    match format {
        OutputFormat::Json => print_json(&page),
        OutputFormat::Text => {
            for block in &page.blocks {
                println!(
                    "{} {} {} {}",
                    format!("#{}", block.index).yellow(),
                    block.hash.short_hex().dimmed(),
                    format_time(block.timestamp),
                    block.data.payload.record_type()
                );
            }
            println!("({} of {} blocks)", page.blocks.len(), page.total);
            Ok(())
        }
    }
}

fn cmd_status(config: &ServerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let size = ledger.size()?;
    let validation = ledger.validate()?;
    let status = HealthResponse {
        status: if validation.valid { "ok" } else { "degraded" }.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        block_count: size.block_count,
        storage_bytes: size.storage_bytes,
        last_block_timestamp: ledger.tip()?.map(|b| b.timestamp),
        validation,
    };

    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Text => {
            println!("Ledger: {}", config.ledger.log_path().display().to_string().bold());
            println!("Blocks: {}", status.block_count.to_string().bold());
            println!("Storage: {} bytes", status.storage_bytes);
            if let Some(ts) = status.last_block_timestamp {
                println!("Last block: {}", format_time(ts));
            }
            print_report(&status.validation);
            Ok(())
        }
    }
}

fn cmd_prove(config: &ServerConfig, format: OutputFormat, args: ProveArgs) -> anyhow::Result<()> {
    let hash = Digest::from_hex(&args.hash).context("invalid block hash")?;
    let ledger = open_ledger(config)?;
    let proof = ledger.prove_block(&hash)?;

    match format {
        OutputFormat::Json => print_json(&proof),
        OutputFormat::Text => {
            println!(
                "{} Block #{} is included under root {}",
                "✓".green().bold(),
                proof.block_index,
                proof.merkle_root.to_hex().yellow()
            );
            println!(
                "  Window: blocks {}..={}",
                proof.window_start,
                proof.window_start + proof.window_len as u64 - 1
            );
            for step in &proof.path {
                println!("  {:?} {}", step.side, step.sibling.to_hex().dimmed());
            }
            Ok(())
        }
    }
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let server = CustodyServer::open(config)?;
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(server.serve())?;
    Ok(())
}
