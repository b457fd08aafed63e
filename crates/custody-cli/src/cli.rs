use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "custody",
    about = "Custody Ledger: tamper-evident record of findings and their chain of custody",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file (server settings with a `[ledger]` table)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger data directory; overrides the configuration file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the ledger (genesis block and writer key) if it does not exist
    Init,
    /// Append a finding record given as JSON, or `-` to read stdin
    Append(AppendArgs),
    /// Verify hashes, linkage, indices, and signatures of the whole chain
    Verify(VerifyArgs),
    /// Show the audit trail for a session or analysis id
    Audit(AuditArgs),
    /// Print blocks in chain order
    Dump(DumpArgs),
    /// Show block count, storage size, and chain health
    Status,
    /// Produce a Merkle inclusion proof for a block hash
    Prove(ProveArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    pub record: String,
    /// Origin recorded when the record carries none
    #[arg(long, default_value = "cli")]
    pub origin: String,
    /// Uploader recorded when the record carries none
    #[arg(long)]
    pub uploader: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Skip signature checks
    #[arg(long)]
    pub no_signatures: bool,
}

#[derive(Args)]
pub struct AuditArgs {
    pub id: String,
}

#[derive(Args)]
pub struct DumpArgs {
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(short = 'n', long, default_value = "100")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ProveArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["custody", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert!(cli.data_dir.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn parse_append() {
        let cli = Cli::try_parse_from([
            "custody",
            "append",
            r#"{"type":"obs"}"#,
            "--uploader",
            "alice",
        ])
        .unwrap();
        match cli.command {
            Command::Append(args) => {
                assert_eq!(args.record, r#"{"type":"obs"}"#);
                assert_eq!(args.origin, "cli");
                assert_eq!(args.uploader.as_deref(), Some("alice"));
            }
            _ => panic!("expected Append"),
        }
    }

    #[test]
    fn parse_append_stdin() {
        let cli = Cli::try_parse_from(["custody", "append", "-"]).unwrap();
        assert!(matches!(cli.command, Command::Append(ref a) if a.record == "-"));
    }

    #[test]
    fn parse_dump_paging() {
        let cli = Cli::try_parse_from(["custody", "dump", "--offset", "5", "-n", "2"]).unwrap();
        match cli.command {
            Command::Dump(args) => {
                assert_eq!(args.offset, 5);
                assert_eq!(args.limit, 2);
            }
            _ => panic!("expected Dump"),
        }
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["custody", "verify", "--no-signatures"]).unwrap();
        assert!(matches!(cli.command, Command::Verify(VerifyArgs { no_signatures: true })));
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["custody", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind.unwrap().port(), 8080),
            _ => panic!("expected Serve"),
        }
        assert!(Cli::try_parse_from(["custody", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "custody",
            "status",
            "--format",
            "json",
            "--data-dir",
            "/tmp/ledger",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ledger")));
    }

    #[test]
    fn audit_requires_id() {
        assert!(Cli::try_parse_from(["custody", "audit"]).is_err());
        let cli = Cli::try_parse_from(["custody", "audit", "s1"]).unwrap();
        assert!(matches!(cli.command, Command::Audit(ref a) if a.id == "s1"));
    }
}
