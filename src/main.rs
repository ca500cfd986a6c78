//! Audit/debug CLI over the authorization gate.
//!
//! Renders the same verdict structures the library returns as JSON, so an
//! operator tuning policy can see exactly which rule a command or target
//! trips. Exit code 0 means allowed, 1 means denied; transport failures
//! report through stderr with a distinct nonzero code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clawgate::exec::{evaluate_shell_allowlist, AllowlistEntry};
use clawgate::net::{resolve_pinned_hostname_with_policy, ResolveError, SystemLookup};
use clawgate::GuardConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "clawgate", version, about = "Outbound action authorization gate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a shell command against the exec allowlist policy
    #[command(long_about = "\
Evaluate a shell command against the exec allowlist policy.

Prints the full per-segment verdict as JSON. Exit code 0 when the
command may run unattended, 1 when it requires approval.

Examples:
  clawgate check-command 'jq .name' --safe-bin jq
  clawgate check-command 'sort -o out.txt' --safe-bin sort
  clawgate check-command 'deploy-status' --allow '/usr/local/bin/deploy-status'")]
    CheckCommand {
        /// The command line to evaluate
        command: String,
        /// Enable a safe-bin by name (repeatable)
        #[arg(long = "safe-bin")]
        safe_bins: Vec<String>,
        /// Allowlist a resolved-path pattern (repeatable)
        #[arg(long = "allow")]
        allowlist: Vec<String>,
        /// Trust an extra binary directory (repeatable)
        #[arg(long = "trusted-dir")]
        trusted_dirs: Vec<PathBuf>,
        /// Load [exec] policy from a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Resolve a URL or hostname under the SSRF policy
    #[command(long_about = "\
Resolve a URL or hostname under the SSRF policy.

Performs the same pinned resolution the fetch guard uses: allowlist
gate, literal decoding, and range classification, then prints the
pinned address set. Exit code 0 when the target is reachable under
policy, 1 when it is blocked.

Examples:
  clawgate check-url https://api.example.com
  clawgate check-url 0x7f000001
  clawgate check-url 10.0.0.8 --allow-private")]
    CheckUrl {
        /// URL or bare hostname/IP literal
        target: String,
        /// Permit private, loopback, and link-local ranges
        #[arg(long)]
        allow_private: bool,
        /// Permit the RFC 2544 benchmark range (198.18.0.0/15)
        #[arg(long)]
        allow_benchmark: bool,
        /// Restrict to these hostnames (repeatable; supports *.suffix)
        #[arg(long = "allow-host")]
        hostname_allowlist: Vec<String>,
        /// Load [ssrf] policy from a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct UrlVerdict<'a> {
    target: &'a str,
    hostname: String,
    allowed: bool,
    addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::CheckCommand {
            command,
            safe_bins,
            allowlist,
            trusted_dirs,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut options = config.exec_options();
            options.trusted_dirs.extend(trusted_dirs);

            let mut bins: HashSet<String> = config.safe_bins();
            bins.extend(safe_bins);

            let mut entries = config.exec_allowlist();
            entries.extend(allowlist.into_iter().map(AllowlistEntry::new));

            let verdict = evaluate_shell_allowlist(&command, &entries, &bins, &options);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.allowlist_satisfied {
                std::process::exit(1);
            }
        }
        Commands::CheckUrl {
            target,
            allow_private,
            allow_benchmark,
            hostname_allowlist,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut policy = config.ssrf_policy();
            policy.allow_private_network |= allow_private;
            policy.allow_rfc2544_benchmark_range |= allow_benchmark;
            policy.hostname_allowlist.extend(hostname_allowlist);

            let host = extract_host(&target)?;
            match resolve_pinned_hostname_with_policy(&host, Arc::new(SystemLookup), &policy)
                .await
            {
                Ok(pinned) => {
                    let verdict = UrlVerdict {
                        target: &target,
                        hostname: pinned.hostname().to_string(),
                        allowed: true,
                        addresses: pinned
                            .addresses()
                            .iter()
                            .map(|a| a.ip.to_string())
                            .collect(),
                        rule: None,
                        reason: None,
                    };
                    println!("{}", serde_json::to_string_pretty(&verdict)?);
                }
                Err(ResolveError::Blocked { hostname, reason }) => {
                    let verdict = UrlVerdict {
                        target: &target,
                        hostname,
                        allowed: false,
                        addresses: Vec::new(),
                        rule: Some(reason.rule_id()),
                        reason: Some(reason.to_string()),
                    };
                    println!("{}", serde_json::to_string_pretty(&verdict)?);
                    std::process::exit(1);
                }
                // Transport failure: the check itself could not complete.
                Err(err @ ResolveError::Lookup { .. }) => return Err(err.into()),
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<GuardConfig> {
    match path {
        Some(path) => GuardConfig::load(path),
        None => Ok(GuardConfig::default()),
    }
}

/// Accept either a URL or a bare hostname/IP literal.
fn extract_host(target: &str) -> Result<String> {
    if target.contains("://") {
        let url = reqwest::Url::parse(target)?;
        if let Some(domain) = url.domain() {
            return Ok(domain.to_string());
        }
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("URL has no host"))?;
        return Ok(host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string());
    }
    Ok(target.to_string())
}
