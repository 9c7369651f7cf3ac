use {
    anyhow::Result,
    clap::Subcommand,
    std::path::{Path, PathBuf},
};

use attendo_config::{
    AttendoConfig,
    validate::{self, Severity},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the resolved configuration, or a single value by dotted key.
    Get {
        /// Dotted key, e.g. `server.port` or `channels.telegram.support`.
        key: Option<String>,
    },
    /// Print the path of the config file that would be loaded.
    Path,
}

pub async fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(verbose, explicit),
        ConfigAction::Get { key } => get(key.as_deref(), explicit),
        ConfigAction::Path => {
            println!("{}", resolved_path(explicit).display());
            Ok(())
        },
    }
}

fn resolved_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(attendo_config::find_or_default_config_path, Path::to_path_buf)
}

fn load(explicit: Option<&Path>) -> Result<AttendoConfig> {
    match explicit {
        Some(p) => attendo_config::loader::load_config(p),
        None => Ok(attendo_config::discover_and_load()),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(verbose: bool, explicit: Option<&Path>) -> Result<()> {
    let path = resolved_path(explicit);
    if path.exists() {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let config = load(explicit)?;
    let result = validate::validate(&config);

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn get(key: Option<&str>, explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?;
    let mut value = serde_json::to_value(&config)?;
    redact_tokens(&mut value);

    if let Some(key) = key {
        for part in key.split('.') {
            value = value
                .get_mut(part)
                .map(serde_json::Value::take)
                .ok_or_else(|| anyhow::anyhow!("no such config key: {key}"))?;
        }
    }

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Blank out credential fields so `config get` never echoes secrets.
fn redact_tokens(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if k == "token" && v.is_string() {
                    *v = serde_json::Value::String("[redacted]".into());
                } else {
                    redact_tokens(v);
                }
            }
        },
        serde_json::Value::Array(items) => {
            for v in items {
                redact_tokens(v);
            }
        },
        _ => {},
    }
}
