//! PageHush CLI
//!
//! Tooling for rule files and stores: validate and inspect rule bundles,
//! preview a rule set against a serialized page, fetch preset lists, run
//! store maintenance, and export the TypeScript protocol bindings.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ts_rs::TS;

use ph_core::protocol::{Event, Request, Response};
use ph_core::selector::SelectorList;
use ph_core::types::Rule;
use ph_runtime::apply::MARKER_ATTR;
use ph_runtime::persist::{ExportBundle, RuleStore, StoredRule};
use ph_runtime::suggest::NullSuggestions;
use ph_runtime::{DomAdapter, DomSpec, MemDom, MemoryStore, Runtime};

mod store;

#[cfg(feature = "e2e")]
mod e2e;

#[derive(Parser)]
#[command(name = "ph-cli")]
#[command(about = "PageHush rule tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every rule in a bundle or rule list
    Validate {
        /// Rule file (export bundle or JSON rule array)
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Summarize a rule file
    Info {
        /// Rule file (export bundle or JSON rule array)
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Apply a rule file against a serialized page and report the outcome
    Preview {
        /// Page description (DomSpec JSON)
        #[arg(short, long)]
        dom: PathBuf,

        /// Rule file (export bundle or JSON rule array)
        #[arg(short, long)]
        rules: PathBuf,

        /// Host the page is assumed to live on
        #[arg(long, default_value = "example.com")]
        host: String,

        /// Path the page is assumed to live at
        #[arg(long, default_value = "/")]
        path: String,
    },

    /// Download a preset rule list and validate it before writing
    #[cfg(feature = "fetch")]
    Fetch {
        /// Source URL
        #[arg(short, long)]
        url: String,

        /// Output file
        #[arg(short, long, default_value = "preset.json")]
        output: PathBuf,
    },

    /// Clean a store file and report its size
    Maintenance {
        /// Store file (export bundle)
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Export the TypeScript bindings for the shell
    Types {
        /// Output directory
        #[arg(short, long, default_value = "bindings")]
        out: PathBuf,
    },

    /// Drive a browser with a built extension and assert suppression
    #[cfg(feature = "e2e")]
    E2e {
        /// chromedriver URL
        #[arg(long, default_value = "http://localhost:9515")]
        chromedriver_url: String,

        /// Path to the unpacked extension
        #[arg(long)]
        extension_path: String,

        /// Run headless
        #[arg(long)]
        headless: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { rules } => cmd_validate(&rules),
        Commands::Info { rules } => cmd_info(&rules),
        Commands::Preview {
            dom,
            rules,
            host,
            path,
        } => cmd_preview(&dom, &rules, &host, &path),
        #[cfg(feature = "fetch")]
        Commands::Fetch { url, output } => cmd_fetch(&url, &output),
        Commands::Maintenance { store } => cmd_maintenance(&store),
        Commands::Types { out } => cmd_types(&out),
        #[cfg(feature = "e2e")]
        Commands::E2e {
            chromedriver_url,
            extension_path,
            headless,
        } => e2e::run_e2e(e2e::E2eOptions {
            chromedriver_url,
            extension_path,
            headless,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// =============================================================================
// Rule file loading
// =============================================================================

/// A rule file is either a full export bundle or a bare JSON array of rules
/// (treated as host-wide entries for previewing).
fn load_rule_file(path: &Path) -> Result<Vec<StoredRule>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

    if let Ok(bundle) = serde_json::from_str::<ExportBundle>(&text) {
        return Ok(bundle.data);
    }
    let rules: Vec<Rule> = serde_json::from_str(&text)
        .map_err(|e| format!("'{}' is neither a bundle nor a rule array: {}", path.display(), e))?;
    Ok(rules
        .into_iter()
        .map(|rule| StoredRule {
            host: String::new(),
            path_pattern: ph_core::path::MATCH_ALL.to_string(),
            rule,
        })
        .collect())
}

fn shape_errors(entry: &StoredRule) -> Vec<String> {
    let mut errors = Vec::new();
    match SelectorList::parse(&entry.rule.selector) {
        Ok(list) => {
            if let Some(protected) = list.targets_protected() {
                errors.push(format!("targets protected structure '{protected}'"));
            }
        }
        Err(e) => errors.push(format!("selector does not parse: {e}")),
    }
    for alt in &entry.rule.alternatives {
        if SelectorList::parse(alt).is_err() {
            errors.push(format!("alternative '{alt}' does not parse"));
        }
    }
    errors
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_validate(rules_path: &Path) -> Result<(), String> {
    let entries = load_rule_file(rules_path)?;
    let mut invalid = 0usize;

    for (idx, entry) in entries.iter().enumerate() {
        for error in shape_errors(entry) {
            invalid += 1;
            println!("  [{}] '{}': {}", idx, entry.rule.selector, error);
        }
    }

    if invalid > 0 {
        return Err(format!("{invalid} problem(s) in {} rules", entries.len()));
    }
    println!("All {} rules are valid", entries.len());
    Ok(())
}

fn cmd_info(rules_path: &Path) -> Result<(), String> {
    let entries = load_rule_file(rules_path)?;

    let mut hosts: Vec<&str> = entries.iter().map(|e| e.host.as_str()).collect();
    hosts.sort_unstable();
    hosts.dedup();

    let count_of = |t: ph_core::types::RuleType| {
        entries.iter().filter(|e| e.rule.rule_type == t).count()
    };

    println!("Rule file: {}", rules_path.display());
    println!("  Rules:    {}", entries.len());
    println!("  Hosts:    {}", hosts.len());
    println!("  Hide:     {}", count_of(ph_core::types::RuleType::Hide));
    println!("  Blank:    {}", count_of(ph_core::types::RuleType::Blank));
    println!("  Mute:     {}", count_of(ph_core::types::RuleType::Mute));
    println!("  Style:    {}", count_of(ph_core::types::RuleType::Style));
    Ok(())
}

fn cmd_preview(
    dom_path: &Path,
    rules_path: &Path,
    host: &str,
    path: &str,
) -> Result<(), String> {
    let spec_text = fs::read_to_string(dom_path)
        .map_err(|e| format!("Failed to read '{}': {}", dom_path.display(), e))?;
    let spec: DomSpec = serde_json::from_str(&spec_text)
        .map_err(|e| format!("'{}' is not a page description: {}", dom_path.display(), e))?;

    let mut store = MemoryStore::new();
    for entry in load_rule_file(rules_path)? {
        let entry_host = if entry.host.is_empty() { host } else { &entry.host };
        store
            .save_rule(entry_host, &entry.path_pattern, &entry.rule)
            .map_err(|e| e.to_string())?;
    }

    let dom = MemDom::from_spec(&spec);
    let mut runtime = Runtime::new(dom, store, NullSuggestions, host, path);

    match runtime.handle(Request::GetPageInfo, 0) {
        Response::PageInfo { chips, .. } => {
            if chips.is_empty() {
                println!("No rule affected the page");
            } else {
                println!("Affected elements on {host}{path}:");
                for chip in chips {
                    println!(
                        "  {:<28} {:<6} {} element(s)",
                        chip.selector,
                        chip.rule_type.as_str(),
                        chip.count
                    );
                }
            }
        }
        other => return Err(format!("unexpected response: {other:?}")),
    }

    let marked = runtime
        .dom()
        .query_selector_all(&format!("[{MARKER_ATTR}]"))
        .map_err(|e| e.to_string())?;
    println!("  {} element(s) carry suppression markers", marked.len());
    Ok(())
}

#[cfg(feature = "fetch")]
fn cmd_fetch(url: &str, output: &Path) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {e}"))?;
    let text = runtime.block_on(async {
        let response = reqwest::get(url)
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("Request failed: HTTP {}", response.status()));
        }
        response
            .text()
            .await
            .map_err(|e| format!("Failed to read body: {e}"))
    })?;

    // Never write a list we would refuse to load.
    let rules: Vec<Rule> = serde_json::from_str(&text)
        .map_err(|e| format!("Downloaded list is not a rule array: {e}"))?;
    for rule in &rules {
        SelectorList::parse(&rule.selector)
            .map_err(|e| format!("Downloaded rule '{}' is invalid: {}", rule.selector, e))?;
    }

    fs::write(output, &text)
        .map_err(|e| format!("Failed to write '{}': {}", output.display(), e))?;
    println!("Fetched {} rules to '{}'", rules.len(), output.display());
    Ok(())
}

fn cmd_maintenance(store_path: &Path) -> Result<(), String> {
    let mut store = store::FileStore::open(store_path)?;
    let before = store.rule_count();
    let report = store.maintenance().map_err(|e| e.to_string())?;

    println!("Store: {}", store_path.display());
    println!("  Rules:    {} -> {}", before, store.rule_count());
    println!("  Cleaned:  {}", report.cleaned);
    println!("  Size:     {} bytes", report.size);
    Ok(())
}

fn cmd_types(out: &Path) -> Result<(), String> {
    fs::create_dir_all(out)
        .map_err(|e| format!("Failed to create '{}': {}", out.display(), e))?;

    Request::export_all_to(out).map_err(|e| e.to_string())?;
    Response::export_all_to(out).map_err(|e| e.to_string())?;
    Event::export_all_to(out).map_err(|e| e.to_string())?;
    ExportBundle::export_all_to(out).map_err(|e| e.to_string())?;

    println!("TypeScript bindings written to '{}'", out.display());
    Ok(())
}
