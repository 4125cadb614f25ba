//! Assignment-policy management commands.
//!
//! Policies export to versioned JSON bundles and import with a semantic
//! versioning compatibility check.

use std::fs;
use std::path::PathBuf;

use clap::Subcommand;
use interpool_core::{
    check_compatibility, Compatibility, PolicyBundle, PolicyPatch, PolicyStore,
    POLICY_BUNDLE_VERSION,
};

use super::common::{open_engine, print_json};

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Show the effective policy
    Show,
    /// Validate a policy patch file without applying it
    Validate {
        /// JSON file containing a policy patch
        file: PathBuf,
    },
    /// Apply a policy patch file
    Apply {
        /// JSON file containing a policy patch
        file: PathBuf,
    },
    /// Export the current policy as a JSON bundle
    Export {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Bundle name
        #[arg(long)]
        name: Option<String>,
    },
    /// Import a policy bundle
    Import {
        /// Input file path
        file: PathBuf,
        /// Validate without applying changes
        #[arg(long)]
        dry_run: bool,
        /// Skip the compatibility check
        #[arg(long)]
        force: bool,
    },
    /// Show the bundle format version
    Version,
}

pub fn run(action: PolicyAction) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        PolicyAction::Show => show(),
        PolicyAction::Validate { file } => validate(file),
        PolicyAction::Apply { file } => apply(file),
        PolicyAction::Export { output, name } => export(output, name),
        PolicyAction::Import { file, dry_run, force } => import(file, dry_run, force),
        PolicyAction::Version => {
            println!("Policy bundle version: {POLICY_BUNDLE_VERSION}");
            Ok(0)
        }
    }
}

fn show() -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let policy = engine.store().get_policy()?;
    print_json(&policy)?;
    Ok(0)
}

fn read_patch(file: &PathBuf) -> Result<PolicyPatch, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file)?;
    Ok(serde_json::from_str(&content)?)
}

fn validate(file: PathBuf) -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let patch = read_patch(&file)?;
    let current = engine.store().get_policy()?;
    match current.apply_patch(&patch) {
        Ok(next) => {
            print_json(&next)?;
            Ok(0)
        }
        Err(e) => {
            eprintln!("invalid policy: {e}");
            Ok(2)
        }
    }
}

fn apply(file: PathBuf) -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let patch = read_patch(&file)?;
    let next = engine.store().write_policy(&patch)?;
    print_json(&next)?;
    Ok(0)
}

fn export(output: Option<PathBuf>, name: Option<String>) -> Result<i32, Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let policy = engine.store().get_policy()?;
    let bundle = PolicyBundle::new(
        name.unwrap_or_else(|| "Exported policy".to_string()),
        policy,
        chrono::Utc::now(),
    );
    let json = bundle.to_json()?;
    match output {
        Some(path) => {
            fs::write(&path, json)?;
            println!("Policy exported to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(0)
}

fn import(file: PathBuf, dry_run: bool, force: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(&file)?;
    let bundle = PolicyBundle::from_json(&content)?;

    let compat = check_compatibility(POLICY_BUNDLE_VERSION, &bundle.version);
    match &compat {
        Compatibility::Compatible => {}
        Compatibility::MinorNewer { .. } => eprintln!("warning: {compat}"),
        Compatibility::Incompatible { .. } => {
            if !force {
                eprintln!("refusing import: {compat}");
                return Ok(2);
            }
            eprintln!("warning: forcing import despite {compat}");
        }
    }

    if dry_run {
        println!("Dry run: bundle '{}' parses and is importable", bundle.metadata.name);
        return Ok(0);
    }

    let engine = open_engine()?;
    let next = engine.store().write_policy(&PolicyPatch::replace(&bundle.policy))?;
    print_json(&next)?;
    Ok(0)
}
