//! # meld
//!
//! Command-line front end for the policy engine: builds an engine from the
//! settings file and answers one question about a type, a member, or the
//! inventory.

#![deny(unsafe_code)]

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor};
use meld_policy::{InventoryManifest, PolicyEngine};
use meld_settings::MeldSettings;

/// Inspect cluster transformation policy decisions.
#[derive(Parser, Debug)]
#[command(name = "meld", about = "Inspect cluster transformation policy decisions")]
struct Cli {
    /// Settings file (defaults to `~/.meld/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether a type is transformed, and how.
    Check {
        /// Fully-qualified type name.
        type_name: String,
        /// Superclass, nearest first. Repeat for each level.
        #[arg(long = "ancestor")]
        ancestors: Vec<String>,
        /// The type is an interface.
        #[arg(long)]
        interface: bool,
    },
    /// Resolve the locks applying to a member.
    Locks {
        /// Declaring type.
        declaring_type: String,
        /// Member name.
        method: String,
        /// The member is declared `synchronized`.
        #[arg(long)]
        synchronized: bool,
        /// The member is declared `static`.
        #[arg(long = "static")]
        is_static: bool,
        /// Return type.
        #[arg(long, default_value = "void")]
        returns: String,
        /// Parameter type. Repeat in declaration order.
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Compare pre-instrumented specs against an inventory manifest.
    VerifyInventory {
        /// Manifest JSON file.
        manifest: PathBuf,
    },
    /// Print every registered class spec as JSON.
    DumpSpecs,
}

fn load_settings(cli: &Cli) -> Result<MeldSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(meld_settings::settings_path);
    meld_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn render_check(engine: &PolicyEngine, ty: &TypeDescriptor) -> Result<String> {
    let decision = engine.decide(ty)?;
    let mut out = String::new();
    let _ = writeln!(out, "{}", ty.name);
    let _ = writeln!(out, "  transformable: {}", decision.transformable());
    let _ = writeln!(out, "  reason: {}", decision.reason());
    let _ = writeln!(out, "  mode: {}", decision.mode());
    if let Some(applicator) = decision.change_applicator() {
        let _ = writeln!(out, "  change applicator: {applicator}");
    }
    if let Some(rewriter) = decision.custom_rewriter() {
        let _ = writeln!(out, "  custom rewriter: {rewriter}");
    }
    for root in decision.roots() {
        let _ = writeln!(out, "  root: {} as {}", root.field_name, root.exposed_name());
    }
    Ok(out)
}

fn render_locks(engine: &PolicyEngine, member: &MemberDescriptor) -> Result<String> {
    let definitions = engine.lock_definitions_for(member)?;
    let mut out = String::new();
    let _ = writeln!(out, "{member}");
    if definitions.is_empty() {
        let _ = writeln!(out, "  no locks");
    }
    for definition in &definitions {
        let _ = writeln!(out, "  {definition}");
    }
    let _ = writeln!(out, "  lock method: {}", engine.is_lock_method(member)?);
    if let Some(distributed) = engine.distributed_method_for(member)? {
        let scope = if distributed.run_on_all_nodes {
            "all nodes"
        } else {
            "resident nodes"
        };
        let _ = writeln!(out, "  distributed: {scope}");
    }
    Ok(out)
}

fn member_from(
    declaring_type: &str,
    method: &str,
    synchronized: bool,
    is_static: bool,
    returns: &str,
    params: &[String],
) -> MemberDescriptor {
    let mut modifiers = Modifiers::PUBLIC;
    if synchronized {
        modifiers = modifiers | Modifiers::SYNCHRONIZED;
    }
    if is_static {
        modifiers = modifiers | Modifiers::STATIC;
    }
    MemberDescriptor::new(declaring_type, method)
        .with_modifiers(modifiers)
        .returning(returns)
        .with_parameters(params.iter().cloned())
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(&cli)?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    if settings.logging.json {
        meld_core::logging::init_json_subscriber(&level);
    } else {
        meld_core::logging::init_subscriber(&level);
    }

    let engine = meld_policy::bootstrap(&settings).context("Failed to build policy engine")?;
    tracing::debug!(?engine, "Engine built");

    match cli.command {
        Command::Check {
            type_name,
            ancestors,
            interface,
        } => {
            let mut ty = TypeDescriptor::new(type_name).with_ancestors(ancestors);
            if interface {
                ty = ty.with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE);
            }
            print!("{}", render_check(&engine, &ty)?);
        }
        Command::Locks {
            declaring_type,
            method,
            synchronized,
            is_static,
            returns,
            params,
        } => {
            let member = member_from(&declaring_type, &method, synchronized, is_static, &returns, &params);
            print!("{}", render_locks(&engine, &member)?);
        }
        Command::VerifyInventory { manifest } => {
            let manifest = InventoryManifest::load(&manifest)?;
            let report = engine.verify_inventory(&manifest);
            println!("{report}");
            if !report.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::DumpSpecs => {
            let specs = engine.all_specs(true);
            println!("{}", serde_json::to_string_pretty(&specs)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    run(Cli::parse())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use meld_policy::RootDefinition;

    #[test]
    fn cli_check_with_ancestors() {
        let cli = Cli::parse_from([
            "meld",
            "check",
            "com.acme.Widget",
            "--ancestor",
            "com.acme.Base",
            "--ancestor",
            "java.lang.Object",
        ]);
        match cli.command {
            Command::Check {
                type_name,
                ancestors,
                interface,
            } => {
                assert_eq!(type_name, "com.acme.Widget");
                assert_eq!(ancestors, vec!["com.acme.Base", "java.lang.Object"]);
                assert!(!interface);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["meld", "dump-specs", "--settings", "/tmp/meld.json", "--log-level", "debug"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/meld.json")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::DumpSpecs));
    }

    #[test]
    fn cli_locks_defaults() {
        let cli = Cli::parse_from(["meld", "locks", "com.acme.Counter", "increment", "--synchronized"]);
        match cli.command {
            Command::Locks {
                synchronized,
                is_static,
                returns,
                params,
                ..
            } => {
                assert!(synchronized);
                assert!(!is_static);
                assert_eq!(returns, "void");
                assert!(params.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn member_modifiers_from_flags() {
        let params = vec!["int".to_string()];
        let member = member_from("com.acme.Counter", "add", true, true, "int", &params);
        assert!(member.modifiers.is_synchronized());
        assert!(member.modifiers.is_static());
        assert_eq!(member.member_key(), "add(int)");
    }

    #[test]
    fn check_output() {
        let engine = PolicyEngine::default();
        engine.add_include_pattern("com.acme.*");
        engine
            .add_root(RootDefinition::new("com.acme.App", "cache"), false)
            .unwrap();

        let out = render_check(&engine, &TypeDescriptor::new("com.acme.App")).unwrap();
        assert_eq!(
            out,
            "com.acme.App\n  transformable: true\n  reason: declares root\n  mode: fully-transformable\n  root: cache as com.acme.App.cache\n"
        );
    }

    #[test]
    fn locks_output() {
        let engine = PolicyEngine::default();
        engine.add_write_autolock("* com.acme.Counter.*(..)");
        let member = member_from("com.acme.Counter", "increment", true, false, "void", &[]);

        let out = render_locks(&engine, &member).unwrap();
        assert!(out.contains("  autolock (write)\n"));
        assert!(out.ends_with("  lock method: true\n"));

        let plain = member_from("com.acme.Other", "run", false, false, "void", &[]);
        let out = render_locks(&engine, &plain).unwrap();
        assert!(out.contains("  no locks\n"));
        assert!(out.contains("  lock method: false\n"));
    }

    #[test]
    fn run_verify_inventory_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        std::fs::write(&settings, r#"{ "policy": { "includeBuiltins": true } }"#).unwrap();
        let manifest = dir.path().join("inventory.json");
        std::fs::write(&manifest, r#"{ "types": [] }"#).unwrap();

        let cli = Cli::parse_from([
            "meld",
            "--settings",
            settings.to_str().unwrap(),
            "verify-inventory",
            manifest.to_str().unwrap(),
        ]);
        assert_eq!(run(cli).unwrap(), ExitCode::FAILURE);
    }
}
