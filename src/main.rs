use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{LevelFilter, LogSpecification, Logger};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use vendor_finder::archive::{ArchiveBytes, ArchiveScanner, is_class_container};
use vendor_finder::classify::{ArchiveInspector, Cancellation, Classifier, Verdict};
use vendor_finder::cli::{Cli, Commands, OutputFormat};
use vendor_finder::config::{
    InventorySource, resolve_classifier_config, resolve_host_identifier, resolve_inventory_source,
};
use vendor_finder::dex::{ClassDecoder, DexDecoder};
use vendor_finder::finder::VendorFinder;
use vendor_finder::manifest::ManifestHost;

fn main() -> Result<()> {
    let cli = parse_cli();
    let _logger = start_logger(&cli)?;

    match cli.command.clone() {
        Commands::Packages => {
            let finder = open_finder(&cli)?;
            println!("{}", finder.packages_json()?);
        }
        Commands::Flagged => {
            let finder = open_finder(&cli)?;
            println!("{}", finder.flagged_installed_packages_json()?);
        }
        Commands::Check {
            package_ids,
            format,
        } => {
            let finder = open_finder(&cli)?;
            let results: Vec<CheckResult> = package_ids
                .iter()
                .map(|id| check_package(finder.classifier(), id))
                .collect();
            write_results(&results, format)?;
        }
        Commands::Inspect { archive, format } => {
            let result = inspect_archive(&cli, &archive)?;
            write_results(&[result], format)?;
        }
        Commands::Classes { archive } => {
            for name in archive_class_names(&archive)? {
                println!("{name}");
            }
        }
        Commands::Icon { package_id } => {
            let finder = open_finder(&cli)?;
            match finder.package_icon(&package_id) {
                Some(icon) => println!("{icon}"),
                None => anyhow::bail!("No icon available for {package_id}"),
            }
        }
    }

    Ok(())
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    Cli::parse_from(rewrite_args_for_implicit_check(args))
}

/// `vendor-finder com.example.app` means `vendor-finder check com.example.app`.
fn rewrite_args_for_implicit_check(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = [
        "packages", "flagged", "check", "inspect", "classes", "icon", "help",
    ];
    let valued = ["--manifest", "--apk-dir", "--host-id", "--timeout-ms", "--jobs", "-j"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if valued.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "check".to_string());
        }
    }

    args
}

fn start_logger(cli: &Cli) -> Result<flexi_logger::LoggerHandle> {
    let spec = if cli.trace {
        LogSpecification::builder()
            .module("vendor_finder", LevelFilter::Trace)
            .build()
    } else if cli.debug {
        LogSpecification::builder()
            .module("vendor_finder", LevelFilter::Debug)
            .build()
    } else {
        LogSpecification::env_or_parse("warn").context("Invalid log spec in RUST_LOG")?
    };
    Logger::with(spec)
        .log_to_stderr()
        .start()
        .context("Failed to start logger")
}

fn open_finder(cli: &Cli) -> Result<VendorFinder<ManifestHost>> {
    let host = match resolve_inventory_source(cli)? {
        InventorySource::Manifest(path) => ManifestHost::load(&path)?,
        InventorySource::ApkDir(dir) => ManifestHost::from_apk_dir(&dir)?,
    };
    VendorFinder::new(
        host,
        resolve_host_identifier(cli),
        resolve_classifier_config(cli)?,
    )
}

#[derive(Debug, Serialize)]
struct CheckResult {
    target: String,
    flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

fn check_package(classifier: &Classifier<ManifestHost>, id: &str) -> CheckResult {
    let start = Instant::now();
    let outcome = classifier.classify(id, &Cancellation::new());
    let (verdict, error) = match outcome {
        Ok(v) => (Some(v), None),
        Err(err) => (None, Some(format!("{}: {err}", err.kind()))),
    };
    CheckResult {
        target: id.to_string(),
        flagged: verdict.as_ref().is_some_and(Verdict::is_flagged),
        verdict,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn inspect_archive(cli: &Cli, archive: &Path) -> Result<CheckResult> {
    let start = Instant::now();
    let config = resolve_classifier_config(cli)?;
    let inspector = ArchiveInspector::new(DexDecoder, config.oversized_class_container_bytes);
    let bytes = ArchiveBytes::map(archive)?;
    let (verdict, error) = match inspector.scan(&bytes, &Cancellation::new()) {
        Ok(v) => (Some(v), None),
        Err(err) => (None, Some(format!("{}: {err}", err.kind()))),
    };
    Ok(CheckResult {
        target: archive.display().to_string(),
        flagged: verdict.as_ref().is_some_and(Verdict::is_flagged),
        verdict,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn archive_class_names(archive: &Path) -> Result<Vec<String>> {
    let bytes = ArchiveBytes::map(archive)?;
    let mut scanner = ArchiveScanner::open(&bytes)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut names = Vec::new();
    while let Some(entry) = scanner.next_entry() {
        let mut entry = entry?;
        if !is_class_container(entry.name()) {
            continue;
        }
        let size = entry.uncompressed_size();
        let decoded = DexDecoder
            .decode(&mut entry, size)
            .with_context(|| format!("Failed to decode {}", entry.name()))?;
        names.extend(decoded);
    }
    Ok(names)
}

fn write_results(results: &[CheckResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Text => {
            for r in results {
                let detail = match (&r.verdict, &r.error) {
                    (Some(v), _) => format!("{v:?}"),
                    (None, Some(e)) => e.clone(),
                    (None, None) => String::new(),
                };
                println!("{}\t{}\t{detail}", r.target, r.flagged);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrite_args_inserts_check_after_global_options() {
        let rewritten = rewrite_args_for_implicit_check(args(&[
            "vendor-finder",
            "--manifest",
            "/tmp/inventory.json",
            "-d",
            "com.example.app",
            "-f",
            "text",
        ]));
        assert_eq!(rewritten[1], "--manifest");
        assert_eq!(rewritten[2], "/tmp/inventory.json");
        assert_eq!(rewritten[3], "-d");
        assert_eq!(rewritten[4], "check");
        assert_eq!(rewritten[5], "com.example.app");
    }

    #[test]
    fn rewrite_args_leaves_explicit_subcommands_alone() {
        let raw = args(&["vendor-finder", "--jobs", "4", "flagged"]);
        assert_eq!(rewrite_args_for_implicit_check(raw.clone()), raw);
    }
}
