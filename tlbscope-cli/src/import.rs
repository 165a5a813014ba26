use std::path::Path;

use anyhow::{bail, Context};
use serde::Serialize;
use tlbscope::prelude::*;

use crate::{
    app::{Cli, Machine},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct ImportSummary {
    source: String,
    assemblies: Vec<AssemblySummary>,
    diagnostics: Vec<DiagnosticSummary>,
}

#[derive(Debug, Serialize)]
struct AssemblySummary {
    name: String,
    version: String,
    library: String,
    types: usize,
    primary: bool,
    path: String,
}

#[derive(Debug, Serialize)]
struct DiagnosticSummary {
    severity: String,
    code: String,
    message: String,
}

/// Translate the command line into [`ImportOptions`].
pub fn options(cli: &Cli) -> anyhow::Result<ImportOptions> {
    let mut options = ImportOptions::new()
        .with_verbose(cli.verbose)
        .with_unsafe_interfaces(cli.unsafe_interfaces);

    if let Some(out) = &cli.out {
        options = options.with_output(out);
    }
    if let Some(name) = &cli.asm_name {
        options = options.with_assembly_name(name);
    }
    if let Some(version) = &cli.asm_version {
        let version = AssemblyVersion::parse(version)
            .with_context(|| format!("invalid assembly version: {version}"))?;
        options = options.with_assembly_version(version);
    }
    if let Some(namespace) = &cli.namespace {
        options = options.with_namespace(namespace);
    }
    if let Some(path) = &cli.public_key {
        let key = std::fs::read(path)
            .with_context(|| format!("failed to read public key: {}", path.display()))?;
        options = options.with_public_key(key);
    }
    if let Some(path) = &cli.key_file {
        options = options.with_key_file(path);
    }

    let mut transforms = Transforms::empty();
    for name in &cli.transform {
        match Transforms::from_name(name) {
            Some(transform) => transforms |= transform,
            None => bail!("unknown transform: {name}"),
        }
    }
    options = options.with_transforms(transforms);

    for reference in &cli.reference {
        options = options.with_reference(reference);
    }
    for dir in &cli.search_path {
        options = options.with_search_path(dir);
    }
    // the input's own directory is always searched last
    if let Some(dir) = cli.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        options = options.with_search_path(dir);
    }

    for code in &cli.silence {
        options = options.with_silenced(parse_code(code)?);
    }

    options = options.with_open_flags(match cli.machine {
        Some(Machine::X86) => OpenFlags::LOAD_AS_32_BIT,
        Some(Machine::X64) => OpenFlags::LOAD_AS_64_BIT,
        None => OpenFlags::empty(),
    });

    let policy = cli
        .carray
        .parse::<CArrayPolicy>()
        .map_err(|_| anyhow::anyhow!("invalid --carray value: {}", cli.carray))?;
    Ok(options.with_carray_policy(policy))
}

/// Parse a diagnostic code given as `2001` or `TI2001`.
fn parse_code(code: &str) -> anyhow::Result<u16> {
    let digits = code
        .strip_prefix("TI")
        .or_else(|| code.strip_prefix("ti"))
        .unwrap_or(code);
    digits
        .parse::<u16>()
        .with_context(|| format!("invalid diagnostic code: {code}"))
}

/// Import `cli.path`, report diagnostics on stderr and write every produced assembly.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = options(cli)?;
    log::debug!("importing {} with {options:?}", cli.path.display());

    let mut result = Importer::new(options).import_file(&cli.path)?;
    for diagnostic in result.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }

    let written = result.save_all()?;
    for path in &written {
        log::info!("wrote {}", path.display());
    }

    let summary = summarize(&cli.path, &result);
    print_output(&summary, cli.json, print_summary)
}

fn summarize(source: &Path, result: &ImportResult) -> ImportSummary {
    ImportSummary {
        source: source.display().to_string(),
        assemblies: result
            .assemblies
            .iter()
            .map(|assembly| AssemblySummary {
                name: assembly.identity.name.clone(),
                version: assembly.identity.version.to_string(),
                library: format!(
                    "{} {}.{}",
                    assembly.library.guid, assembly.library.major, assembly.library.minor
                ),
                // <Module> is not a projected type
                types: assembly.builder().type_def_count().saturating_sub(1),
                primary: assembly.primary,
                path: assembly.path.display().to_string(),
            })
            .collect(),
        diagnostics: result
            .diagnostics
            .iter()
            .map(|diagnostic| DiagnosticSummary {
                severity: diagnostic.severity.to_string(),
                code: format!("TI{}", diagnostic.code),
                message: diagnostic.message.clone(),
            })
            .collect(),
    }
}

fn print_summary(summary: &ImportSummary) {
    println!("Source: {}", summary.source);
    println!();

    let mut table = TabWriter::new(vec![
        ("Assembly", Align::Left),
        ("Version", Align::Left),
        ("Types", Align::Right),
        ("Output", Align::Left),
    ]);
    for assembly in &summary.assemblies {
        let name = if assembly.primary {
            format!("{} (primary)", assembly.name)
        } else {
            assembly.name.clone()
        };
        table.row(vec![
            name,
            assembly.version.clone(),
            assembly.types.to_string(),
            assembly.path.clone(),
        ]);
    }
    table.print();

    let warnings = summary
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity != "info")
        .count();
    if warnings > 0 {
        println!();
        println!("{warnings} warning(s) or error(s) reported");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("tlbscope").chain(args.iter().copied()))
    }

    #[test]
    fn maps_every_option() {
        let cli = cli(&[
            "lib/shapes.tlb",
            "--out",
            "Interop.Shapes.dll",
            "--asm-name",
            "Interop.Shapes",
            "--asm-version",
            "1.2.3.4",
            "--namespace",
            "Shapes",
            "--unsafe",
            "--transform",
            "serializablevalueclasses",
            "--transform",
            "dispret",
            "--reference",
            "stdole.dll",
            "--search-path",
            "deps",
            "--silence",
            "TI2001",
            "--silence",
            "4001",
            "--machine",
            "x64",
            "--carray",
            "byval",
        ]);
        let options = options(&cli).unwrap();

        assert_eq!(options.output, Some(PathBuf::from("Interop.Shapes.dll")));
        assert_eq!(options.assembly_name.as_deref(), Some("Interop.Shapes"));
        assert_eq!(options.assembly_version.unwrap().to_string(), "1.2.3.4");
        assert_eq!(options.namespace.as_deref(), Some("Shapes"));
        assert!(options.unsafe_interfaces);
        assert_eq!(
            options.transforms,
            Transforms::SERIALIZABLE_VALUE_CLASSES | Transforms::DISPATCH_RETVAL
        );
        assert_eq!(options.references, [PathBuf::from("stdole.dll")]);
        assert_eq!(
            options.search_paths,
            [PathBuf::from("deps"), PathBuf::from("lib")]
        );
        assert!(options.silenced.contains(&2001));
        assert!(options.silenced.contains(&4001));
        assert_eq!(options.open_flags, OpenFlags::LOAD_AS_64_BIT);
        assert_eq!(options.carray_policy, CArrayPolicy::ByValArray);
    }

    #[test]
    fn defaults() {
        let options = options(&cli(&["shapes.tlb"])).unwrap();
        assert!(options.output.is_none());
        assert!(options.search_paths.is_empty());
        assert_eq!(options.transforms, Transforms::empty());
        assert_eq!(options.carray_policy, CArrayPolicy::UnfoldSoleField);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(options(&cli(&["a.tlb", "--transform", "bogus"])).is_err());
        assert!(options(&cli(&["a.tlb", "--carray", "some"])).is_err());
        assert!(options(&cli(&["a.tlb", "--silence", "TIx"])).is_err());
        assert!(options(&cli(&["a.tlb", "--asm-version", "one"])).is_err());
    }
}
