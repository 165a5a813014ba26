use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// tlbscope - import COM type libraries as metadata-only .NET assemblies
#[derive(Debug, Parser)]
#[command(name = "tlbscope", version, about, long_about = None)]
pub struct Cli {
    /// Type library to import (.tlb).
    #[arg(value_name = "TYPELIB")]
    pub path: PathBuf,

    /// Output assembly path. Defaults to `<AssemblyName>.dll` in the working directory.
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Name of the primary assembly.
    #[arg(long, value_name = "NAME")]
    pub asm_name: Option<String>,

    /// Version of the primary assembly (e.g. 1.2.0.0).
    #[arg(long, value_name = "VERSION")]
    pub asm_version: Option<String>,

    /// Namespace of the projected types. Defaults to the library name.
    #[arg(long)]
    pub namespace: Option<String>,

    /// File holding a raw public key blob to sign the output with.
    #[arg(long, value_name = "FILE", conflicts_with = "key_file")]
    pub public_key: Option<PathBuf>,

    /// Strong name key file (.snk) to sign the output with.
    #[arg(long, value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    /// Suppress unmanaged code security checks on interfaces and classes.
    #[arg(long = "unsafe")]
    pub unsafe_interfaces: bool,

    /// Apply a well-known transform: serializablevalueclasses, dispret.
    #[arg(long, value_name = "NAME")]
    pub transform: Vec<String>,

    /// Previously imported assembly consulted before importing a dependency again.
    #[arg(short, long, value_name = "FILE")]
    pub reference: Vec<PathBuf>,

    /// Directory searched for dependent type libraries.
    #[arg(long, value_name = "DIR")]
    pub search_path: Vec<PathBuf>,

    /// Report informational diagnostics and enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Drop diagnostics with this code (e.g. 2001 or TI2001).
    #[arg(long, value_name = "CODE")]
    pub silence: Vec<String>,

    /// Require a library compiled for this platform.
    #[arg(long, value_enum)]
    pub machine: Option<Machine>,

    /// Projection of C array fields in records.
    #[arg(long, default_value = "sole", value_name = "sole|all|byval")]
    pub carray: String,

    /// Emit the run summary as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

/// Target platform accepted by `--machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Machine {
    /// 32-bit Windows
    X86,
    /// 64-bit Windows
    X64,
}
