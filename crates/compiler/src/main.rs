//! stackc CLI
//!
//! Command-line interface for compiling dialect sources to bytecode images
//! and running them on the virtual machine.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use stackc::CompilerConfig;
use stackc_vm::Vm;

#[derive(ClapParser)]
#[command(name = "stackc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile a restricted C dialect to stack-machine bytecode", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to a bytecode image
    Build {
        /// Input source file
        input: PathBuf,

        /// Output image path (defaults to the input with a .sbc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the instruction listing instead of only writing the image
        #[arg(long)]
        disasm: bool,

        /// Compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compile and run a source file; the program's exit code becomes the
    /// process exit code
    Run {
        /// Input source file
        input: PathBuf,

        /// VM memory size in bytes (up to 65536)
        #[arg(long)]
        memory_size: Option<usize>,

        /// Compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stackc=warn".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            input,
            output,
            disasm,
            config,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("sbc"));
            run_build(&input, &output, disasm, config.as_deref());
        }
        Commands::Run {
            input,
            memory_size,
            config,
        } => {
            run_run(&input, memory_size, config.as_deref());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stackc", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    match path {
        Some(path) => CompilerConfig::from_toml_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => CompilerConfig::default(),
    }
}

fn compile_file(input: &Path, config: &CompilerConfig) -> stackc::GeneratedProgram {
    let source = std::fs::read_to_string(input).unwrap_or_else(|e| {
        eprintln!("Error: failed to read '{}': {}", input.display(), e);
        process::exit(1);
    });
    stackc::compile_with_config(&source, config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    })
}

fn run_build(input: &Path, output: &Path, disasm: bool, config: Option<&Path>) {
    let config = load_config(config);
    let program = compile_file(input, &config);
    if disasm {
        print!("{}", program.disassemble());
    }
    if let Err(e) = std::fs::write(output, &program.bytes) {
        eprintln!("Error: failed to write '{}': {}", output.display(), e);
        process::exit(1);
    }
    println!(
        "Compiled {} -> {} ({} bytes)",
        input.display(),
        output.display(),
        program.bytes.len()
    );
}

fn run_run(input: &Path, memory_size: Option<usize>, config: Option<&Path>) {
    let config = load_config(config);
    let memory_size = memory_size.unwrap_or(config.memory_size);
    let program = compile_file(input, &config);
    let mut vm = Vm::new(program.bytes, memory_size).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });
    match vm.run() {
        Ok(status) => process::exit(status as i32),
        Err(fault) => {
            eprintln!("Error: {}", fault);
            process::exit(1);
        }
    }
}
