//! AI Engine netlist to libxaie compiler CLI
//!
//! Usage:
//!   netlist2xaie design.json -o aie_inc.cpp
//!   netlist2xaie design.json --config vck190.json --json
//!   cat design.json | netlist2xaie -v

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser as ClapParser;
use colored::Colorize;

use netlist_to_xaie::{compile_module, CodegenConfig, Module, XaieProgram};

#[derive(ClapParser, Debug)]
#[command(name = "netlist2xaie")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Lowers an AI Engine device netlist to libxaie configuration code")]
struct Args {
    /// Netlist JSON file; read from stdin when omitted
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Write the generated program here instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Code generation settings (JSON)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Output the structured program as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn fail(what: &str, detail: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", what.red(), detail);
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let source = if let Some(path) = &args.input {
        fs::read_to_string(path)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read file '{}': {}", path.display(), e)))
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read stdin: {}", e)));
        buffer
    };

    let config = match &args.config {
        Some(path) => CodegenConfig::from_file(path).unwrap_or_else(|e| fail("Config error", e)),
        None => CodegenConfig::default(),
    };

    let module = Module::from_json(&source).unwrap_or_else(|e| fail("Input error", e));

    if args.verbose {
        print_summary(&module);
    }

    let program = compile_module(&module, &config).unwrap_or_else(|e| fail("Compilation error", e));

    let rendered = if args.json_output {
        program
            .to_json()
            .unwrap_or_else(|e| fail("Error", format!("Failed to serialize to JSON: {}", e)))
    } else {
        program.to_string()
    };

    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .unwrap_or_else(|e| fail("Error", format!("Failed to write '{}': {}", path.display(), e)));
            if args.verbose {
                print_result(&program);
                eprintln!("{}: {}", "Written".green(), path.display());
            }
        }
        None => {
            print!("{}", rendered);
            if args.verbose {
                print_result(&program);
            }
        }
    }
}

fn print_summary(module: &Module) {
    eprintln!("{}", "AI Engine netlist to libxaie".bold().blue());
    eprintln!("{}", "=".repeat(35));
    let Ok(device) = module.device() else {
        return;
    };
    eprintln!(
        "{}: {:?} {}x{} ({} mem tile rows)",
        "Target".cyan(),
        device.target.arch,
        device.target.columns,
        device.target.rows,
        device.target.mem_tile_rows
    );
    eprintln!("{}: {}", "Tiles".cyan(), device.tiles.len());
    eprintln!("{}: {}", "Cores".cyan(), device.cores.len());
    eprintln!("{}: {}", "DMA engines".cyan(), device.dmas.len());
    eprintln!("{}: {}", "Switchboxes".cyan(), device.switchboxes.len());
    eprintln!();
}

fn print_result(program: &XaieProgram) {
    eprintln!();
    eprintln!("{}", "Generated entry points".bold().green());
    eprintln!("{}", "-".repeat(50));
    for function in program.functions() {
        eprintln!("  {:<40} {} calls", function.name, function.calls().len());
    }
    eprintln!("{}: {}", "Accessors".cyan(), program.accessors.len());
    eprintln!("{}: {}", "Total driver calls".cyan(), program.call_count());
}
