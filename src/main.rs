//! Micromachine Emulator - CLI Entry Point
//!
//! Commands:
//! - `micromachine-emu run <program>` - Run a program until it halts
//! - `micromachine-emu debug <program>` - Interactive TUI debugger
//! - `micromachine-emu check <program>` - Validate mnemonics without running

use clap::{Parser, Subcommand};
use micromachine::cpu::{ControlStore, Cpu, Memory, StepState, DEFAULT_MEMORY_SIZE};
use micromachine::io::{
    BufferDevice, FileInputDevice, FileOutputDevice, IoDevice, SharedDevice,
};
use micromachine::program::load_program_file;

#[derive(Parser)]
#[command(name = "micromachine-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A microprogrammed register-transfer-level CPU emulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program file to execute
        program: String,
        /// Maximum number of control signals to execute (default: 100000)
        #[arg(short, long, default_value = "100000")]
        max_cycles: u64,
        /// Print every executed control signal
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON
        #[arg(short, long)]
        json: bool,
        /// Attach a file as input device 0
        #[arg(short, long)]
        input: Option<String>,
        /// Attach a file as output device 1
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program file to debug
        program: String,
    },
    /// Validate a program's mnemonics without executing it
    Check {
        /// Path to the program file
        program: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            max_cycles,
            trace,
            json,
            input,
            output,
        }) => {
            run_program(&program, max_cycles, trace, json, input, output);
        }
        Some(Commands::Debug { program }) => {
            debug_program(&program);
        }
        Some(Commands::Check { program }) => {
            check_program(&program);
        }
        None => {
            println!("Micromachine Emulator v0.1.0");
            println!("A microprogrammed CPU emulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn run_program(
    path: &str,
    max_cycles: u64,
    trace: bool,
    json: bool,
    input: Option<String>,
    output: Option<String>,
) {
    let instructions = match load_program_file(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    println!("Loaded {} instructions from {}", instructions.len(), path);

    // Device 0 is input, device 1 is output. Buffer devices stand in when
    // no files are given so OUTPUT_CHAR programs still have somewhere to
    // write.
    let echo = SharedDevice::new(BufferDevice::new("buffer-out"));
    let file_out: Option<SharedDevice<FileOutputDevice>> = match &output {
        Some(p) => match FileOutputDevice::create("file-out", p) {
            Ok(dev) => Some(SharedDevice::new(dev)),
            Err(e) => {
                eprintln!("Failed to open output file: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let input_device: Box<dyn IoDevice> = match &input {
        Some(p) => match FileInputDevice::open("file-in", p) {
            Ok(dev) => Box::new(dev),
            Err(e) => {
                eprintln!("Failed to open input file: {}", e);
                std::process::exit(1);
            }
        },
        None => Box::new(BufferDevice::new("buffer-in")),
    };
    let output_device: Box<dyn IoDevice> = match &file_out {
        Some(dev) => Box::new(dev.clone()),
        None => Box::new(echo.clone()),
    };

    let mut cpu = Cpu::new(
        Memory::new(DEFAULT_MEMORY_SIZE),
        vec![input_device, output_device],
    );
    cpu.load_program(instructions);

    println!();
    println!("--- Execution ---");

    while !cpu.is_halted() && cpu.cycles() < max_cycles {
        let pc = cpu.pc();
        match cpu.step() {
            StepState::Running(signal) => {
                if trace {
                    println!(
                        "{:04}  {:<32} PC={} MAR={} MBR={}",
                        cpu.cycles(),
                        signal.to_string(),
                        pc,
                        cpu.mar(),
                        cpu.mbr()
                    );
                }
            }
            StepState::Halted(_) => break,
        }
    }

    let pending = cpu.drain_interrupts();

    if let Some(dev) = &file_out {
        if let Err(e) = dev.borrow_mut().close() {
            eprintln!("Failed to close output file: {}", e);
        }
    }

    if json {
        let snapshot = cpu.snapshot(0, 32);
        match serde_json::to_string_pretty(&snapshot) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to serialize snapshot: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!();
    println!("--- Result ---");
    println!("Signals executed: {}", cpu.cycles());
    match cpu.halt_reason() {
        Some(reason) => println!("Halted: {}", reason),
        None => println!(
            "Still running after {} signals (raise --max-cycles to continue)",
            cpu.cycles()
        ),
    }
    println!("PC: {}", cpu.pc());
    if let Some(ir) = cpu.ir() {
        println!("IR: {}", ir);
    }
    let flags = cpu.flags();
    println!(
        "Flags: zero={} carry={} sign={} overflow={}",
        flags.zero, flags.carry, flags.sign, flags.overflow
    );
    println!("Registers:");
    for (name, value) in cpu.registers().snapshot() {
        println!("  {:<8} = {}", name, value);
    }
    if !pending.is_empty() {
        println!("Unconsumed compare results: {:?}", pending);
    }
    if output.is_none() {
        let text = echo.borrow().output_text();
        if !text.is_empty() {
            println!("Output: {}", text);
        }
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    use micromachine::tui::run_debugger;

    let instructions = match load_program_file(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to load program: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} instructions. Launching debugger...", instructions.len());

    if let Err(e) = run_debugger(instructions) {
        eprintln!("Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str) {
    eprintln!("This binary was built without the `tui` feature.");
    std::process::exit(1);
}

fn check_program(path: &str) {
    let instructions = match load_program_file(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to load program: {}", e);
            std::process::exit(1);
        }
    };

    let store = ControlStore::new();
    let mut unknown = 0usize;

    for (addr, line) in instructions.iter().enumerate() {
        let mnemonic = line.split_whitespace().next().unwrap_or("");
        if !store.contains(mnemonic) {
            println!("{:04}: unrecognized instruction: {}", addr, line);
            unknown += 1;
        }
    }

    if unknown == 0 {
        println!("{} instructions, all mnemonics recognized", instructions.len());
    } else {
        println!("{} unrecognized instruction(s)", unknown);
        println!("Supported mnemonics: {}", store.mnemonics().join(", "));
        std::process::exit(1);
    }
}
