//! Lower a write syscall and dump the instruction listing with encoded bytes.

use bumpalo::Bump;
use clap::Parser;

use jitx64::ir::context::{ir_length, Architecture, InstructionEncoder, LoweringContext};
use jitx64::ir::{linux_write, Expr, SsaContext, Statement};
use jitx64::x64::{X64Architecture, X64Encoder};

#[derive(Parser, Debug)]
#[command(about = "Lower write(fd, message) to x86-64 and dump the listing")]
struct Args {
    /// Message to pass to the write syscall.
    #[arg(default_value = "hello, world\n")]
    message: String,

    /// File descriptor argument.
    #[arg(long, default_value_t = 1)]
    fd: u64,

    /// Only print the probed byte length, emit nothing.
    #[arg(long)]
    probe: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let arena = Bump::new();
    let (arch, encoder) = (X64Architecture, X64Encoder::new());
    let mut ctx = LoweringContext::new(&arena, &arch, &encoder).with_data_base(0x400000);

    let bytes = args.message.as_bytes();
    let statement = Statement::Return(linux_write(Expr::U64(args.fd), bytes, bytes.len()));
    let mut ssa = SsaContext::new();

    for statement in statement.ssa_transform(&mut ssa) {
        statement.add_to_data_section(&mut ctx)?;
        if args.probe {
            println!("{statement}  ; {} bytes", ir_length(&statement, &mut ctx)?);
            continue;
        }
        arch.encode_statement(&statement, &mut ctx)?;
    }

    for instruction in ctx.instructions() {
        let encoded = encoder.encode(instruction)?;
        let hex: Vec<String> = encoded.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:<40} ; {}", instruction.to_string(), hex.join(" "));
    }
    Ok(())
}
