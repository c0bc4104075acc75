//! Thin binary: reads a `.wasm` file and pretty-prints its decoded section list and
//! instruction stream. Stands in for an out-of-scope human-readable disassembler; all
//! Wasm semantics live in the library, this just calls `decode_module` and formats.

use std::env;
use std::fs;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wasm_runtime::decode_module;

fn main() -> ExitCode {
    tracing_subscriber::registry().with(tracing_tree::HierarchicalLayer::new(2)).init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: wasm-dump <path.wasm>");
            return ExitCode::FAILURE;
        }
    };

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("reading {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match decode_module(&mut bytes.as_slice()) {
        Ok(module) => {
            println!("{module:#?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("decoding {path}: {e}");
            ExitCode::FAILURE
        }
    }
}
