//! Thin binary: parses a `.wasm` file, instantiates it with no imports, and calls an
//! exported function named on the command line with integer arguments parsed from
//! `argv`. Stands in for an out-of-scope command-line runner; all Wasm semantics live
//! in the library.

use std::env;
use std::fs;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wasm_runtime::module::types::ValueType;
use wasm_runtime::runtime::value::Value;
use wasm_runtime::{call_export, decode_module, instantiate, EmptyImporter};

fn main() -> ExitCode {
    tracing_subscriber::registry().with(tracing_tree::HierarchicalLayer::new(2)).init();

    let mut args = env::args().skip(1);
    let (path, function) = match (args.next(), args.next()) {
        (Some(path), Some(function)) => (path, function),
        _ => {
            eprintln!("usage: wasm-run <path.wasm> <export> [args...]");
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

    let module = match decode_module(&mut bytes.as_slice()) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("decoding {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let instance = match instantiate(&module, &EmptyImporter, None) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("instantiating {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let signature = match instance.exported_function(&function) {
        Some(def) => def.signature().clone(),
        None => {
            eprintln!("no export named {function:?}");
            return ExitCode::FAILURE;
        }
    };

    let raw_args: Vec<String> = args.collect();
    if raw_args.len() != signature.params.len() {
        eprintln!("{function} takes {} argument(s), got {}", signature.params.len(), raw_args.len());
        return ExitCode::FAILURE;
    }

    let mut call_args = Vec::with_capacity(raw_args.len());
    for (raw, value_type) in raw_args.iter().zip(&signature.params) {
        let parsed = match value_type {
            ValueType::I32 => raw.parse::<i32>().map(Value::I32).map_err(|e| e.to_string()),
            ValueType::I64 => raw.parse::<i64>().map(Value::I64).map_err(|e| e.to_string()),
            ValueType::F32 => raw.parse::<f32>().map(Value::F32).map_err(|e| e.to_string()),
            ValueType::F64 => raw.parse::<f64>().map(Value::F64).map_err(|e| e.to_string()),
        };
        match parsed {
            Ok(value) => call_args.push(value),
            Err(e) => {
                eprintln!("parsing argument {raw:?} as {value_type:?}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    match call_export(&instance, &function, &call_args) {
        Ok(results) => {
            println!("{results:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("trap: {e}");
            ExitCode::FAILURE
        }
    }
}
