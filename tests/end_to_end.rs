//! Integration tests hand-assembling binary modules byte-by-byte and driving them
//! through the public API, covering the end-to-end scenarios of round-trip fidelity,
//! function calls, control flow, indirect-call trapping, memory growth caps, and
//! data-segment bounds.

use std::rc::Rc;
use wasm_runtime::module::instr::Instruction as I;
use wasm_runtime::module::section::{ExportDesc, FunctionBody};
use wasm_runtime::module::types::{BlockType, ElementType, FunctionSignature, Limits, MemoryType, TableType, ValueType};
use wasm_runtime::runtime::error::Trap;
use wasm_runtime::{call_export, decode_module, encode_module, instantiate, EmptyImporter, ExecutionPolicy, Module, Value};

const EMPTY_MODULE_BYTES: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

#[test]
fn round_trip_empty_module() {
    let module = decode_module(&mut EMPTY_MODULE_BYTES.as_slice()).unwrap();
    assert!(module.sections().is_empty());

    let mut buf = Vec::new();
    encode_module(&module, &mut buf).unwrap();
    assert_eq!(buf, EMPTY_MODULE_BYTES);
}

#[test]
fn add_function() {
    let mut module = Module::new();
    let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])));
    let function_index = module.add_function(
        type_index,
        FunctionBody { locals: vec![], body: vec![I::LocalGet(0), I::LocalGet(1), I::I32Add], extra: vec![] },
    );
    module.add_export("add", ExportDesc::Function(function_index));

    let instance = instantiate(&module, &EmptyImporter, None).unwrap();
    let result = call_export(&instance, "add", &[Value::I32(2), Value::I32(3)]).unwrap();
    assert_eq!(result, vec![Value::I32(5)]);
}

#[test]
fn factorial_with_loop() {
    let mut module = Module::new();
    let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32])));
    let body = vec![
        I::I32Const(1),
        I::LocalSet(1),
        I::Loop {
            block_type: BlockType::Empty,
            body: vec![
                I::LocalGet(0),
                I::I32Eqz,
                I::BrIf { label: 1 },
                I::LocalGet(1),
                I::LocalGet(0),
                I::I32Mul,
                I::LocalSet(1),
                I::LocalGet(0),
                I::I32Const(1),
                I::I32Sub,
                I::LocalSet(0),
                I::Br { label: 0 },
            ],
        },
        I::LocalGet(1),
    ];
    let function_index = module.add_function(type_index, FunctionBody { locals: vec![(1, ValueType::I32)], body, extra: vec![] });
    module.add_export("fact", ExportDesc::Function(function_index));

    let instance = instantiate(&module, &EmptyImporter, None).unwrap();
    assert_eq!(call_export(&instance, "fact", &[Value::I32(5)]).unwrap(), vec![Value::I32(120)]);
    assert_eq!(call_export(&instance, "fact", &[Value::I32(0)]).unwrap(), vec![Value::I32(1)]);
}

#[test]
fn indirect_call_type_mismatch_traps() {
    let mut module = Module::new();
    let callee_type = module.add_type(Rc::new(FunctionSignature::new(vec![], vec![ValueType::I32])));
    let caller_type = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32])));
    let callee_index =
        module.add_function(callee_type, FunctionBody { locals: vec![], body: vec![I::I32Const(7)], extra: vec![] });
    module.add_table(TableType { element_type: ElementType::AnyFunc, limits: Limits { initial: 1, maximum: None } });
    module.add_element_segment(0, vec![I::I32Const(0)], vec![callee_index]);

    let caller_body = vec![I::I32Const(0), I::CallIndirect { type_index: caller_type }];
    let caller_index = module.add_function(callee_type, FunctionBody { locals: vec![], body: caller_body, extra: vec![] });
    module.add_export("caller", ExportDesc::Function(caller_index));

    let instance = instantiate(&module, &EmptyImporter, None).unwrap();
    let err = call_export(&instance, "caller", &[]).unwrap_err();
    let wasm_runtime::WasmError::Trap(trap) = err else { panic!("expected a trap, got {err:?}") };
    assert!(matches!(trap, Trap::IndirectCallTypeMismatch));
    assert_eq!(trap.to_string(), "indirect call type mismatch");
}

#[test]
fn memory_grow_cap() {
    let mut module = Module::new();
    module.add_memory(MemoryType { limits: Limits { initial: 1, maximum: Some(3) } });
    let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32])));
    let function_index =
        module.add_function(type_index, FunctionBody { locals: vec![], body: vec![I::LocalGet(0), I::MemoryGrow], extra: vec![] });
    module.add_export("grow", ExportDesc::Function(function_index));
    let size_index = module.add_function(type_index, FunctionBody { locals: vec![], body: vec![I::MemorySize], extra: vec![] });
    module.add_export("size", ExportDesc::Function(size_index));

    let policy = ExecutionPolicy { max_memory_size: 2, ..ExecutionPolicy::default() };
    let instance = instantiate(&module, &EmptyImporter, Some(policy)).unwrap();

    let result = call_export(&instance, "grow", &[Value::I32(2)]).unwrap();
    assert_eq!(result, vec![Value::I32(-1)]);
    assert_eq!(call_export(&instance, "size", &[]).unwrap(), vec![Value::I32(1)]);
}

#[test]
fn data_segment_copy_traps_out_of_bounds() {
    let mut module = Module::new();
    module.add_memory(MemoryType { limits: Limits { initial: 1, maximum: None } });
    module.add_data_segment(0, vec![I::I32Const(65_530)], vec![0; 10]);

    let err = instantiate(&module, &EmptyImporter, None).unwrap_err();
    let wasm_runtime::WasmError::Trap(trap) = err else { panic!("expected a trap, got {err:?}") };
    assert!(matches!(trap, Trap::OutOfBoundsMemoryAccess));
}

#[test]
fn misaligned_load_traps_only_when_policy_enforces_it() {
    let mut module = Module::new();
    module.add_memory(MemoryType { limits: Limits { initial: 1, maximum: None } });
    let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![], vec![ValueType::I32])));
    let mem_arg = wasm_runtime::module::instr::MemArg { align: 2, offset: 1 };
    let function_index =
        module.add_function(type_index, FunctionBody { locals: vec![], body: vec![I::I32Const(0), I::I32Load(mem_arg)], extra: vec![] });
    module.add_export("read", ExportDesc::Function(function_index));

    let lenient = instantiate(&module, &EmptyImporter, None).unwrap();
    assert_eq!(call_export(&lenient, "read", &[]).unwrap(), vec![Value::I32(0)]);

    let strict_policy = ExecutionPolicy { enforce_alignment: true, ..ExecutionPolicy::default() };
    let strict = instantiate(&module, &EmptyImporter, Some(strict_policy)).unwrap();
    let err = call_export(&strict, "read", &[]).unwrap_err();
    let wasm_runtime::WasmError::Trap(trap) = err else { panic!("expected a trap, got {err:?}") };
    assert!(matches!(trap, Trap::MisalignedMemoryAccess));
    assert_eq!(trap.to_string(), "misaligned memory access");
}

#[test]
fn calling_export_with_wrong_argument_count_traps() {
    let mut module = Module::new();
    let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])));
    let function_index =
        module.add_function(type_index, FunctionBody { locals: vec![], body: vec![I::LocalGet(0), I::LocalGet(1), I::I32Add], extra: vec![] });
    module.add_export("add", ExportDesc::Function(function_index));

    let instance = instantiate(&module, &EmptyImporter, None).unwrap();
    let err = call_export(&instance, "add", &[Value::I32(2)]).unwrap_err();
    let wasm_runtime::WasmError::Trap(trap) = err else { panic!("expected a trap, got {err:?}") };
    assert!(matches!(trap, Trap::Host(_)));
}
