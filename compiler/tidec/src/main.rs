use std::path::Path;

use tidec_abi::target::BackendKind;
use tidec_codegen_llvm::entry::llvm_codegen_lir_unit;
use tidec_lir::lir::{
    CallConv, DefId, EmitKind, Linkage, LirBody, LirBodyKind, LirBodyMetadata, LirItemKind,
    LirTyCtx, LirUnit, LirUnitMetadata, UnnamedAddress, Visibility,
};
use tidec_lir::basic_blocks::{BasicBlockData, ENTRY_BLOCK};
use tidec_lir::syntax::{
    ConstOperand, ConstScalar, ConstTy, ConstValue, LirTy, LocalData, Operand, Place,
    RawScalarValue, RValue, RETURN_LOCAL, Statement, Terminator,
};
use tidec_utils::index_vec::IdxVec;
use tracing::debug;

// TIDEC_FILTER=debug cargo run; clang main.ll -o main; ./main; echo $?
//
// Lowers the equivalent of:
// ```c
// int main() {
//    int x = 5;
//    return x;
// }
// ```
fn main() {
    init_tidec_logger();
    debug!("Logging initialized");

    let lir_ty_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
    let lir_unit = demo_unit();

    let llvm_ir = llvm_codegen_lir_unit(lir_ty_ctx, lir_unit);
    std::fs::write(Path::new("main.ll"), &llvm_ir).expect("failed to write main.ll");
    println!("{llvm_ir}");
}

fn demo_unit() -> LirUnit {
    let main_metadata = LirBodyMetadata {
        def_id: DefId(0),
        name: "main".to_string(),
        kind: LirBodyKind::Item(LirItemKind::Function),
        inlined: false,
        linkage: Linkage::External,
        visibility: Visibility::Default,
        unnamed_address: UnnamedAddress::None,
        call_conv: CallConv::C,
    };

    // `ret_and_args[0]` is the return place; `main` takes no arguments.
    let ret_and_args = IdxVec::from_raw(vec![LocalData {
        ty: LirTy::I32,
        mutable: true,
    }]);

    // One local: `x`, the first local after the return place.
    let x = RETURN_LOCAL.next();
    let locals = IdxVec::from_raw(vec![LocalData {
        ty: LirTy::I32,
        mutable: false,
    }]);

    let assign_x = Statement::Assign(Box::new((
        Place::from_local(x),
        RValue::Use(Operand::Constant(ConstOperand::Value(
            ConstValue::Scalar(ConstScalar::Value(RawScalarValue::from_u64(5, 4))),
            ConstTy::I32,
        ))),
    )));

    let entry_block = BasicBlockData {
        statements: vec![assign_x],
        terminator: Terminator::Return(Some(Operand::Use(Place::from_local(x)))),
    };

    let mut basic_blocks = IdxVec::new();
    let inserted = basic_blocks.push(entry_block);
    debug_assert_eq!(inserted, ENTRY_BLOCK);

    let main_body = LirBody {
        metadata: main_metadata,
        ret_and_args,
        locals,
        basic_blocks,
    };

    LirUnit {
        metadata: LirUnitMetadata {
            unit_name: "main_unit".to_string(),
        },
        bodies: IdxVec::from_raw(vec![main_body]),
    }
}

/// Initialize the logger for the tidec project.
fn init_tidec_logger() {
    let cfg = tidec_log::LoggerConfig::from_env("TIDEC").unwrap_or_else(|err| {
        eprintln!("Error reading logger configuration: {:?}", err);
        std::process::exit(1);
    });

    if let Err(err) = tidec_log::Logger::init_logger(cfg) {
        eprintln!("Error initializing logger: {:?}", err);
        std::process::exit(1);
    }
}
