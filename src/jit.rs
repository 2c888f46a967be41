use std::io;
use std::mem;

use cranelift_codegen::ir::{types, AbiParam, Block, InstBuilder, MemFlags, Signature, Type};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_entity::EntityRef;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};

use crate::error::{BracketSide, CompileError};
use crate::syntax::{
    IDENT_DEC_DATA, IDENT_DEC_DP, IDENT_INC_DATA, IDENT_INC_DP, IDENT_JUMP_NOT_ZERO,
    IDENT_JUMP_ZERO, IDENT_READ_BYTE, IDENT_WRITE_BYTE,
};
use crate::tape::Tape;
use crate::{ByteIn, ByteOut};

/// The native entry point every program is compiled to: tape cell pointer,
/// byte-out and byte-in function pointers, opaque user data.
type EntryFn = unsafe extern "C" fn(
    *mut u8,
    extern "C" fn(u8, *mut std::ffi::c_void),
    extern "C" fn(*mut std::ffi::c_void) -> u8,
    *mut std::ffi::c_void,
);

/// Translates source text into a Cranelift control-flow graph and hands it
/// to the JIT runtime for native code generation.
///
/// Loops lower to the two-test block pattern: a header that skips the body
/// when the cell is zero on entry, and a tail that re-enters the header
/// while the cell stays non-zero. Both tests route their exit through a
/// shared `next` block. The cell pointer lives in a frontend variable, so
/// the graph needs no explicit phis.
pub struct JitCompiler<'a> {
    code: &'a [u8],
}

/// The blocks of one loop nesting level.
struct LoopBlocks {
    header: Block,
    body: Block,
    tail: Block,
    next: Block,
    /// Source offset of the `[`, for diagnostics.
    offset: usize,
}

impl<'a> JitCompiler<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code: code.as_bytes(),
        }
    }

    /// Compile the program to native code, returning the executable handle
    /// that keeps the code memory alive.
    pub fn compile(self) -> Result<JitProgram, CompileError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false").ok();
        flag_builder.set("is_pic", "false").ok();
        flag_builder.set("enable_verifier", "true").ok();
        flag_builder.set("opt_level", "speed").ok();

        let isa_builder = cranelift_native::builder()
            .map_err(|msg| CompileError::JitUnavailable(msg.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|err| CompileError::JitUnavailable(err.to_string()))?;

        let mut module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));

        let pointer_type = module.target_config().pointer_type();
        let call_conv = module.target_config().default_call_conv;

        let mut entry_sig = Signature::new(call_conv);
        for _ in 0..4 {
            entry_sig.params.push(AbiParam::new(pointer_type));
        }

        let mut byte_out_sig = Signature::new(call_conv);
        byte_out_sig.params.push(AbiParam::new(types::I8));
        byte_out_sig.params.push(AbiParam::new(pointer_type));

        let mut byte_in_sig = Signature::new(call_conv);
        byte_in_sig.params.push(AbiParam::new(pointer_type));
        byte_in_sig.returns.push(AbiParam::new(types::I8));

        let mut ctx = module.make_context();
        ctx.func.signature = entry_sig;

        let mut builder_ctx = FunctionBuilderContext::new();
        let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
        self.lower(builder, pointer_type, byte_out_sig, byte_in_sig)?;

        let id = module
            .declare_function("brainfk_main", Linkage::Export, &ctx.func.signature)
            .map_err(|err| CompileError::Codegen(err.to_string()))?;
        module
            .define_function(id, &mut ctx)
            .map_err(|err| CompileError::Codegen(err.to_string()))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|err| CompileError::Codegen(err.to_string()))?;

        let entry = module.get_finalized_function(id);

        Ok(JitProgram {
            module: Some(module),
            entry,
        })
    }

    /// One pass over the raw source, emitting the control-flow graph.
    fn lower(
        &self,
        mut builder: FunctionBuilder<'_>,
        pointer_type: Type,
        byte_out_sig: Signature,
        byte_in_sig: Signature,
    ) -> Result<(), CompileError> {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);

        let (tape, byte_out, byte_in, user_data) = {
            let params = builder.block_params(entry);
            (params[0], params[1], params[2], params[3])
        };

        let byte_out_sig = builder.import_signature(byte_out_sig);
        let byte_in_sig = builder.import_signature(byte_in_sig);

        let pos = Variable::new(0);
        builder.declare_var(pos, pointer_type);
        builder.def_var(pos, tape);

        let mut stack: Vec<LoopBlocks> = Vec::new();
        let flags = MemFlags::trusted();

        for (offset, &byte) in self.code.iter().enumerate() {
            match byte {
                IDENT_INC_DP | IDENT_DEC_DP => {
                    let delta = if byte == IDENT_INC_DP { 1 } else { -1 };
                    let addr = builder.use_var(pos);
                    let addr = builder.ins().iadd_imm(addr, delta);
                    builder.def_var(pos, addr);
                }
                IDENT_INC_DATA | IDENT_DEC_DATA => {
                    let delta = if byte == IDENT_INC_DATA { 1 } else { -1 };
                    let addr = builder.use_var(pos);
                    let cell = builder.ins().load(types::I8, flags, addr, 0);
                    let cell = builder.ins().iadd_imm(cell, delta);
                    builder.ins().store(flags, cell, addr, 0);
                }
                IDENT_WRITE_BYTE => {
                    let addr = builder.use_var(pos);
                    let cell = builder.ins().load(types::I8, flags, addr, 0);
                    builder
                        .ins()
                        .call_indirect(byte_out_sig, byte_out, &[cell, user_data]);
                }
                IDENT_READ_BYTE => {
                    let call = builder
                        .ins()
                        .call_indirect(byte_in_sig, byte_in, &[user_data]);
                    let cell = builder.inst_results(call)[0];
                    let addr = builder.use_var(pos);
                    builder.ins().store(flags, cell, addr, 0);
                }
                IDENT_JUMP_ZERO => {
                    let blocks = LoopBlocks {
                        header: builder.create_block(),
                        body: builder.create_block(),
                        tail: builder.create_block(),
                        next: builder.create_block(),
                        offset,
                    };
                    builder.ins().jump(blocks.header, &[]);
                    // Header and tail are filled at the matching `]`.
                    builder.switch_to_block(blocks.body);
                    stack.push(blocks);
                }
                IDENT_JUMP_NOT_ZERO => {
                    let blocks = stack.pop().ok_or(CompileError::UnmatchedBracket {
                        side: BracketSide::Close,
                        offset,
                    })?;
                    builder.ins().jump(blocks.tail, &[]);

                    // Initial test: skip the body when the cell is zero on
                    // loop entry.
                    builder.switch_to_block(blocks.header);
                    let addr = builder.use_var(pos);
                    let cell = builder.ins().load(types::I8, flags, addr, 0);
                    builder
                        .ins()
                        .brif(cell, blocks.body, &[], blocks.next, &[]);

                    // Post-iteration test: re-enter through the header only
                    // while the cell stays non-zero.
                    builder.switch_to_block(blocks.tail);
                    let addr = builder.use_var(pos);
                    let cell = builder.ins().load(types::I8, flags, addr, 0);
                    builder
                        .ins()
                        .brif(cell, blocks.header, &[], blocks.next, &[]);

                    builder.switch_to_block(blocks.next);
                }
                _ => {}
            }
        }

        if let Some(blocks) = stack.last() {
            return Err(CompileError::UnmatchedBracket {
                side: BracketSide::Open,
                offset: blocks.offset,
            });
        }

        builder.ins().return_(&[]);
        builder.seal_all_blocks();
        builder.finalize();

        Ok(())
    }
}

/// Native code for one program plus the JIT module that keeps it alive.
///
/// Executing starts at the tape's current cell and mutates cells through
/// the raw base pointer; the tape's pointer field is not written back.
pub struct JitProgram {
    module: Option<JITModule>,
    entry: *const u8,
}

impl std::fmt::Debug for JitProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitProgram")
            .field("entry", &self.entry)
            .finish()
    }
}

impl JitProgram {
    pub fn execute(
        &self,
        tape: &mut Tape,
        output: ByteOut<'_>,
        input: ByteIn<'_>,
    ) -> io::Result<()> {
        let mut bridge = callback::Bridge::new(output, input);

        // SAFETY: `entry` points into the module's finalized code, which
        // stays mapped for as long as `self` exists, and was compiled with
        // exactly this signature.
        let entry: EntryFn = unsafe { mem::transmute(self.entry) };
        unsafe {
            entry(
                tape.base_mut(),
                callback::write_byte,
                callback::read_byte,
                (&mut bridge as *mut callback::Bridge<'_>).cast(),
            );
        }

        bridge.finish()
    }
}

impl Drop for JitProgram {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: the entry pointer dies with `self`; nothing can call
            // into the code memory after this.
            unsafe { module.free_memory() };
        }
    }
}

mod callback {
    use std::ffi::c_void;
    use std::io;

    use crate::{ByteIn, ByteOut};

    /// Carries the caller's closures across the C ABI boundary. The JITted
    /// code sees only the two trampolines plus this struct's address as
    /// opaque user data.
    ///
    /// Errors cannot unwind through native frames, so the trampolines
    /// record the first failure and go quiet: output bytes are dropped and
    /// input reads yield zero until the program terminates on its own.
    pub struct Bridge<'a> {
        output: ByteOut<'a>,
        input: ByteIn<'a>,
        failure: Option<io::Error>,
    }

    impl<'a> Bridge<'a> {
        pub fn new(output: ByteOut<'a>, input: ByteIn<'a>) -> Self {
            Self {
                output,
                input,
                failure: None,
            }
        }

        /// The first recorded callback error, if any.
        pub fn finish(self) -> io::Result<()> {
            match self.failure {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    pub extern "C" fn write_byte(byte: u8, user_data: *mut c_void) {
        // SAFETY: user_data is the Bridge passed to the entry point, and
        // the JITted program runs on this thread for the whole call.
        let bridge = unsafe { &mut *user_data.cast::<Bridge<'_>>() };
        if bridge.failure.is_none() {
            if let Err(err) = (bridge.output)(byte) {
                bridge.failure = Some(err);
            }
        }
    }

    pub extern "C" fn read_byte(user_data: *mut c_void) -> u8 {
        // SAFETY: see write_byte.
        let bridge = unsafe { &mut *user_data.cast::<Bridge<'_>>() };
        if bridge.failure.is_some() {
            return 0;
        }
        match (bridge.input)() {
            Ok(byte) => byte,
            Err(err) => {
                bridge.failure = Some(err);
                0
            }
        }
    }
}
