//! IL assembler.
//!
//! [`ILEmitter`] builds a single instruction stream with locals, labels,
//! protected regions and a private token table, then links it into a
//! [`MethodIL`].
//!
//! # Regions
//!
//! ```text
//!   let inner = e.new_catch_region(exception);   // created first: reported first
//!   let outer = e.new_finally_region();
//!   e.begin_try(outer);
//!   e.begin_try(inner);
//!     ...
//!   e.end_try(inner);   e.begin_handler(inner);  ...  e.end_handler(inner);
//!     ...
//!   e.end_try(outer);   e.begin_handler(outer);  ...  e.end_handler(outer);
//! ```
//!
//! Regions are reported in creation order, so nested regions must be
//! created before the regions enclosing them.
//!
//! # Stack tracking
//!
//! The emitter tracks evaluation stack depth to compute `max_stack`. Depth
//! is reset after instructions that end a block and restored from the
//! depth recorded at branches to the next marked label.

use crate::method_il::{ExceptionRegion, ExceptionRegionKind, MethodIL};
use crate::opcode::{ILOpcode, OperandKind};
use crate::token::{LocalTokens, Token, TokenObject};
use ilc_types::{MethodHandle, MethodSignature, TypeHandle, TypeSystemContext};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A local variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ILLocal(u16);

impl ILLocal {
    #[inline]
    pub fn index(self) -> u16 {
        self.0
    }
}

/// A branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ILLabel(u32);

/// A protected region under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ILRegion(usize);

#[derive(Debug)]
struct BranchFixup {
    /// Byte offset of the 4-byte displacement.
    operand_offset: usize,
    /// Offset the displacement is relative to.
    next_offset: u32,
    label: ILLabel,
}

#[derive(Debug)]
struct RegionBuilder {
    kind: ExceptionRegionKind,
    class_token: Option<Token>,
    try_start: Option<u32>,
    try_end: Option<u32>,
    handler_start: Option<u32>,
    handler_end: Option<u32>,
}

/// Instruction stream builder for one method body.
pub struct ILEmitter<'a> {
    ctx: &'a TypeSystemContext,
    code: Vec<u8>,
    locals: Vec<TypeHandle>,

    tokens: Vec<TokenObject>,
    token_map: FxHashMap<TokenObject, Token>,

    labels: Vec<Option<u32>>,
    fixups: Vec<BranchFixup>,
    label_depths: FxHashMap<ILLabel, u32>,

    regions: Vec<RegionBuilder>,

    depth: u32,
    max_depth: u32,
    /// Last instruction ended a block; depth is unknown until a label is marked.
    unreachable: bool,
}

impl<'a> ILEmitter<'a> {
    pub fn new(ctx: &'a TypeSystemContext) -> Self {
        Self {
            ctx,
            code: Vec::new(),
            locals: Vec::new(),
            tokens: Vec::new(),
            token_map: FxHashMap::default(),
            labels: Vec::new(),
            fixups: Vec::new(),
            label_depths: FxHashMap::default(),
            regions: Vec::new(),
            depth: 0,
            max_depth: 0,
            unreachable: false,
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Declare a local of type `ty`.
    pub fn new_local(&mut self, ty: &TypeHandle) -> ILLocal {
        let index = u16::try_from(self.locals.len()).unwrap_or_else(|_| panic!("too many locals"));
        self.locals.push(ty.clone());
        ILLocal(index)
    }

    /// Create an unbound label.
    pub fn new_label(&mut self) -> ILLabel {
        let label = ILLabel(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Token for `object`. Equal objects share one token.
    pub fn new_token(&mut self, object: TokenObject) -> Token {
        if let Some(&token) = self.token_map.get(&object) {
            return token;
        }
        let token = Token::new(object.table(), self.tokens.len() as u32 + 1);
        self.tokens.push(object.clone());
        self.token_map.insert(object, token);
        token
    }

    pub fn method_token(&mut self, method: &MethodHandle) -> Token {
        self.new_token(TokenObject::Method(method.clone()))
    }

    pub fn type_token(&mut self, ty: &TypeHandle) -> Token {
        self.new_token(TokenObject::Type(ty.clone()))
    }

    /// Declare a catch region for exceptions assignable to the type behind `class_token`.
    pub fn new_catch_region(&mut self, class_token: Token) -> ILRegion {
        self.new_region(ExceptionRegionKind::Catch, Some(class_token))
    }

    /// Declare a finally region.
    pub fn new_finally_region(&mut self) -> ILRegion {
        self.new_region(ExceptionRegionKind::Finally, None)
    }

    fn new_region(&mut self, kind: ExceptionRegionKind, class_token: Option<Token>) -> ILRegion {
        self.regions.push(RegionBuilder {
            kind,
            class_token,
            try_start: None,
            try_end: None,
            handler_start: None,
            handler_end: None,
        });
        ILRegion(self.regions.len() - 1)
    }

    // =========================================================================
    // Positions
    // =========================================================================

    #[inline]
    pub fn current_offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Current tracked stack depth.
    #[inline]
    pub fn stack_depth(&self) -> u32 {
        self.depth
    }

    /// Bind `label` to the current offset.
    pub fn mark_label(&mut self, label: ILLabel) {
        let slot = &mut self.labels[label.0 as usize];
        assert!(slot.is_none(), "label {:?} marked twice", label);
        *slot = Some(self.code.len() as u32);

        let recorded = self.label_depths.get(&label).copied();
        if self.unreachable {
            self.depth = recorded.unwrap_or(0);
            self.unreachable = false;
        } else if let Some(recorded) = recorded {
            self.depth = self.depth.max(recorded);
        }
    }

    pub fn begin_try(&mut self, region: ILRegion) {
        let offset = self.current_offset();
        let r = &mut self.regions[region.0];
        assert!(r.try_start.is_none(), "try of region {:?} begun twice", region);
        r.try_start = Some(offset);
    }

    pub fn end_try(&mut self, region: ILRegion) {
        let offset = self.current_offset();
        let r = &mut self.regions[region.0];
        assert!(r.try_start.is_some(), "try of region {:?} ended before it began", region);
        r.try_end = Some(offset);
    }

    pub fn begin_handler(&mut self, region: ILRegion) {
        let offset = self.current_offset();
        let r = &mut self.regions[region.0];
        assert!(r.try_end.is_some(), "handler of region {:?} begun before its try ended", region);
        r.handler_start = Some(offset);
        // Catch handlers start with the exception object on the stack
        self.depth = match r.kind {
            ExceptionRegionKind::Catch => 1,
            ExceptionRegionKind::Finally => 0,
        };
        self.max_depth = self.max_depth.max(self.depth);
        self.unreachable = false;
    }

    pub fn end_handler(&mut self, region: ILRegion) {
        let offset = self.current_offset();
        let r = &mut self.regions[region.0];
        assert!(r.handler_start.is_some(), "handler of region {:?} ended before it began", region);
        r.handler_end = Some(offset);
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn adjust(&mut self, pop: u32, push: u32) {
        debug_assert!(self.depth >= pop, "stack underflow at IL_{:04x}", self.code.len());
        self.depth = self.depth.saturating_sub(pop) + push;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn finish_instruction(&mut self, opcode: ILOpcode) {
        if opcode.ends_block() {
            self.depth = 0;
            self.unreachable = true;
        }
    }

    /// Stack effect of opcodes whose effect does not depend on an operand.
    fn fixed_effect(opcode: ILOpcode) -> (u32, u32) {
        use ILOpcode::*;
        match opcode {
            Nop | Br | BrS | Leave | LeaveS | Endfinally | Rethrow => (0, 0),
            Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS | Ldarg | Ldarga | Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3
            | LdlocS | Ldloc | LdlocaS | Ldloca | Ldnull | LdcI4M1 | LdcI4_0 | LdcI4_1 | LdcI4_2 | LdcI4_3
            | LdcI4_4 | LdcI4_5 | LdcI4_6 | LdcI4_7 | LdcI4_8 | LdcI4S | LdcI4 | LdcI8 | Ldstr | Ldftn
            | Ldtoken => (0, 1),
            Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS | Stloc | Pop | Brtrue | BrtrueS | Brfalse | BrfalseS
            | Throw | Initobj => (1, 0),
            Dup => (1, 2),
            Add | Ceq => (2, 1),
            ConvI | ConvU | Box | Ldobj => (1, 1),
            Stobj => (2, 0),
            Ret => (0, 0),
            Call | Callvirt | Calli | Newobj => (0, 0),
        }
    }

    /// Emit an instruction without operand.
    pub fn emit(&mut self, opcode: ILOpcode) {
        assert_eq!(
            opcode.operand_kind(),
            OperandKind::None,
            "{} requires an operand",
            opcode
        );
        if opcode == ILOpcode::Ret {
            // Leaves at most the return value
            self.depth = self.depth.min(1);
        }
        let (pop, push) = Self::fixed_effect(opcode);
        self.adjust(pop, push);
        opcode.encode(&mut self.code);
        self.finish_instruction(opcode);
    }

    /// Emit an instruction whose operand is a token, other than a call.
    pub fn emit_token(&mut self, opcode: ILOpcode, token: Token) {
        assert!(
            opcode.operand_kind() == OperandKind::Token
                && !matches!(opcode, ILOpcode::Call | ILOpcode::Callvirt | ILOpcode::Calli | ILOpcode::Newobj),
            "{} is not a plain token instruction",
            opcode
        );
        let (pop, push) = Self::fixed_effect(opcode);
        self.adjust(pop, push);
        opcode.encode(&mut self.code);
        self.code.extend_from_slice(&token.0.to_le_bytes());
    }

    /// Emit `call`, `callvirt` or `newobj` to `method`.
    pub fn emit_call(&mut self, opcode: ILOpcode, method: &MethodHandle) {
        assert!(
            matches!(opcode, ILOpcode::Call | ILOpcode::Callvirt | ILOpcode::Newobj),
            "{} is not a direct call",
            opcode
        );
        let token = self.method_token(method);
        let signature = method.signature();
        let (pop, push) = if opcode == ILOpcode::Newobj {
            (signature.len() as u32, 1)
        } else {
            (
                signature.argument_count() as u32,
                u32::from(!signature.returns_void(self.ctx)),
            )
        };
        self.adjust(pop, push);
        opcode.encode(&mut self.code);
        self.code.extend_from_slice(&token.0.to_le_bytes());
    }

    /// Emit `calli` through `signature`.
    ///
    /// The stack effect is given explicitly: the callee's arguments and the
    /// function pointer are popped, and its result pushed if it has one.
    pub fn emit_calli(&mut self, signature: &MethodSignature, argument_count: usize, returns_value: bool) {
        let token = self.new_token(TokenObject::Signature(signature.clone()));
        self.adjust(argument_count as u32 + 1, u32::from(returns_value));
        ILOpcode::Calli.encode(&mut self.code);
        self.code.extend_from_slice(&token.0.to_le_bytes());
    }

    /// Emit a branch to `label`. Always uses the long form.
    pub fn emit_branch(&mut self, opcode: ILOpcode, label: ILLabel) {
        assert_eq!(
            opcode.operand_kind(),
            OperandKind::Branch,
            "{} is not a long-form branch",
            opcode
        );
        let (pop, push) = Self::fixed_effect(opcode);
        self.adjust(pop, push);

        let target_depth = if matches!(opcode, ILOpcode::Leave) { 0 } else { self.depth };
        self.label_depths
            .entry(label)
            .and_modify(|d| *d = (*d).max(target_depth))
            .or_insert(target_depth);

        opcode.encode(&mut self.code);
        let operand_offset = self.code.len();
        self.code.extend_from_slice(&0i32.to_le_bytes());
        self.fixups.push(BranchFixup {
            operand_offset,
            next_offset: self.code.len() as u32,
            label,
        });
        self.finish_instruction(opcode);
    }

    fn emit_var(&mut self, short: [ILOpcode; 4], s_form: ILOpcode, long: ILOpcode, index: u16) {
        let opcode = match index {
            0..=3 if short[index as usize] != long => short[index as usize],
            0..=255 => s_form,
            _ => long,
        };
        let (pop, push) = Self::fixed_effect(opcode);
        self.adjust(pop, push);
        opcode.encode(&mut self.code);
        match opcode.operand_kind() {
            OperandKind::ShortVar => self.code.push(index as u8),
            OperandKind::Var => self.code.extend_from_slice(&index.to_le_bytes()),
            _ => {}
        }
    }

    pub fn emit_ldarg(&mut self, index: u16) {
        use ILOpcode::*;
        self.emit_var([Ldarg0, Ldarg1, Ldarg2, Ldarg3], LdargS, Ldarg, index);
    }

    pub fn emit_ldloc(&mut self, local: ILLocal) {
        use ILOpcode::*;
        self.emit_var([Ldloc0, Ldloc1, Ldloc2, Ldloc3], LdlocS, Ldloc, local.0);
    }

    pub fn emit_stloc(&mut self, local: ILLocal) {
        use ILOpcode::*;
        self.emit_var([Stloc0, Stloc1, Stloc2, Stloc3], StlocS, Stloc, local.0);
    }

    pub fn emit_ldloca(&mut self, local: ILLocal) {
        use ILOpcode::*;
        // No single-byte forms
        self.emit_var([Ldloca; 4], LdlocaS, Ldloca, local.0);
    }

    /// Push a 32-bit integer constant using the shortest encoding.
    pub fn emit_ldc(&mut self, value: i32) {
        use ILOpcode::*;
        let short = match value {
            -1 => Some(LdcI4M1),
            0 => Some(LdcI4_0),
            1 => Some(LdcI4_1),
            2 => Some(LdcI4_2),
            3 => Some(LdcI4_3),
            4 => Some(LdcI4_4),
            5 => Some(LdcI4_5),
            6 => Some(LdcI4_6),
            7 => Some(LdcI4_7),
            8 => Some(LdcI4_8),
            _ => None,
        };
        if let Some(opcode) = short {
            self.emit(opcode);
        } else if let Ok(small) = i8::try_from(value) {
            self.adjust(0, 1);
            LdcI4S.encode(&mut self.code);
            self.code.push(small as u8);
        } else {
            self.adjust(0, 1);
            LdcI4.encode(&mut self.code);
            self.code.extend_from_slice(&value.to_le_bytes());
        }
    }

    // =========================================================================
    // Linking
    // =========================================================================

    /// Resolve branches and regions and produce the body of `owning_method`.
    ///
    /// # Panics
    ///
    /// Panics on unbound labels and incomplete regions.
    pub fn link(mut self, owning_method: &MethodHandle) -> MethodIL {
        for fixup in &self.fixups {
            let Some(target) = self.labels[fixup.label.0 as usize] else {
                panic!("branch to unbound label {:?} in {}", fixup.label, owning_method);
            };
            let delta = target as i64 - fixup.next_offset as i64;
            let delta = i32::try_from(delta).unwrap_or_else(|_| panic!("branch displacement out of range"));
            self.code[fixup.operand_offset..fixup.operand_offset + 4].copy_from_slice(&delta.to_le_bytes());
        }

        let regions = self
            .regions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let (Some(try_start), Some(try_end), Some(handler_start), Some(handler_end)) =
                    (r.try_start, r.try_end, r.handler_start, r.handler_end)
                else {
                    panic!("region {} of {} was not closed", i, owning_method);
                };
                ExceptionRegion {
                    kind: r.kind,
                    try_offset: try_start,
                    try_length: try_end - try_start,
                    handler_offset: handler_start,
                    handler_length: handler_end - handler_start,
                    class_token: r.class_token,
                }
            })
            .collect();

        tracing::trace!(
            method = %owning_method,
            il_size = self.code.len(),
            locals = self.locals.len(),
            tokens = self.tokens.len(),
            "linked method body"
        );

        MethodIL::new(
            owning_method.clone(),
            self.code,
            self.locals,
            regions,
            Arc::new(LocalTokens::new(self.tokens)),
            self.max_depth.max(1) as u16,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ILReader, Operand};
    use ilc_types::{
        GenericParameterKind, Instantiation, MethodDefinition, ModuleId, SignatureFlags, TypeDefinition,
        WellKnownType,
    };

    fn static_void(ctx: &TypeSystemContext, name: &str) -> MethodHandle {
        let ty = ctx
            .get_known_type(ModuleId::SYSTEM, "Test", "Host")
            .unwrap_or_else(|| ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "Test", "Host")));
        let void = ctx.get_well_known_type(WellKnownType::Void);
        ctx.define_method(MethodDefinition::new(
            &ty,
            name,
            MethodSignature::new(SignatureFlags::STATIC, 0, void, &[]),
        ))
    }

    // ════════════════════════════════════════════════════════════════════════
    // Encoding
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_short_forms() {
        let ctx = TypeSystemContext::default();
        let owner = static_void(&ctx, "M");
        let int32 = ctx.get_well_known_type(WellKnownType::Int32);
        let mut e = ILEmitter::new(&ctx);
        let locals: Vec<ILLocal> = (0..300).map(|_| e.new_local(&int32)).collect();

        e.emit_ldc(7);
        e.emit_stloc(locals[2]);
        e.emit_ldc(100);
        e.emit_stloc(locals[200]);
        e.emit_ldc(100_000);
        e.emit_stloc(locals[299]);
        e.emit_ldloca(locals[0]);
        e.emit(ILOpcode::Pop);
        e.emit(ILOpcode::Ret);

        let il = e.link(&owner);
        let ops: Vec<ILOpcode> = ILReader::read_all(il.il_bytes())
            .unwrap()
            .into_iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(
            ops,
            vec![
                ILOpcode::LdcI4_7,
                ILOpcode::Stloc2,
                ILOpcode::LdcI4S,
                ILOpcode::StlocS,
                ILOpcode::LdcI4,
                ILOpcode::Stloc,
                ILOpcode::LdlocaS,
                ILOpcode::Pop,
                ILOpcode::Ret,
            ]
        );
        assert_eq!(il.max_stack(), 1);
        assert_eq!(il.locals().len(), 300);
    }

    #[test]
    fn test_tokens_are_deduplicated() {
        let ctx = TypeSystemContext::default();
        let callee = static_void(&ctx, "Callee");
        let mut e = ILEmitter::new(&ctx);
        let a = e.method_token(&callee);
        let b = e.method_token(&callee);
        let s = e.new_token(TokenObject::String("x".into()));
        assert_eq!(a, b);
        assert_eq!(a, Token::new(Token::MEMBER_REF, 1));
        assert_eq!(s, Token::new(Token::USER_STRING, 2));
    }

    #[test]
    fn test_forward_and_backward_branches() {
        let ctx = TypeSystemContext::default();
        let owner = static_void(&ctx, "Loop");
        let mut e = ILEmitter::new(&ctx);
        let top = e.new_label();
        let done = e.new_label();

        e.mark_label(top);
        e.emit_ldc(0);
        e.emit_branch(ILOpcode::Brtrue, done);
        e.emit_branch(ILOpcode::Br, top);
        e.mark_label(done);
        e.emit(ILOpcode::Ret);

        let il = e.link(&owner);
        let instructions = ILReader::read_all(il.il_bytes()).unwrap();
        assert_eq!(instructions[1].operand, Operand::Target(11));
        assert_eq!(instructions[2].operand, Operand::Target(0));
    }

    #[test]
    #[should_panic(expected = "unbound label")]
    fn test_unbound_label_is_rejected() {
        let ctx = TypeSystemContext::default();
        let owner = static_void(&ctx, "Broken");
        let mut e = ILEmitter::new(&ctx);
        let nowhere = e.new_label();
        e.emit_branch(ILOpcode::Br, nowhere);
        e.link(&owner);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Regions
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_nested_regions_in_creation_order() {
        let ctx = TypeSystemContext::default();
        let owner = static_void(&ctx, "Guarded");
        let work = static_void(&ctx, "Work");
        let exception = ctx.get_well_known_type(WellKnownType::Exception);
        let mut e = ILEmitter::new(&ctx);
        let end = e.new_label();

        let class_token = e.type_token(&exception);
        let inner = e.new_catch_region(class_token);
        let outer = e.new_finally_region();
        e.begin_try(outer);
        e.begin_try(inner);
        e.emit_call(ILOpcode::Call, &work);
        e.emit_branch(ILOpcode::Leave, end);
        e.end_try(inner);
        e.begin_handler(inner);
        e.emit(ILOpcode::Pop);
        e.emit_branch(ILOpcode::Leave, end);
        e.end_handler(inner);
        e.end_try(outer);
        e.begin_handler(outer);
        e.emit(ILOpcode::Endfinally);
        e.end_handler(outer);
        e.mark_label(end);
        e.emit(ILOpcode::Ret);

        let il = e.link(&owner);
        let regions = il.exception_regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].kind, ExceptionRegionKind::Catch);
        assert_eq!(regions[0].class_token, Some(class_token));
        assert_eq!((regions[0].try_offset, regions[0].try_length), (0, 10));
        assert_eq!((regions[0].handler_offset, regions[0].handler_length), (10, 6));
        assert_eq!(regions[1].kind, ExceptionRegionKind::Finally);
        assert_eq!((regions[1].try_offset, regions[1].try_length), (0, 16));
        assert_eq!((regions[1].handler_offset, regions[1].handler_length), (16, 1));
        assert_eq!(il.get_object(class_token), Some(TokenObject::Type(exception)));
    }

    #[test]
    #[should_panic(expected = "was not closed")]
    fn test_open_region_is_rejected() {
        let ctx = TypeSystemContext::default();
        let owner = static_void(&ctx, "Open");
        let mut e = ILEmitter::new(&ctx);
        let region = e.new_finally_region();
        e.begin_try(region);
        e.emit(ILOpcode::Ret);
        e.link(&owner);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Instantiation
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_instantiate_maps_tokens_and_locals() {
        let ctx = TypeSystemContext::default();
        let list = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "Test", "List`1").generic(1));
        let m0 = ctx.get_signature_variable(GenericParameterKind::Method, 0);
        let list_of_m0 = ctx.get_instantiated_type(&list, Instantiation::from_slice(&[m0.clone()]));
        let holder = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "Test", "Holder"));
        let void = ctx.get_well_known_type(WellKnownType::Void);
        let generic = ctx.define_method(MethodDefinition::new(
            &holder,
            "Make",
            MethodSignature::new(SignatureFlags::STATIC, 1, void, &[]),
        ));

        let mut e = ILEmitter::new(&ctx);
        let local = e.new_local(&list_of_m0);
        let token = e.type_token(&list_of_m0);
        e.emit_ldloca(local);
        e.emit_token(ILOpcode::Initobj, token);
        e.emit(ILOpcode::Ret);
        let definition_il = e.link(&generic);

        let string = ctx.get_well_known_type(WellKnownType::String);
        let make_string = ctx.get_instantiated_method(&generic, Instantiation::from_slice(&[string.clone()]));
        let il = definition_il.instantiate(&ctx, &make_string).unwrap();

        let list_of_string = ctx.get_instantiated_type(&list, Instantiation::from_slice(&[string]));
        assert_eq!(il.owning_method(), &make_string);
        assert_eq!(il.locals(), &[list_of_string.clone()]);
        assert_eq!(il.get_object(token), Some(TokenObject::Type(list_of_string)));
        assert_eq!(il.il_bytes(), definition_il.il_bytes());
    }
}
