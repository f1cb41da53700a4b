//! Linked method bodies.

use crate::reader::{ILReadError, ILReader, Operand};
use crate::token::{MappedTokens, Token, TokenObject, TokenResolver};
use ilc_types::{MethodHandle, TypeHandle, TypeSystemContext};
use std::fmt;
use std::sync::Arc;

/// Kind of a protected region handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionRegionKind {
    Catch,
    Finally,
}

/// A protected region with its handler. Offsets are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRegion {
    pub kind: ExceptionRegionKind,
    pub try_offset: u32,
    pub try_length: u32,
    pub handler_offset: u32,
    pub handler_length: u32,
    /// Type caught, for catch regions.
    pub class_token: Option<Token>,
}

impl ExceptionRegion {
    #[inline]
    pub fn try_contains(&self, offset: u32) -> bool {
        offset >= self.try_offset && offset < self.try_offset + self.try_length
    }

    #[inline]
    pub fn handler_contains(&self, offset: u32) -> bool {
        offset >= self.handler_offset && offset < self.handler_offset + self.handler_length
    }

    #[inline]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset + self.handler_length
    }
}

/// A method body: IL bytes plus everything needed to interpret them.
#[derive(Clone)]
pub struct MethodIL {
    owning_method: MethodHandle,
    il_bytes: Arc<[u8]>,
    locals: Vec<TypeHandle>,
    exception_regions: Vec<ExceptionRegion>,
    tokens: Arc<dyn TokenResolver>,
    max_stack: u16,
    init_locals: bool,
}

impl MethodIL {
    pub fn new(
        owning_method: MethodHandle,
        il_bytes: Vec<u8>,
        locals: Vec<TypeHandle>,
        exception_regions: Vec<ExceptionRegion>,
        tokens: Arc<dyn TokenResolver>,
        max_stack: u16,
    ) -> Self {
        Self {
            owning_method,
            il_bytes: il_bytes.into(),
            locals,
            exception_regions,
            tokens,
            max_stack,
            init_locals: true,
        }
    }

    #[inline]
    pub fn owning_method(&self) -> &MethodHandle {
        &self.owning_method
    }

    #[inline]
    pub fn il_bytes(&self) -> &[u8] {
        &self.il_bytes
    }

    #[inline]
    pub fn locals(&self) -> &[TypeHandle] {
        &self.locals
    }

    #[inline]
    pub fn exception_regions(&self) -> &[ExceptionRegion] {
        &self.exception_regions
    }

    #[inline]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    #[inline]
    pub fn init_locals(&self) -> bool {
        self.init_locals
    }

    pub fn set_init_locals(&mut self, init_locals: bool) {
        self.init_locals = init_locals;
    }

    /// Resolver the tokens of this body are issued by.
    #[inline]
    pub fn token_resolver(&self) -> &Arc<dyn TokenResolver> {
        &self.tokens
    }

    /// The object `token` denotes.
    pub fn get_object(&self, token: Token) -> Option<TokenObject> {
        self.tokens.resolve(token)
    }

    /// Same body with rewritten bytes, regions and token space.
    ///
    /// Locals, stack size and owning method are kept.
    pub fn with_token_space(
        &self,
        il_bytes: Vec<u8>,
        exception_regions: Vec<ExceptionRegion>,
        tokens: Arc<dyn TokenResolver>,
    ) -> MethodIL {
        MethodIL {
            owning_method: self.owning_method.clone(),
            il_bytes: il_bytes.into(),
            locals: self.locals.clone(),
            exception_regions,
            tokens,
            max_stack: self.max_stack,
            init_locals: self.init_locals,
        }
    }

    /// Same body attributed to `method`, which must take the same arguments.
    pub fn with_owning_method(&self, method: &MethodHandle) -> MethodIL {
        MethodIL {
            owning_method: method.clone(),
            ..self.clone()
        }
    }

    /// Every token operand in the body and the catch clauses, in order of appearance.
    pub fn referenced_tokens(&self) -> Result<Vec<Token>, ILReadError> {
        let mut tokens = Vec::new();
        let mut reader = ILReader::new(&self.il_bytes);
        while let Some(instruction) = reader.next_instruction()? {
            if let Operand::Token(token) = instruction.operand {
                tokens.push(token);
            }
        }
        tokens.extend(self.exception_regions.iter().filter_map(|r| r.class_token));
        Ok(tokens)
    }

    /// The body of `method`, an instantiation of this body's owning method.
    ///
    /// Every referenced object is substituted with the owning type's and
    /// the method's type arguments up front; the bytes are shared.
    pub fn instantiate(&self, ctx: &TypeSystemContext, method: &MethodHandle) -> Result<MethodIL, ILReadError> {
        let type_args = method.type_instantiation();
        let method_args = method.instantiation();

        let mut mapped = MappedTokens::new();
        for token in self.referenced_tokens()? {
            let Some(object) = self.tokens.resolve(token) else {
                continue;
            };
            let instantiated = match object {
                TokenObject::Method(m) => TokenObject::Method(m.instantiate_signature(ctx, &type_args, method_args)),
                TokenObject::Type(t) => TokenObject::Type(t.instantiate_signature(ctx, &type_args, method_args)),
                TokenObject::Signature(s) => TokenObject::Signature(s.instantiate(ctx, &type_args, method_args)),
                TokenObject::String(s) => TokenObject::String(s),
            };
            mapped.insert(token, instantiated);
        }

        Ok(MethodIL {
            owning_method: method.clone(),
            il_bytes: self.il_bytes.clone(),
            locals: self
                .locals
                .iter()
                .map(|local| local.instantiate_signature(ctx, &type_args, method_args))
                .collect(),
            exception_regions: self.exception_regions.clone(),
            tokens: Arc::new(mapped),
            max_stack: self.max_stack,
            init_locals: self.init_locals,
        })
    }
}

impl fmt::Debug for MethodIL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodIL")
            .field("owning_method", &self.owning_method)
            .field("il_size", &self.il_bytes.len())
            .field("locals", &self.locals.len())
            .field("exception_regions", &self.exception_regions)
            .field("max_stack", &self.max_stack)
            .finish()
    }
}
