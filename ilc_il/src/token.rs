//! Metadata tokens.
//!
//! A token is a 32-bit value whose high byte selects a table and whose low
//! 24 bits are a 1-based row. Tokens are only meaningful relative to the
//! resolver they were issued by: a synthesized body carries its own local
//! token table, while a body rewritten for cross-module inlining resolves
//! through the manifest module.

use ilc_types::{MethodHandle, MethodSignature, TypeHandle};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A metadata token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    pub const TYPE_REF: u32 = 0x0100_0000;
    pub const TYPE_DEF: u32 = 0x0200_0000;
    pub const METHOD_DEF: u32 = 0x0600_0000;
    pub const MEMBER_REF: u32 = 0x0A00_0000;
    pub const STANDALONE_SIG: u32 = 0x1100_0000;
    pub const TYPE_SPEC: u32 = 0x1B00_0000;
    pub const METHOD_SPEC: u32 = 0x2B00_0000;
    pub const USER_STRING: u32 = 0x7000_0000;

    /// Compose a token from a table and a row.
    #[inline]
    pub const fn new(table: u32, row: u32) -> Token {
        Token(table | (row & 0x00FF_FFFF))
    }

    /// Table bits.
    #[inline]
    pub const fn table(self) -> u32 {
        self.0 & 0xFF00_0000
    }

    /// 1-based row.
    #[inline]
    pub const fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        self.table() == Self::USER_STRING
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// What a token refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenObject {
    Method(MethodHandle),
    Type(TypeHandle),
    Signature(MethodSignature),
    String(Arc<str>),
}

impl TokenObject {
    /// Table a freshly issued token for this object lives in.
    pub fn table(&self) -> u32 {
        match self {
            TokenObject::Method(_) => Token::MEMBER_REF,
            TokenObject::Type(_) => Token::TYPE_REF,
            TokenObject::Signature(_) => Token::STANDALONE_SIG,
            TokenObject::String(_) => Token::USER_STRING,
        }
    }

    pub fn as_method(&self) -> Option<&MethodHandle> {
        match self {
            TokenObject::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeHandle> {
        match self {
            TokenObject::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_signature(&self) -> Option<&MethodSignature> {
        match self {
            TokenObject::Signature(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TokenObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenObject::Method(m) => write!(f, "{}", m),
            TokenObject::Type(t) => write!(f, "{}", t),
            TokenObject::Signature(s) => write!(f, "{}", s),
            TokenObject::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Maps tokens of one method body to the objects they denote.
pub trait TokenResolver: fmt::Debug + Send + Sync {
    /// The object `token` denotes, if any.
    fn resolve(&self, token: Token) -> Option<TokenObject>;
}

// =============================================================================
// Local Tokens
// =============================================================================

/// Token table private to one synthesized body.
///
/// Rows are shared across tables: the `n`th object added gets row `n`
/// whatever its kind.
#[derive(Debug, Default)]
pub struct LocalTokens {
    objects: Vec<TokenObject>,
}

impl LocalTokens {
    pub fn new(objects: Vec<TokenObject>) -> Self {
        Self { objects }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl TokenResolver for LocalTokens {
    fn resolve(&self, token: Token) -> Option<TokenObject> {
        let index = (token.row() as usize).checked_sub(1)?;
        let object = self.objects.get(index)?;
        (object.table() == token.table()).then(|| object.clone())
    }
}

// =============================================================================
// Mapped Tokens
// =============================================================================

/// Explicit token-to-object map, used for bodies derived from another body.
#[derive(Debug, Default)]
pub struct MappedTokens {
    objects: FxHashMap<Token, TokenObject>,
}

impl MappedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: Token, object: TokenObject) {
        self.objects.insert(token, object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl TokenResolver for MappedTokens {
    fn resolve(&self, token: Token) -> Option<TokenObject> {
        self.objects.get(&token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::new(Token::MEMBER_REF, 3);
        assert_eq!(token.0, 0x0A00_0003);
        assert_eq!(token.table(), Token::MEMBER_REF);
        assert_eq!(token.row(), 3);
        assert!(Token::new(Token::USER_STRING, 1).is_string());
        assert_eq!(token.to_string(), "0x0a000003");
    }

    #[test]
    fn test_local_tokens_check_table() {
        let tokens = LocalTokens::new(vec![TokenObject::String("hello".into())]);
        assert_eq!(
            tokens.resolve(Token::new(Token::USER_STRING, 1)),
            Some(TokenObject::String("hello".into()))
        );
        assert_eq!(tokens.resolve(Token::new(Token::MEMBER_REF, 1)), None);
        assert_eq!(tokens.resolve(Token::new(Token::USER_STRING, 2)), None);
        assert_eq!(tokens.resolve(Token::new(Token::USER_STRING, 0)), None);
    }
}
