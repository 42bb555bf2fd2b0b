//! JVM-style type and method identifiers.
//!
//! Call networks name their call nodes and calling-context outcomes by
//! method identifier, e.g. `Ljava/lang/String.concat(Ljava/lang/String;)Ljava/lang/String;`:
//! declaring type, `.`, method name, descriptor. Identifiers are compared and
//! ordered as plain strings.

use std::fmt;
use std::str::FromStr;

use crate::engine::errors::{CallNetError, Result};

/// Calling context used when no enclosing method is known.
pub const DUMMY_METHOD: &str = "LDummy.dummy()V";

/// Placeholder method for call sites that could not be resolved.
pub const UNKNOWN_METHOD: &str = "LUnknown.unknown()V";

/// Dummy outcome of the definition node.
pub const STATE_DUMMY_DEFINITION: &str = "L_dummy.dummy()V";

/// Name of a type, e.g. `Ljava/util/List`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.is_empty() || identifier.contains(['(', ')', '.']) {
            return Err(CallNetError::InvalidInput(format!(
                "malformed type name '{}'",
                identifier
            )));
        }
        Ok(Self(identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TypeName {
    type Err = CallNetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TypeName {
    type Error = CallNetError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0
    }
}

/// Fully qualified method identifier: `<declaring type>.<name>(<args>)<ret>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct MethodName(String);

impl MethodName {
    /// Parses a method identifier. The identifier needs a declaring type, a
    /// non-empty name and a parenthesized descriptor.
    pub fn new(identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        let well_formed = identifier.rfind('(').is_some_and(|paren| {
            identifier[..paren]
                .rfind('.')
                .is_some_and(|dot| dot > 0 && dot + 1 < paren)
                && identifier[paren..].contains(')')
        });
        if !well_formed {
            return Err(CallNetError::InvalidInput(format!(
                "malformed method name '{}'",
                identifier
            )));
        }
        Ok(Self(identifier))
    }

    /// Joins a declaring type and a signature such as `wait()V`.
    pub fn from_parts(declaring_type: &TypeName, signature: &str) -> Result<Self> {
        Self::new(format!("{}.{}", declaring_type, signature))
    }

    pub fn dummy() -> Self {
        Self(DUMMY_METHOD.to_string())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_METHOD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn paren(&self) -> usize {
        self.0.rfind('(').unwrap_or(self.0.len())
    }

    fn dot(&self) -> usize {
        self.0[..self.paren()].rfind('.').unwrap_or(0)
    }

    pub fn declaring_type(&self) -> TypeName {
        TypeName(self.0[..self.dot()].to_string())
    }

    pub fn name(&self) -> &str {
        &self.0[self.dot() + 1..self.paren()]
    }

    /// Name plus descriptor, e.g. `concat(Ljava/lang/String;)Ljava/lang/String;`.
    pub fn signature(&self) -> &str {
        &self.0[self.dot() + 1..]
    }

    /// Parameter and return descriptor, e.g. `(I)V`.
    pub fn descriptor(&self) -> &str {
        &self.0[self.paren()..]
    }

    /// Constructors, including the synthetic `<subtype-init>` marker.
    pub fn is_init(&self) -> bool {
        matches!(self.name(), "<init>" | "<subtype-init>")
    }

    /// The same signature declared on `base`.
    pub fn rebase(&self, base: &TypeName) -> MethodName {
        MethodName(format!("{}.{}", base, self.signature()))
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MethodName {
    type Err = CallNetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for MethodName {
    type Error = CallNetError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MethodName> for String {
    fn from(name: MethodName) -> Self {
        name.0
    }
}

/// How the receiver object of a call group came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DefinitionKind {
    MethodReturn,
    New,
    Field,
    Parameter,
    This,
    Unknown,
}

impl DefinitionKind {
    /// Whether a definition state of this kind names the defining method.
    pub fn requires_method(self) -> bool {
        matches!(
            self,
            DefinitionKind::MethodReturn | DefinitionKind::New | DefinitionKind::Parameter
        )
    }
}

/// Outcome label of the definition node for a definition site.
///
/// `MethodReturn`, `New` and `Parameter` need the defining method; the other
/// kinds ignore it.
pub fn definition_state(kind: DefinitionKind, defined_by: Option<&MethodName>) -> Result<String> {
    let method = match (kind.requires_method(), defined_by) {
        (true, None) => {
            return Err(CallNetError::InvalidInput(format!(
                "{:?} definition needs a defining method",
                kind
            )))
        }
        (_, method) => method,
    };
    Ok(match (kind, method) {
        (DefinitionKind::MethodReturn, Some(m)) => format!("return#{}", m),
        (DefinitionKind::New, Some(m)) => format!("new#{}", m),
        (DefinitionKind::Parameter, Some(m)) => format!("param#{}", m),
        (DefinitionKind::Field, _) => "field#<>".to_string(),
        (DefinitionKind::This, _) => "this#<>".to_string(),
        _ => "unknown#<>".to_string(),
    })
}

/// Whether `state` is a placeholder that is never recommended.
pub fn is_placeholder_definition(state: &str) -> bool {
    state == STATE_DUMMY_DEFINITION || state.starts_with("unknown#")
}
