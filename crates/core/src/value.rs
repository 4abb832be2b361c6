//! Runtime objects
//!
//! Every value a JAPL program manipulates is a heap object behind a counted
//! [`Value`] handle. The object itself is a tagged variant; all behavior
//! (stringification, truthiness, equality, hashing, arithmetic) dispatches
//! on the tag.
//!
//! Arithmetic and bitwise primitives return [`OpError::Unsupported`] when
//! the operand types do not carry the operation; the VM turns that into a
//! `TypeError` with the operand type names. Integer overflow and division
//! by zero are distinct errors so the VM can name them precisely.
//!
//! # Numeric promotion
//!
//! int op int stays integral (checked, overflow is an error). As soon as a
//! float, infinity, or nan is involved the operation runs in IEEE-754
//! double precision and the result is classified back into the `Float`,
//! `Inf`, or `Nan` variant, so a float divide by zero comes back as an
//! infinity object rather than a funny-looking float.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Chunk;

/// Counted handle to a heap object.
pub type Value = Rc<Object>;

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// 32-bit FNV-1a over a byte slice.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// An interned-friendly string: the text plus its hash, computed once at
/// construction and stable for the string's lifetime.
#[derive(Debug, Clone)]
pub struct JaplString {
    text: String,
    hash: u32,
}

impl JaplString {
    pub fn new(text: String) -> Self {
        let hash = fnv1a(text.as_bytes());
        Self { text, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

/// A user function or the top-level script.
///
/// The last `defaults.len()` parameters are optional; a call site may omit
/// them and the VM fills the gap from `defaults` left to right.
#[derive(Debug)]
pub struct Function {
    /// `None` for the top-level script, which prints as `<code object>`.
    pub name: Option<String>,
    pub arity: u8,
    pub defaults: Vec<Value>,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            arity: 0,
            defaults: Vec::new(),
            chunk: Chunk::new(),
        }
    }

    /// Smallest number of arguments a call must supply.
    pub fn required_arity(&self) -> usize {
        usize::from(self.arity) - self.defaults.len()
    }
}

/// Payload of a runtime error.
#[derive(Debug, Clone)]
pub struct Exception {
    pub name: String,
    pub message: String,
}

/// Why an object primitive refused to produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    /// The operand types do not support this operation.
    Unsupported,
    /// Integer arithmetic overflowed.
    Overflow,
    /// Integer division or modulo by zero.
    DivisionByZero,
}

pub type OpResult = Result<Object, OpError>;

/// A tagged heap object.
#[derive(Debug)]
pub enum Object {
    Str(JaplString),
    Int(i64),
    /// Finite by construction: [`Object::from_f64`] classifies non-finite
    /// results into `Inf` / `Nan`.
    Float(f64),
    Bool(bool),
    Nil,
    Inf {
        negative: bool,
    },
    Nan,
    Function(Rc<Function>),
    Exception(Exception),
}

impl Object {
    /// Classify an IEEE-754 result into the matching variant.
    pub fn from_f64(value: f64) -> Object {
        if value.is_nan() {
            Object::Nan
        } else if value.is_infinite() {
            Object::Inf {
                negative: value < 0.0,
            }
        } else {
            Object::Float(value)
        }
    }

    /// Human-readable tag name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Str(_) => "string",
            Object::Int(_) => "integer",
            Object::Float(_) => "float",
            Object::Bool(_) => "bool",
            Object::Nil => "nil",
            Object::Inf { .. } => "infinity",
            Object::Nan => "nan",
            Object::Function(_) => "function",
            Object::Exception(_) => "exception",
        }
    }

    /// Falsey: nil, false, integer/float zero, and the empty string.
    pub fn is_falsey(&self) -> bool {
        match self {
            Object::Nil => true,
            Object::Bool(b) => !b,
            Object::Int(n) => *n == 0,
            Object::Float(f) => *f == 0.0,
            Object::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Variant-aware equality. Numeric comparisons cross int/float; nan is
    /// never equal to anything, itself included; strings short-circuit on
    /// length and hash before comparing bytes.
    pub fn equals(&self, other: &Object) -> bool {
        use Object::*;
        match (self, other) {
            (Nan, _) | (_, Nan) => false,
            (Int(a), Int(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Float(a), Float(b)) => a == b,
            (Inf { negative: a }, Inf { negative: b }) => a == b,
            (Str(a), Str(b)) => {
                a.len() == b.len() && a.hash() == b.hash() && a.as_str() == b.as_str()
            }
            (Bool(a), Bool(b)) => a == b,
            (Nil, Nil) => true,
            (Function(a), Function(b)) => a.name == b.name,
            (Exception(a), Exception(b)) => a.name == b.name && a.message == b.message,
            _ => false,
        }
    }

    /// 32-bit hash. Strings return their cached FNV-1a; numbers and bools
    /// hash their bit pattern; nil hashes to 0.
    pub fn hash(&self) -> u32 {
        match self {
            Object::Str(s) => s.hash(),
            Object::Int(n) => {
                let bits = *n as u64;
                (bits ^ (bits >> 32)) as u32
            }
            Object::Float(f) => {
                let bits = f.to_bits();
                (bits ^ (bits >> 32)) as u32
            }
            Object::Bool(b) => u32::from(*b),
            Object::Nil => 0,
            Object::Inf { negative } => {
                if *negative {
                    2
                } else {
                    1
                }
            }
            Object::Nan => 3,
            Object::Function(f) => f.name.as_ref().map_or(0, |n| fnv1a(n.as_bytes())),
            Object::Exception(e) => fnv1a(e.name.as_bytes()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Int(n) => Some(*n as f64),
            Object::Float(f) => Some(*f),
            Object::Inf { negative: false } => Some(f64::INFINITY),
            Object::Inf { negative: true } => Some(f64::NEG_INFINITY),
            Object::Nan => Some(f64::NAN),
            _ => None,
        }
    }

    fn float_binary(&self, other: &Object, op: impl Fn(f64, f64) -> f64) -> OpResult {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => Ok(Object::from_f64(op(a, b))),
            _ => Err(OpError::Unsupported),
        }
    }

    /// `+`: integer/float addition, string concatenation.
    pub fn add(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or(OpError::Overflow),
            (Str(a), Str(b)) => {
                let mut text = String::with_capacity(a.len() + b.len());
                text.push_str(a.as_str());
                text.push_str(b.as_str());
                Ok(Str(JaplString::new(text)))
            }
            _ => self.float_binary(other, |a, b| a + b),
        }
    }

    pub fn sub(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or(OpError::Overflow),
            _ => self.float_binary(other, |a, b| a - b),
        }
    }

    /// `*`: numeric multiplication, or string replication by an integer.
    /// A non-positive count replicates to the empty string.
    pub fn mul(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or(OpError::Overflow),
            (Str(s), Int(n)) | (Int(n), Str(s)) => {
                let count = usize::try_from(*n).unwrap_or(0);
                Ok(Str(JaplString::new(s.as_str().repeat(count))))
            }
            _ => self.float_binary(other, |a, b| a * b),
        }
    }

    /// `/`: integer division truncates toward zero; division by integer
    /// zero is an error, while float division follows IEEE-754.
    pub fn div(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(_), Int(0)) => Err(OpError::DivisionByZero),
            (Int(a), Int(b)) => a.checked_div(*b).map(Int).ok_or(OpError::Overflow),
            _ => self.float_binary(other, |a, b| a / b),
        }
    }

    /// `%`: remainder with the sign of the dividend.
    pub fn rem(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(_), Int(0)) => Err(OpError::DivisionByZero),
            // wrapping_rem: i64::MIN % -1 is 0, checked_rem refuses it
            (Int(a), Int(b)) => Ok(Int(a.wrapping_rem(*b))),
            _ => self.float_binary(other, |a, b| a % b),
        }
    }

    /// `**`: integral power stays integral for non-negative exponents;
    /// a negative exponent promotes to float.
    pub fn pow(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) if *b >= 0 => {
                let exp = u32::try_from(*b).map_err(|_| OpError::Overflow)?;
                a.checked_pow(exp).map(Int).ok_or(OpError::Overflow)
            }
            _ => self.float_binary(other, f64::powf),
        }
    }

    /// `and`: bitwise on two integers, truthiness conjunction otherwise.
    pub fn and(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(a & b)),
            _ => Ok(Bool(!self.is_falsey() && !other.is_falsey())),
        }
    }

    /// `or`: bitwise on two integers, truthiness disjunction otherwise.
    pub fn or(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(a | b)),
            _ => Ok(Bool(!self.is_falsey() || !other.is_falsey())),
        }
    }

    /// `^`: bitwise on integers, logical on bools.
    pub fn xor(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Int(a ^ b)),
            (Bool(a), Bool(b)) => Ok(Bool(a ^ b)),
            _ => Err(OpError::Unsupported),
        }
    }

    /// `<<`: out-of-range shift counts (negative or >= 64) produce 0.
    pub fn shl(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(v), Int(c)) => {
                let shifted = u32::try_from(*c)
                    .ok()
                    .and_then(|c| v.checked_shl(c))
                    .unwrap_or(0);
                Ok(Int(shifted))
            }
            _ => Err(OpError::Unsupported),
        }
    }

    /// `>>`: logical (zero-fill) shift; out-of-range counts produce 0.
    pub fn shr(&self, other: &Object) -> OpResult {
        use Object::*;
        match (self, other) {
            (Int(v), Int(c)) => {
                let shifted = u32::try_from(*c)
                    .ok()
                    .and_then(|c| (*v as u64).checked_shr(c))
                    .unwrap_or(0) as i64;
                Ok(Int(shifted))
            }
            _ => Err(OpError::Unsupported),
        }
    }

    /// Unary `-`.
    pub fn negate(&self) -> OpResult {
        use Object::*;
        match self {
            Int(n) => n.checked_neg().map(Int).ok_or(OpError::Overflow),
            Float(f) => Ok(Float(-f)),
            Inf { negative } => Ok(Inf {
                negative: !negative,
            }),
            Nan => Ok(Nan),
            _ => Err(OpError::Unsupported),
        }
    }

    /// Ordering for `< <= > >=`. Defined on numbers only; comparisons
    /// involving nan yield `Ok(None)` (all four operators false), and
    /// non-numeric operands are unsupported.
    pub fn numeric_cmp(&self, other: &Object) -> Result<Option<Ordering>, OpError> {
        use Object::*;
        match (self, other) {
            (Int(a), Int(b)) => Ok(Some(a.cmp(b))),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => Err(OpError::Unsupported),
            },
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Str(s) => f.write_str(s.as_str()),
            Object::Int(n) => write!(f, "{}", n),
            Object::Float(x) => {
                // Keep a float distinguishable from an integer rendering.
                if x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Object::Bool(true) => f.write_str("true"),
            Object::Bool(false) => f.write_str("false"),
            Object::Nil => f.write_str("nil"),
            Object::Inf { negative: false } => f.write_str("inf"),
            Object::Inf { negative: true } => f.write_str("-inf"),
            Object::Nan => f.write_str("nan"),
            Object::Function(func) => match &func.name {
                Some(name) => write!(f, "<function {}>", name),
                None => f.write_str("<code object>"),
            },
            Object::Exception(e) => write!(f, "{}: {}", e.name, e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_values() {
        // FNV-1a with offset 2166136261 and prime 16777619
        assert_eq!(fnv1a(b""), 2166136261);
        assert_eq!(fnv1a(b"a"), 0xe40c292c);
    }

    #[test]
    fn test_falsey_law() {
        assert!(Object::Nil.is_falsey());
        assert!(Object::Bool(false).is_falsey());
        assert!(Object::Int(0).is_falsey());
        assert!(Object::Float(0.0).is_falsey());
        assert!(Object::Str(JaplString::new(String::new())).is_falsey());

        assert!(!Object::Bool(true).is_falsey());
        assert!(!Object::Int(-1).is_falsey());
        assert!(!Object::Float(0.5).is_falsey());
        assert!(!Object::Str(JaplString::new("x".to_string())).is_falsey());
        assert!(!Object::Inf { negative: false }.is_falsey());
        assert!(!Object::Nan.is_falsey());
    }

    #[test]
    fn test_string_equality_implies_hash_and_len() {
        let a = JaplString::new("hello".to_string());
        let b = JaplString::new("hello".to_string());
        assert!(Object::Str(a.clone()).equals(&Object::Str(b.clone())));
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_nan_never_equal() {
        assert!(!Object::Nan.equals(&Object::Nan));
        assert!(!Object::Nan.equals(&Object::Int(1)));
    }

    #[test]
    fn test_cross_type_numeric_equality() {
        assert!(Object::Int(3).equals(&Object::Float(3.0)));
        assert!(!Object::Int(3).equals(&Object::Float(3.5)));
        assert!(!Object::Int(3).equals(&Object::Inf { negative: false }));
    }

    #[test]
    fn test_int_arithmetic_checked() {
        assert_eq!(Object::Int(2).add(&Object::Int(3)), Ok(Object::Int(5)));
        assert_eq!(
            Object::Int(i64::MAX).add(&Object::Int(1)),
            Err(OpError::Overflow)
        );
        assert_eq!(
            Object::Int(i64::MAX).mul(&Object::Int(2)),
            Err(OpError::Overflow)
        );
        assert_eq!(
            Object::Int(1).div(&Object::Int(0)),
            Err(OpError::DivisionByZero)
        );
        assert_eq!(Object::Int(7).div(&Object::Int(2)), Ok(Object::Int(3)));
        assert_eq!(Object::Int(-7).rem(&Object::Int(2)), Ok(Object::Int(-1)));
    }

    #[test]
    fn test_float_promotion_and_classification() {
        assert_eq!(
            Object::Int(1).add(&Object::Float(0.5)),
            Ok(Object::Float(1.5))
        );
        // Float division by zero classifies to an infinity object.
        let inf = Object::Float(1.0).div(&Object::Int(0)).unwrap();
        assert!(matches!(inf, Object::Inf { negative: false }));
        let nan = Object::Float(0.0).div(&Object::Float(0.0)).unwrap();
        assert!(matches!(nan, Object::Nan));
    }

    #[test]
    fn test_pow() {
        assert_eq!(Object::Int(2).pow(&Object::Int(10)), Ok(Object::Int(1024)));
        assert_eq!(
            Object::Int(2).pow(&Object::Int(64)),
            Err(OpError::Overflow)
        );
        // Negative exponent promotes to float.
        assert_eq!(
            Object::Int(2).pow(&Object::Int(-1)),
            Ok(Object::Float(0.5))
        );
    }

    #[test]
    fn test_string_concat_and_replicate() {
        let hi = Object::Str(JaplString::new("hi".to_string()));
        let there = Object::Str(JaplString::new(" there".to_string()));
        assert_eq!(
            hi.add(&there),
            Ok(Object::Str(JaplString::new("hi there".to_string())))
        );
        assert_eq!(
            hi.mul(&Object::Int(3)),
            Ok(Object::Str(JaplString::new("hihihi".to_string())))
        );
        assert_eq!(
            hi.mul(&Object::Int(-1)),
            Ok(Object::Str(JaplString::new(String::new())))
        );
        assert_eq!(hi.sub(&there), Err(OpError::Unsupported));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(Object::Int(0b1100).and(&Object::Int(0b1010)), Ok(Object::Int(0b1000)));
        assert_eq!(Object::Int(0b1100).or(&Object::Int(0b1010)), Ok(Object::Int(0b1110)));
        assert_eq!(Object::Int(0b1100).xor(&Object::Int(0b1010)), Ok(Object::Int(0b0110)));
        assert_eq!(Object::Int(1).shl(&Object::Int(4)), Ok(Object::Int(16)));
        assert_eq!(Object::Int(1).shl(&Object::Int(64)), Ok(Object::Int(0)));
        assert_eq!(Object::Int(-1).shr(&Object::Int(63)), Ok(Object::Int(1)));
        assert_eq!(
            Object::Bool(true).xor(&Object::Bool(false)),
            Ok(Object::Bool(true))
        );
        assert_eq!(Object::Nil.xor(&Object::Int(1)), Err(OpError::Unsupported));
    }

    #[test]
    fn test_truthiness_conjunction() {
        // Non-integer operands combine truthiness.
        assert_eq!(
            Object::Bool(true).and(&Object::Nil),
            Ok(Object::Bool(false))
        );
        assert_eq!(
            Object::Str(JaplString::new("x".to_string())).or(&Object::Nil),
            Ok(Object::Bool(true))
        );
    }

    #[test]
    fn test_negate() {
        assert_eq!(Object::Int(5).negate(), Ok(Object::Int(-5)));
        assert_eq!(Object::Int(i64::MIN).negate(), Err(OpError::Overflow));
        assert!(matches!(
            Object::Inf { negative: false }.negate(),
            Ok(Object::Inf { negative: true })
        ));
        assert_eq!(Object::Nil.negate(), Err(OpError::Unsupported));
    }

    #[test]
    fn test_numeric_cmp() {
        use std::cmp::Ordering::*;
        assert_eq!(Object::Int(1).numeric_cmp(&Object::Int(2)), Ok(Some(Less)));
        assert_eq!(
            Object::Float(2.5).numeric_cmp(&Object::Int(2)),
            Ok(Some(Greater))
        );
        assert_eq!(Object::Nan.numeric_cmp(&Object::Int(2)), Ok(None));
        assert_eq!(
            Object::Int(1).numeric_cmp(&Object::Str(JaplString::new("a".into()))),
            Err(OpError::Unsupported)
        );
        assert_eq!(
            Object::Inf { negative: true }.numeric_cmp(&Object::Int(0)),
            Ok(Some(Less))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Object::Int(7).to_string(), "7");
        assert_eq!(Object::Float(7.0).to_string(), "7.0");
        assert_eq!(Object::Float(2.5).to_string(), "2.5");
        assert_eq!(Object::Nil.to_string(), "nil");
        assert_eq!(Object::Inf { negative: true }.to_string(), "-inf");
        assert_eq!(Object::Nan.to_string(), "nan");

        let named = Object::Function(Rc::new(Function::new(Some("fact".to_string()))));
        assert_eq!(named.to_string(), "<function fact>");
        let script = Object::Function(Rc::new(Function::new(None)));
        assert_eq!(script.to_string(), "<code object>");

        let exc = Object::Exception(Exception {
            name: "TypeError".to_string(),
            message: "division by zero".to_string(),
        });
        assert_eq!(exc.to_string(), "TypeError: division by zero");
    }
}
