//! Typed `key=value` parameter blocks.
//!
//! Deck parameter lines carry no schema; the type of each value is inferred
//! from the shape of its literal:
//!
//! | Literal shape                         | Value                  |
//! |---------------------------------------|------------------------|
//! | contains `.`, no `,`                  | [`ParamValue::Float`]    |
//! | contains `.` and `,`                  | [`ParamValue::FloatList`] |
//! | no `.`, contains `,`                  | [`ParamValue::IntList`]  |
//! | alphabetic, or the key is `name`      | [`ParamValue::Str`]      |
//! | no `.`, has an exponent marker        | [`ParamValue::FloatList`] |
//! | anything else                         | [`ParamValue::Int`]      |
//!
//! Readers ask for the keys they need with the typed accessors, which fail
//! with [`DeckError::MalformedInput`] on a type mismatch.

use std::fmt;

use crate::error::{DeckError, Result};

/// Keys whose values are always kept as strings.
const NAME_KEYS: &[&str] = &["name"];

/// A single decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl ParamValue {
    /// Infer a value from its literal text.
    pub fn infer(key: &str, literal: &str) -> Result<Self> {
        let has_dot = literal.contains('.');
        let has_comma = literal.contains(',');
        let is_name = NAME_KEYS.contains(&key);
        let invalid = |what: &str| {
            DeckError::malformed(
                "parameter",
                format!("'{}={}' is not a valid {}", key, literal, what),
            )
        };

        if has_dot && !has_comma && !is_name {
            literal.trim().parse().map(Self::Float).map_err(|_| invalid("float"))
        } else if has_dot && has_comma {
            parse_list(literal).map(Self::FloatList).ok_or_else(|| invalid("float list"))
        } else if !has_dot && has_comma {
            if literal.contains(is_exponent) {
                parse_list(literal).map(Self::FloatList).ok_or_else(|| invalid("float list"))
            } else {
                parse_list(literal).map(Self::IntList).ok_or_else(|| invalid("integer list"))
            }
        } else if is_name || (!literal.is_empty() && literal.chars().all(char::is_alphabetic)) {
            Ok(Self::Str(literal.to_string()))
        } else if literal.contains(is_exponent) {
            parse_list(literal).map(Self::FloatList).ok_or_else(|| invalid("float"))
        } else {
            literal.trim().parse().map(Self::Int).map_err(|_| invalid("integer"))
        }
    }

    /// Short type name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::IntList(_) => "integer list",
            Self::FloatList(_) => "float list",
        }
    }

    /// Compare values the way they survive a write/read cycle.
    ///
    /// A one-element list prints identically to its scalar, so the two are
    /// treated as equal.
    pub fn same_as(&self, other: &ParamValue) -> bool {
        use ParamValue::*;
        match (self, other) {
            (Float(a), FloatList(b)) | (FloatList(b), Float(a)) => b.len() == 1 && b[0] == *a,
            (Int(a), IntList(b)) | (IntList(b), Int(a)) => b.len() == 1 && b[0] == *a,
            _ => self == other,
        }
    }
}

fn is_exponent(c: char) -> bool {
    c == 'e' || c == 'E'
}

fn parse_list<T: std::str::FromStr>(literal: &str) -> Option<Vec<T>> {
    literal
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// Format a float so that it reads back as a float.
pub fn format_float(value: f64) -> String {
    let text = format!("{:?}", value);
    if text.contains('.') || !value.is_finite() {
        return text;
    }
    match text.find(is_exponent) {
        Some(pos) => format!("{}.0{}", &text[..pos], &text[pos..]),
        None => format!("{}.0", text),
    }
}

fn join<T>(items: &[T], fmt_item: impl Fn(&T) -> String) -> String {
    items.iter().map(fmt_item).collect::<Vec<_>>().join(",")
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(s) => write!(f, "{}", s),
            Self::IntList(v) => write!(f, "{}", join(v, |x| x.to_string())),
            Self::FloatList(v) => write!(f, "{}", join(v, |x| format_float(*x))),
        }
    }
}

/// Ordered mapping from lower-case key to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBlock {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a block from `(key, value)` defaults.
    pub fn with_defaults(defaults: &[(&str, ParamValue)]) -> Self {
        let mut block = Self::new();
        for (k, v) in defaults {
            block.insert(*k, v.clone());
        }
        block
    }

    /// Decode a space-separated `key=value` line.
    pub fn parse(line: &str) -> Result<Self> {
        decode(line, Self::new(), ' ', '=')
    }

    /// Insert or overwrite a value, keeping the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        let key = key.into().to_ascii_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a value by key.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Check if a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another block's entries over this one.
    pub fn merge(&mut self, other: ParameterBlock) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    /// Copy of this block restricted to (or excluding) a key set.
    pub fn select(&self, keys: &[&str], keep: bool) -> ParameterBlock {
        ParameterBlock {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| keys.contains(&k.as_str()) == keep)
                .cloned()
                .collect(),
        }
    }

    /// Format the block as one deck line (without the newline).
    pub fn to_line(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compare two blocks key-by-key, ignoring order.
    pub fn same_as(&self, other: &ParameterBlock) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.same_as(o)))
    }

    fn mismatch(key: &str, expected: &str, found: &ParamValue) -> DeckError {
        DeckError::malformed(
            "parameter",
            format!("{} must be {}, found {} '{}'", key.to_uppercase(), expected, found.kind(), found),
        )
    }

    fn missing(key: &str) -> DeckError {
        DeckError::malformed("parameter", format!("required field {} is missing", key.to_uppercase()))
    }

    /// Integer value, if present.
    pub fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(key, "an integer", other)),
        }
    }

    /// Required integer value.
    pub fn require_int(&self, key: &str) -> Result<i64> {
        self.int(key)?.ok_or_else(|| Self::missing(key))
    }

    /// Required non-negative count.
    pub fn require_count(&self, key: &str) -> Result<usize> {
        let v = self.require_int(key)?;
        usize::try_from(v).map_err(|_| {
            DeckError::malformed("parameter", format!("{} must not be negative, found {}", key.to_uppercase(), v))
        })
    }

    /// Float value, if present. Integers are widened.
    pub fn float(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::Float(v)) => Ok(Some(*v)),
            Some(ParamValue::Int(v)) => Ok(Some(*v as f64)),
            Some(ParamValue::FloatList(v)) if v.len() == 1 => Ok(Some(v[0])),
            Some(other) => Err(Self::mismatch(key, "a number", other)),
        }
    }

    /// Required float value.
    pub fn require_float(&self, key: &str) -> Result<f64> {
        self.float(key)?.ok_or_else(|| Self::missing(key))
    }

    /// Numeric list, if present. Scalars become one-element lists.
    pub fn float_list(&self, key: &str) -> Result<Option<Vec<f64>>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::Float(v)) => Ok(Some(vec![*v])),
            Some(ParamValue::Int(v)) => Ok(Some(vec![*v as f64])),
            Some(ParamValue::FloatList(v)) => Ok(Some(v.clone())),
            Some(ParamValue::IntList(v)) => Ok(Some(v.iter().map(|x| *x as f64).collect())),
            Some(other) => Err(Self::mismatch(key, "a number list", other)),
        }
    }

    /// String value, if present.
    pub fn string(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(Self::mismatch(key, "a string", other)),
        }
    }
}

/// Decode a line of `key<kv_sep>value` tokens separated by `field_sep` into `block`.
///
/// Tokens without `kv_sep` are appended to the previous value; this repairs
/// values that were split by a `field_sep` inside them (for example a list
/// continued onto a new line).
pub fn decode(line: &str, mut block: ParameterBlock, field_sep: char, kv_sep: char) -> Result<ParameterBlock> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for token in line.split(field_sep).filter(|t| !t.is_empty()) {
        match token.split_once(kv_sep) {
            Some((key, value)) => {
                if key.is_empty() || value.contains(kv_sep) {
                    return Err(DeckError::malformed(
                        "parameter",
                        format!("cannot split '{}' into a key and a value", token),
                    ));
                }
                pairs.push((key.to_string(), value.to_string()));
            }
            None => match pairs.last_mut() {
                Some((_, value)) => value.push_str(token),
                None => {
                    return Err(DeckError::malformed(
                        "parameter",
                        format!("'{}' has no key", token),
                    ))
                }
            },
        }
    }

    for (key, value) in pairs {
        let key = key.to_ascii_lowercase();
        let value = ParamValue::infer(&key, &value)?;
        block.insert(key, value);
    }

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference() {
        let b = ParameterBlock::parse("NMATS=2 VF=0.6 MATID=U EL=3.0E3,0.3 SM=1,-2 TOL=1E-4 NAME=run1").unwrap();
        assert_eq!(b.get("nmats"), Some(&ParamValue::Int(2)));
        assert_eq!(b.get("vf"), Some(&ParamValue::Float(0.6)));
        assert_eq!(b.get("matid"), Some(&ParamValue::Str("U".into())));
        assert_eq!(b.get("el"), Some(&ParamValue::FloatList(vec![3000.0, 0.3])));
        assert_eq!(b.get("sm"), Some(&ParamValue::IntList(vec![1, -2])));
        assert_eq!(b.get("tol"), Some(&ParamValue::FloatList(vec![1e-4])));
        assert_eq!(b.get("name"), Some(&ParamValue::Str("run1".into())));
    }

    #[test]
    fn test_keyless_tokens_extend_previous_value() {
        let b = ParameterBlock::parse("H=0.25,0.25, 0.25,0.25 M=1").unwrap();
        assert_eq!(b.get("h"), Some(&ParamValue::FloatList(vec![0.25; 4])));
        assert_eq!(b.get("m"), Some(&ParamValue::Int(1)));
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(ParameterBlock::parse("VF=0.5.5"), Err(DeckError::MalformedInput { .. })));
        assert!(matches!(ParameterBlock::parse("orphan"), Err(DeckError::MalformedInput { .. })));
        assert!(matches!(ParameterBlock::parse("A=B=C"), Err(DeckError::MalformedInput { .. })));
        assert!(matches!(ParameterBlock::parse("N=abc1"), Err(DeckError::MalformedInput { .. })));
    }

    #[test]
    fn test_decode_overwrites_seeded_defaults() {
        let seed = ParameterBlock::with_defaults(&[("npl", ParamValue::Int(1)), ("vflev", ParamValue::Int(0))]);
        let b = decode("NPL=6", seed, ' ', '=').unwrap();
        assert_eq!(b.to_line(), "npl=6 vflev=0");
    }

    #[test]
    fn test_typed_accessors() {
        let b = ParameterBlock::parse("LOP=99 VF=1 MODE=1,1 MATID=U").unwrap();
        assert_eq!(b.require_int("lop").unwrap(), 99);
        assert_eq!(b.require_float("vf").unwrap(), 1.0);
        assert_eq!(b.float_list("mode").unwrap(), Some(vec![1.0, 1.0]));
        assert!(b.require_int("matid").is_err());
        assert!(b.require_int("missing").is_err());
        assert_eq!(b.int("missing").unwrap(), None);
    }

    #[test]
    fn test_format_float_always_reads_back_as_float() {
        assert_eq!(format_float(3000.0), "3000.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(1e-5), "1.0e-5");
        let v = ParamValue::infer("x", &format_float(1e-5)).unwrap();
        assert_eq!(v, ParamValue::Float(1e-5));
    }

    #[test]
    fn test_line_round_trip() {
        let line = "M=1 CMOD=6 MATID=U EL=3000.0,3000.0,0.3 ALPHA=1E-5 NLIST=1,2,3";
        let b = ParameterBlock::parse(line).unwrap();
        let again = ParameterBlock::parse(&b.to_line()).unwrap();
        assert!(b.same_as(&again));
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut b = ParameterBlock::parse("A=1 B=2").unwrap();
        b.insert("A", ParamValue::Int(5));
        assert_eq!(b.to_line(), "a=5 b=2");
        assert_eq!(b.select(&["b"], true).to_line(), "b=2");
        assert_eq!(b.select(&["b"], false).to_line(), "a=5");
    }
}
