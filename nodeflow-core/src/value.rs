//! Scalar payloads with syntactic typing.
//!
//! Adapters that read text decide a cell's type from its syntax, not
//! by sniffing the target: keyword literals, integer/float shapes and
//! ISO-8601 dates are recognized, everything else stays a string.
//! `Raw` carries an opaque, already-serialized fragment untouched.

/// A scalar payload carried by a `Value` node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent/null. Also what schema padding fills missing fields with.
    Nil,

    /// Boolean: `true` or `false` (lowercase only).
    Bool(bool),

    /// Integer: `42`, `-17`, `1_000_000`.
    Integer(i64),

    /// Float: `3.14`, `1.5e-3`.
    Float(f64),

    /// Plain text.
    String(String),

    /// Calendar date kept in its ISO-8601 text form (`2024-07-01`).
    /// Conversion to a date type is an adapter concern.
    Date(String),

    /// Opaque pre-serialized fragment, passed through untouched.
    Raw(String),
}

/// The scalar type of a payload, used for coercion checks at writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Integer,
    Float,
    String,
    Date,
    Raw,
}

impl ScalarKind {
    /// Short name used in coercion error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Date => "date",
            Self::Raw => "raw",
        }
    }
}

/// Keyword literals recognized by syntactic typing.
static KEYWORDS: phf::Map<&'static str, Value> = phf::phf_map! {
    "null" => Value::Nil,
    "nil" => Value::Nil,
    "~" => Value::Nil,
    "true" => Value::Bool(true),
    "false" => Value::Bool(false),
};

impl Value {
    /// Check if this is the nil value.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Try to get as boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as float. Integers widen.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as text.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Date(s) | Value::Raw(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar kind of this payload, or `None` for nil.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Nil => None,
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Integer(_) => Some(ScalarKind::Integer),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::String(_) => Some(ScalarKind::String),
            Value::Date(_) => Some(ScalarKind::Date),
            Value::Raw(_) => Some(ScalarKind::Raw),
        }
    }

    /// Check whether this payload can stand in for the expected kind.
    ///
    /// Nil conforms to everything (it is the padding value); integers
    /// widen to float. No other coercions exist at this layer.
    pub fn conforms(&self, expected: ScalarKind) -> bool {
        match self.scalar_kind() {
            None => true,
            Some(k) if k == expected => true,
            Some(ScalarKind::Integer) => expected == ScalarKind::Float,
            Some(_) => false,
        }
    }

    /// Parse text into a typed value.
    ///
    /// Syntactic typing:
    /// - `true`/`false` → Bool
    /// - `null`/`nil`/`~` → Nil
    /// - integer shapes (`42`, `-17`, `1_000`) → Integer
    /// - float shapes (`3.14`, `1.5e-3`) → Float
    /// - `YYYY-MM-DD` → Date
    /// - everything else → String
    pub fn parse(text: &str) -> Value {
        if text.is_empty() {
            return Value::String(String::new());
        }

        if let Some(v) = KEYWORDS.get(text) {
            return v.clone();
        }

        if let Some(v) = Self::try_parse_number(text) {
            return v;
        }

        if Self::is_date_shape(text) {
            return Value::Date(text.to_owned());
        }

        Value::String(text.to_owned())
    }

    /// Try to parse text as a numeric value.
    /// Returns None if not a valid number shape.
    fn try_parse_number(text: &str) -> Option<Value> {
        let bytes = text.as_bytes();
        let (negative, rest) = if bytes.first() == Some(&b'-') {
            (true, &bytes[1..])
        } else {
            (false, bytes)
        };

        if rest.is_empty() || !rest[0].is_ascii_digit() {
            return None;
        }

        // Decimal point or exponent means float
        if rest.contains(&b'.') || rest.contains(&b'e') || rest.contains(&b'E') {
            return Self::try_parse_float(negative, rest);
        }

        Self::try_parse_decimal(negative, rest)
    }

    fn try_parse_decimal(negative: bool, bytes: &[u8]) -> Option<Value> {
        let mut result: i64 = 0;
        for &b in bytes {
            match b {
                b'0'..=b'9' => {
                    result = result.checked_mul(10)?.checked_add((b - b'0') as i64)?;
                }
                b'_' => continue, // Underscore separator allowed
                _ => return None,
            }
        }

        if negative {
            result = result.checked_neg()?;
        }

        Some(Value::Integer(result))
    }

    fn try_parse_float(negative: bool, bytes: &[u8]) -> Option<Value> {
        let s: String = bytes
            .iter()
            .filter(|&&b| b != b'_')
            .map(|&b| b as char)
            .collect();

        let mut value: f64 = s.parse().ok()?;
        if negative {
            value = -value;
        }

        Some(Value::Float(value))
    }

    /// `YYYY-MM-DD`: exactly 4-2-2 digit groups. Range checks beyond the
    /// shape belong to adapters.
    fn is_date_shape(text: &str) -> bool {
        let b = text.as_bytes();
        b.len() == 10
            && b[0..4].iter().all(u8::is_ascii_digit)
            && b[4] == b'-'
            && b[5..7].iter().all(u8::is_ascii_digit)
            && b[7] == b'-'
            && b[8..10].iter().all(u8::is_ascii_digit)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) | Value::Date(s) | Value::Raw(s) => f.write_str(s),
        }
    }
}
