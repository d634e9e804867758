//! Typed decoding of raw text cells.
//!
//! Every cell of a SphinxQL result arrives as text or NULL. Decoding never
//! fails: NULL and malformed text both resolve to a caller-supplied default.
//! Numeric parsing is locale independent and accepts the longest valid
//! prefix, so `"12abc"` decodes as `12` while `"abc"` yields the default.

/// Conversion from a raw text cell to a typed value.
pub trait FromCell: Sized {
    /// Parse non-NULL cell text. `None` means the text is malformed for
    /// this type.
    fn parse_cell(raw: &str) -> Option<Self>;

    /// Decode a cell, falling back to `default` on NULL or malformed text.
    fn from_cell(cell: Option<&str>, default: Self) -> Self {
        let Some(raw) = cell else {
            return default;
        };
        match Self::parse_cell(raw) {
            Some(value) => value,
            None => {
                tracing::trace!(
                    cell = raw,
                    target_type = std::any::type_name::<Self>(),
                    "Malformed cell, using default"
                );
                default
            }
        }
    }
}

/// Decode `cell` as `T`, returning `default` for NULL or malformed input.
pub fn decode<T: FromCell>(cell: Option<&str>, default: T) -> T {
    T::from_cell(cell, default)
}

struct IntPrefix {
    negative: bool,
    magnitude: u128,
}

fn skip_space(raw: &str) -> &str {
    raw.trim_start_matches(|c: char| c.is_ascii_whitespace())
}

/// Scan `[space][sign]digits`, saturating on overflow.
fn scan_integer(raw: &str) -> Option<IntPrefix> {
    let bytes = skip_space(raw).as_bytes();
    let (negative, mut pos) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let digits_start = pos;
    let mut magnitude: u128 = 0;
    while let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
        magnitude = magnitude
            .saturating_mul(10)
            .saturating_add(u128::from(digit - b'0'));
        pos += 1;
    }
    (pos > digits_start).then_some(IntPrefix {
        negative,
        magnitude,
    })
}

/// Length of the longest float literal at the start of `s`.
fn float_prefix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut pos = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    for word in ["infinity", "inf", "nan"] {
        let candidate = bytes.get(pos..pos + word.len());
        if candidate.is_some_and(|c| c.eq_ignore_ascii_case(word.as_bytes())) {
            return Some(pos + word.len());
        }
    }

    let mut mantissa_digits = 0;
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
        mantissa_digits += 1;
    }
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = exp;
        while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            exp += 1;
        }
        if exp > exp_digits {
            pos = exp;
        }
    }
    Some(pos)
}

macro_rules! signed_from_cell {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromCell for $t {
                fn parse_cell(raw: &str) -> Option<Self> {
                    let prefix = scan_integer(raw)?;
                    let magnitude = i128::try_from(prefix.magnitude).unwrap_or(i128::MAX);
                    let wide = if prefix.negative { -magnitude } else { magnitude };
                    Some(<$t>::try_from(wide).unwrap_or(if wide < 0 { <$t>::MIN } else { <$t>::MAX }))
                }
            }
        )*
    };
}

macro_rules! unsigned_from_cell {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromCell for $t {
                fn parse_cell(raw: &str) -> Option<Self> {
                    let prefix = scan_integer(raw)?;
                    if prefix.negative && prefix.magnitude != 0 {
                        return None;
                    }
                    Some(<$t>::try_from(prefix.magnitude).unwrap_or(<$t>::MAX))
                }
            }
        )*
    };
}

signed_from_cell!(i8, i16, i32, i64, isize);
unsigned_from_cell!(u8, u16, u32, u64, usize);

impl FromCell for f32 {
    fn parse_cell(raw: &str) -> Option<Self> {
        let s = skip_space(raw);
        let len = float_prefix_len(s)?;
        s[..len].parse().ok()
    }
}

impl FromCell for f64 {
    fn parse_cell(raw: &str) -> Option<Self> {
        let s = skip_space(raw);
        let len = float_prefix_len(s)?;
        s[..len].parse().ok()
    }
}

impl FromCell for bool {
    fn parse_cell(raw: &str) -> Option<Self> {
        if let Some(prefix) = scan_integer(raw) {
            return Some(prefix.magnitude != 0);
        }
        let word = raw.trim();
        if word.eq_ignore_ascii_case("true") {
            Some(true)
        } else if word.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }
}

impl FromCell for String {
    fn parse_cell(raw: &str) -> Option<Self> {
        Some(raw.to_owned())
    }
}

impl<T: FromCell> FromCell for Option<T> {
    fn parse_cell(raw: &str) -> Option<Self> {
        T::parse_cell(raw).map(Some)
    }
}

/// JSON attributes arrive as serialized text; malformed JSON decodes to the
/// default like any other malformed cell.
impl FromCell for serde_json::Value {
    fn parse_cell(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
