use num::Num;
use std::num::ParseIntError;

/* Integer literals

The base is inferred from the prefix: `0x`/`0X` hex, `0b`/`0B` binary, a
leading `0` octal, decimal otherwise. A leading `-` forces plain decimal,
so negative literals of other bases are rejected.

Parsing is deliberately permissive about signedness: any value in
[i32::MIN, u32::MAX] is accepted and truncated to 32 bits, so
`.word 0xFFFFFFFF` stores -1.
*/

fn split_radix(token: &str) -> Option<(u32, &str)> {
    let bytes = token.as_bytes();
    match bytes.first()? {
        b'-' => Some((10, token)),
        b'0' if bytes.len() > 1 => match bytes[1] {
            b'x' | b'X' => Some((16, &token[2..])),
            b'b' | b'B' => Some((2, &token[2..])),
            c if c.is_ascii_alphabetic() => None,
            _ => Some((8, token)),
        },
        _ => Some((10, token)),
    }
}

fn parse_digits<T>(digits: &str, radix: u32) -> Option<T>
where
    T: Num<FromStrRadixErr = ParseIntError>,
{
    T::from_str_radix(digits, radix).ok()
}

/// Parses an integer literal into 32 bits, or `None` if it is malformed
/// or does not fit.
pub fn parse_int(token: &str) -> Option<i32> {
    let (radix, digits) = split_radix(token)?;
    let wide: i64 = parse_digits(digits, radix)?;
    if wide < i64::from(i32::min_value()) || wide > i64::from(u32::max_value()) {
        return None;
    }
    Some(wide as i32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal() {
        assert_eq!(parse_int("0"), Some(0));
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-42"), Some(-42));
    }

    #[test]
    fn hex() {
        assert_eq!(parse_int("0x2A"), Some(42));
        assert_eq!(parse_int("0X2a"), Some(42));
        assert_eq!(parse_int("0x12345678"), Some(0x1234_5678));
    }

    #[test]
    fn binary() {
        assert_eq!(parse_int("0b101010"), Some(42));
        assert_eq!(parse_int("0B11"), Some(3));
    }

    #[test]
    fn octal() {
        assert_eq!(parse_int("052"), Some(42));
        assert_eq!(parse_int("08"), None);
    }

    #[test]
    fn unsigned_range_truncates() {
        assert_eq!(parse_int("0xFFFFFFFF"), Some(-1));
        assert_eq!(parse_int("4294967295"), Some(-1));
        assert_eq!(parse_int("4294967296"), None);
        assert_eq!(parse_int("-2147483648"), Some(i32::min_value()));
        assert_eq!(parse_int("-2147483649"), None);
    }

    #[test]
    fn malformed() {
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("12ab"), None);
        assert_eq!(parse_int("0q12"), None);
        assert_eq!(parse_int("-0x10"), None);
        assert_eq!(parse_int("--4"), None);
        assert_eq!(parse_int("4-2"), None);
    }
}
