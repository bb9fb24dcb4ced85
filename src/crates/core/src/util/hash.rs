/// 32-bit rolling string hash (`h = h * 31 + unit`, wrapping) over UTF-16 code
/// units, rendered as the base-36 absolute value.
pub fn hash_code(text: &str) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    hash_code_units(&units)
}

/// [`hash_code`] over raw UTF-16 units. Unpaired surrogates hash as-is.
pub fn hash_code_units(units: &[u16]) -> String {
    let mut hash: i32 = 0;
    for &unit in units {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    to_base36((hash as i64).unsigned_abs())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
