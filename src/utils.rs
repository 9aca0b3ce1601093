//! Conversión de duraciones y de índices escritos por el usuario.

/// Formatea una duración en segundos como `HH:MM:SS`.
pub fn seconds_to_hms(total: u64) -> String {
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Convierte un timestamp `[[HH:]MM:]SS` a segundos.
///
/// Las partes vacías o no numéricas cuentan como 0, igual que los valores
/// negativos; `"1:30"` son 90 segundos.
pub fn hms_to_seconds(hms: &str) -> u64 {
    let mut total: u64 = 0;
    let units: [u64; 3] = [1, 60, 3600];

    for (part, unit) in hms.rsplit(':').zip(units) {
        let value = part.trim().parse::<i64>().unwrap_or(0).max(0) as u64;
        total += value * unit;
    }

    total
}

/// Traduce un índice 1-based escrito por el usuario a un índice 0-based.
///
/// Acepta el literal `"last"` como último elemento; devuelve `None` para
/// entradas no numéricas o fuera de `[1, len]`.
pub fn string_to_index(s: &str, len: usize) -> Option<usize> {
    if s == "last" {
        return len.checked_sub(1);
    }

    match s.trim().parse::<i64>() {
        Ok(n) if n >= 1 && (n as usize) <= len => Some(n as usize - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_hms() {
        assert_eq!(seconds_to_hms(0), "00:00:00");
        assert_eq!(seconds_to_hms(59), "00:00:59");
        assert_eq!(seconds_to_hms(90), "00:01:30");
        assert_eq!(seconds_to_hms(3600), "01:00:00");
        assert_eq!(seconds_to_hms(3725), "01:02:05");
    }

    #[test]
    fn test_hms_to_seconds() {
        assert_eq!(hms_to_seconds("90"), 90);
        assert_eq!(hms_to_seconds("1:30"), 90);
        assert_eq!(hms_to_seconds("01:02:05"), 3725);
        assert_eq!(hms_to_seconds(""), 0);
        assert_eq!(hms_to_seconds("abc"), 0);
        assert_eq!(hms_to_seconds("-5"), 0);
        assert_eq!(hms_to_seconds("2:-1:10"), 7210);
    }

    #[test]
    fn test_string_to_index() {
        assert_eq!(string_to_index("1", 10), Some(0));
        assert_eq!(string_to_index("10", 10), Some(9));
        assert_eq!(string_to_index("last", 10), Some(9));
        assert_eq!(string_to_index("last", 0), None);
        assert_eq!(string_to_index("0", 10), None);
        assert_eq!(string_to_index("11", 10), None);
        assert_eq!(string_to_index("abc", 10), None);
        assert_eq!(string_to_index("-3", 10), None);
    }
}
