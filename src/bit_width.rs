//! Bitbreiten fuer Event Codes, Enumerations und String-Table-Indizes.

/// Anzahl Bits fuer `n` unterschiedliche Werte: `ceil(log2(n))`.
///
/// `n = 0` und `n = 1` brauchen kein Bit.
#[inline]
pub fn for_count(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Bits fuer einen geschlossenen Integer-Bereich `[min, max]`.
///
/// Liefert `None` wenn der Bereich leer ist oder nicht in `usize` passt.
pub fn for_range(min: i128, max: i128) -> Option<u8> {
    if max < min {
        return None;
    }
    let count = usize::try_from(max - min).ok()?.checked_add(1)?;
    Some(for_count(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grundwerte() {
        assert_eq!(for_count(0), 0);
        assert_eq!(for_count(1), 0);
        assert_eq!(for_count(2), 1);
        assert_eq!(for_count(3), 2);
        assert_eq!(for_count(4), 2);
        assert_eq!(for_count(5), 3);
        assert_eq!(for_count(9), 4);
        assert_eq!(for_count(256), 8);
        assert_eq!(for_count(257), 9);
    }

    #[test]
    fn bereiche() {
        assert_eq!(for_range(-128, 127), Some(8));
        assert_eq!(for_range(0, 0), Some(0));
        assert_eq!(for_range(-3, 3), Some(3));
        assert_eq!(for_range(5, 4), None);
    }
}
