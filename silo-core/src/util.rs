/// Write `values` into `out` through `f`, inserting `separator` between
/// the items that actually produced output.
pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_by_skips_empty_entries() {
        let mut out = String::new();
        separated_by(
            &mut out,
            ["a", "", "b", "c"],
            |out, v| out.push_str(v),
            ", ",
        );
        assert_eq!(out, "a, b, c");
    }
}
