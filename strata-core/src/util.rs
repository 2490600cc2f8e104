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

/// Largest char boundary of `value` not above `index`.
pub fn char_boundary(value: &str, index: usize) -> usize {
    if index >= value.len() {
        return value.len();
    }
    (0..=index)
        .rev()
        .find(|i| value.is_char_boundary(*i))
        .unwrap_or_default()
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::char_boundary(&$query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}
