/// Pieces of a native column type declaration such as `varchar(255)` or
/// `decimal(10,2)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeType {
    pub name: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
}

/// Parse `TYPE(length[,precision])` out of a combined native type string,
/// as reported by MySQL's `DESCRIBE` and SQLite's `PRAGMA table_info`.
pub fn parse_native_type(input: &str) -> NativeType {
    let input = input.trim();
    let name: String = input
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let mut result = NativeType {
        name: name.to_lowercase(),
        length: None,
        precision: None,
    };
    let Some(open) = input.find('(') else {
        return result;
    };
    let Some(close) = input[open..].find(')') else {
        return result;
    };
    let mut parts = input[open + 1..open + close].split(',');
    result.length = parts.next().and_then(|v| v.trim().parse().ok());
    result.precision = parts.next().and_then(|v| v.trim().parse().ok());
    result
}

/// Strip a pair of single quotes from a default literal (`'abc'` → `abc`),
/// unescaping doubled quotes.
pub fn unquote_single(input: &str) -> Option<String> {
    let inner = input.strip_prefix('\'')?;
    let end = inner.rfind('\'')?;
    Some(inner[..end].replace("''", "'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_type() {
        assert_eq!(
            parse_native_type("INTEGER"),
            NativeType {
                name: "integer".into(),
                length: None,
                precision: None,
            }
        );
    }

    #[test]
    fn type_with_length() {
        assert_eq!(
            parse_native_type("varchar(64)"),
            NativeType {
                name: "varchar".into(),
                length: Some(64),
                precision: None,
            }
        );
    }

    #[test]
    fn type_with_length_and_precision() {
        assert_eq!(
            parse_native_type("decimal(10,2)"),
            NativeType {
                name: "decimal".into(),
                length: Some(10),
                precision: Some(2),
            }
        );
    }

    #[test]
    fn unquotes_defaults() {
        assert_eq!(unquote_single("'abc'"), Some("abc".into()));
        assert_eq!(unquote_single("'it''s'"), Some("it's".into()));
        assert_eq!(unquote_single("CURRENT_TIMESTAMP"), None);
    }
}
