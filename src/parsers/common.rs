use thiserror::Error;

const HANDLE_SENTINEL: char = '@';
const LINK_PREFIXES: [&str; 6] = [
    "https://t.me/",
    "http://t.me/",
    "t.me/",
    "https://telegram.me/",
    "http://telegram.me/",
    "telegram.me/",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle is empty")]
    Empty,
    #[error("handle `{0}` contains whitespace")]
    Whitespace(String),
}

/// Canonical form of a channel or bot handle: one leading `@`, lowercase.
///
/// Accepts `name`, `@name`, `@@name` and `t.me/name` links. Applying it to
/// its own output returns the same string.
pub fn canonical_handle(raw: &str) -> Result<String, HandleError> {
    let mut name = raw.trim();
    for prefix in LINK_PREFIXES {
        if name
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            name = &name[prefix.len()..];
            break;
        }
    }
    let name = name.trim_start_matches(HANDLE_SENTINEL).trim_end_matches('/');

    if name.is_empty() {
        return Err(HandleError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(HandleError::Whitespace(raw.trim().to_string()));
    }

    Ok(format!("{HANDLE_SENTINEL}{}", name.to_lowercase()))
}

/// Canonicalizes every handle and drops repeats, keeping first occurrence order.
pub fn canonical_handles<I, S>(raw: I) -> Result<Vec<String>, HandleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut handles: Vec<String> = Vec::new();
    for item in raw {
        let handle = canonical_handle(item.as_ref())?;
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    Ok(handles)
}

pub struct MessageUtils;

impl MessageUtils {
    /// Splits a comma and/or whitespace separated list of handles.
    pub fn split_handle_list(value: &str) -> Vec<String> {
        value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Short single-line excerpt for log lines.
    pub fn preview_text(value: &str) -> String {
        const MAX_PREVIEW_CHARS: usize = 80;
        let flattened = value.replace(['\n', '\r'], " ");
        let mut preview: String = flattened.chars().take(MAX_PREVIEW_CHARS).collect();
        if flattened.chars().count() > MAX_PREVIEW_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::{HandleError, MessageUtils, canonical_handle, canonical_handles};

    #[test]
    fn canonical_handle_adds_single_sentinel() {
        assert_eq!(canonical_handle("newschannel").unwrap(), "@newschannel");
        assert_eq!(canonical_handle("@newschannel").unwrap(), "@newschannel");
        assert_eq!(canonical_handle("@@@newschannel").unwrap(), "@newschannel");
        assert_eq!(canonical_handle("  @NewsChannel ").unwrap(), "@newschannel");
    }

    #[test]
    fn canonical_handle_is_idempotent() {
        for raw in ["chan", "@Chan", "https://t.me/Chan", "t.me/chan/", "@@x_y"] {
            let once = canonical_handle(raw).unwrap();
            let twice = canonical_handle(&once).unwrap();
            assert_eq!(once, twice, "input {raw}");
        }
    }

    #[test]
    fn canonical_handle_strips_links() {
        assert_eq!(canonical_handle("https://t.me/digest").unwrap(), "@digest");
        assert_eq!(canonical_handle("telegram.me/digest/").unwrap(), "@digest");
    }

    #[test]
    fn canonical_handle_rejects_empty_and_spaced() {
        assert_eq!(canonical_handle("   "), Err(HandleError::Empty));
        assert_eq!(canonical_handle("@"), Err(HandleError::Empty));
        assert!(matches!(
            canonical_handle("two words"),
            Err(HandleError::Whitespace(_))
        ));
    }

    #[test]
    fn canonical_handles_dedupes_in_order() {
        let handles = canonical_handles(["b", "@a", "@B", "a"]).unwrap();
        assert_eq!(handles, vec!["@b".to_string(), "@a".to_string()]);
    }

    #[test]
    fn split_handle_list_accepts_commas_and_spaces() {
        assert_eq!(
            MessageUtils::split_handle_list("@a, @b  c,,d"),
            vec!["@a", "@b", "c", "d"]
        );
    }

    #[test]
    fn preview_text_truncates_long_values() {
        let long = "x".repeat(200);
        let preview = MessageUtils::preview_text(&long);
        assert_eq!(preview.chars().count(), 83);
        assert!(preview.ends_with("..."));
        assert_eq!(MessageUtils::preview_text("a\nb"), "a b");
    }
}
