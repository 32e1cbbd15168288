use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Wraps a rendered body into the site layout.
pub fn page(title: &str, body: &str) -> String {
    include_res!(str, "/pages/layout.html")
        .replace("{title}", &escape(title))
        .replace("{body}", body)
}

pub fn sorry(title: &str, message: &str) -> String {
    page(
        title,
        &include_res!(str, "/pages/sorry.html")
            .replace("{title}", &escape(title))
            .replace("{message}", &escape(message)),
    )
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            // A filled value must not read as a placeholder.
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~').remove(b'/');

/// Percent-encodes everything but unreserved characters and `/`.
pub fn urlencode(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// `checked` attribute for a checkbox.
pub fn checked(on: bool) -> &'static str {
    if on { "checked" } else { "" }
}

/// Renders `<option>`s, marking the ones whose id is in `selected`.
pub fn options<'a, I>(items: I, selected: &[i64]) -> String
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    items
        .into_iter()
        .map(|(id, label)| {
            let sel = if selected.contains(&id) { " selected" } else { "" };
            format!("<option value=\"{id}\"{sel}>{}</option>", escape(label))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }

    #[test]
    fn filled_values_cannot_become_placeholders() {
        let html = include_res!(str, "/pages/sorry.html")
            .replace("{title}", &escape("Release {message} notes"))
            .replace("{message}", &escape("gone"));
        assert!(html.contains("Release &#123;message&#125; notes"));
        assert!(!html.contains("Release gone notes"));
    }

    #[test]
    fn urlencodes_path_segments() {
        assert_eq!(urlencode("a b/c~{d}"), "a%20b/c~%7Bd%7D");
        assert_eq!(urlencode("șapte"), "%C8%99apte");
    }

    #[test]
    fn marks_selected_options() {
        let html = options([(1, "rust"), (2, "c")], &[2]);
        assert_eq!(html, "<option value=\"1\">rust</option><option value=\"2\" selected>c</option>");
    }
}
