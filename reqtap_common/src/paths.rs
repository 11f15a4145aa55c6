//! URL cleanup rules applied to every record

/// Strip all leading and trailing slashes from a path
pub fn clean_path(url: &str) -> String {
    url.trim_matches('/').to_string()
}

/// Collapse every run of slashes to a single slash
///
/// A leading `scheme://` keeps exactly two slashes; extra slashes after it
/// are dropped.
pub fn clean_full_url(full_url: &str) -> String {
    let (mut cleaned, rest) = match split_scheme(full_url) {
        Some((scheme, rest)) => (format!("{}://", scheme), rest.trim_start_matches('/')),
        None => (String::new(), full_url),
    };
    cleaned.reserve(rest.len());

    let mut previous_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        cleaned.push(c);
    }

    cleaned
}

/// Split `scheme://rest` when the prefix is a valid URL scheme
fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let idx = url.find("://")?;
    let scheme = &url[..idx];

    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }

    Some((scheme, &url[idx + 3..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/a/"), "a");
        assert_eq!(clean_path("///api/users//"), "api/users");
        assert_eq!(clean_path("foo/bar"), "foo/bar");
        assert_eq!(clean_path("/"), "");
        assert_eq!(clean_path(""), "");
    }

    #[test]
    fn test_full_url_keeps_scheme_separator() {
        assert_eq!(clean_full_url("http://host//a//b"), "http://host/a/b");
        assert_eq!(clean_full_url("https://host/a/b/"), "https://host/a/b/");
        assert_eq!(
            clean_full_url("https://api.example.com///v1////users?id=1"),
            "https://api.example.com/v1/users?id=1"
        );
    }

    #[test]
    fn test_full_url_extra_scheme_slashes() {
        assert_eq!(clean_full_url("http:///host/a"), "http://host/a");
        assert_eq!(clean_full_url("http:////host"), "http://host");
    }

    #[test]
    fn test_full_url_without_scheme() {
        assert_eq!(clean_full_url("//host//a"), "/host/a");
        assert_eq!(clean_full_url("api//users"), "api/users");
        assert_eq!(clean_full_url(""), "");
    }

    #[test]
    fn test_full_url_invalid_scheme_is_collapsed() {
        assert_eq!(clean_full_url("1http://host"), "1http:/host");
        assert_eq!(clean_full_url("/path?next=a://b"), "/path?next=a:/b");
    }
}
