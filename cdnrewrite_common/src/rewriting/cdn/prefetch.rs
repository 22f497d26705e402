//! `dns-prefetch` hint for the CDN host.

/// The literal opening tag the hint is placed after. Tags carrying attributes are not matched.
pub const HEAD_TAG: &str = "<head>";

pub fn prefetch_tag(cdn_domain: &str) -> String {
    format!(
        r#"<link rel="dns-prefetch" href="{}">"#,
        escape_attribute(cdn_domain)
    )
}

/// Insert one prefetch tag right after the first `<head>`.
///
/// Returns `None` when the body has no `<head>`. There is no check for an existing tag, so
/// running this twice leaves two tags behind.
pub fn inject_prefetch(body: &str, cdn_domain: &str) -> Option<String> {
    let at = body.find(HEAD_TAG)? + HEAD_TAG.len();
    let tag = prefetch_tag(cdn_domain);

    let mut out = String::with_capacity(body.len() + tag.len());
    out.push_str(&body[..at]);
    out.push_str(&tag);
    out.push_str(&body[at..]);
    Some(out)
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}
