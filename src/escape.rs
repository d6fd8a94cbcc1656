//! Pattern escaping shared by the route table and the request router.
//!
//! Page paths end up inside regular expressions in two places: the `src` of
//! the route rules written to `proxy-config.json`, and the dynamic-route table
//! the router matches against at request time. Both sides go through the
//! functions here, so a path escaped for one is escaped identically for the
//! other.
//!
//! ## What Gets Escaped
//!
//! | Function | Characters | Used for |
//! |----------|------------|----------|
//! | [`escape_route_path`] | `-` `[` `]` | SSR page paths, dynamic page literals |
//! | [`escape_hyphens`] | `-` | prerendered page paths |
//! | [`normalize_data_route_regex`] | `-` | builder-provided data-route regexes |
//! | [`escape_build_id`] | all regex metacharacters | `/_next/data/<buildId>/` prefix |
//!
//! A character that is already preceded by a backslash is left alone, so
//! escaping an escaped path does not add a second backslash:
//! - `/posts/[postId]` → `/posts/\[postId\]`
//! - `/posts/\[postId\]` → `/posts/\[postId\]`
//!
//! Data-route regexes come from the builder with inconsistent hyphen escaping.
//! [`normalize_data_route_regex`] first removes every `\-` and then escapes
//! every `-`, which yields exactly one backslash per hyphen regardless of the
//! input. The two passes are kept as-is because the emitted table is consumed
//! downstream byte for byte.

/// Characters that carry meaning in a route `src` pattern.
const ROUTE_PATH_SPECIALS: &[char] = &['-', '[', ']'];

/// Escape `-`, `[` and `]` in a page path for use inside a route pattern.
///
/// - `"/p-get-static-props"` → `"/p\-get\-static\-props"`
/// - `"/posts/[postId]"` → `"/posts/\[postId\]"`
pub fn escape_route_path(path: &str) -> String {
    escape_chars(path, ROUTE_PATH_SPECIALS)
}

/// Escape hyphens only.
///
/// Prerendered page paths never carry brackets (they are concrete paths, not
/// dynamic page names), so only hyphens are escaped for them.
pub fn escape_hyphens(path: &str) -> String {
    escape_chars(path, &['-'])
}

/// Un-escape every `\-`, then escape every `-`.
pub fn normalize_data_route_regex(regex: &str) -> String {
    regex.replace("\\-", "-").replace('-', "\\-")
}

/// Escape a build id so it can be embedded in a regular expression.
pub fn escape_build_id(build_id: &str) -> String {
    regex::escape(build_id)
}

fn escape_chars(input: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut after_backslash = false;
    for c in input.chars() {
        if after_backslash {
            out.push(c);
            after_backslash = false;
            continue;
        }
        if c == '\\' {
            after_backslash = true;
        } else if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
