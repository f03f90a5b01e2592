use super::table::{NativeRule, RedirectTarget, ResourceType, RuleAction, RuleCondition};
use crate::store::types::RuleId;

/// Builds the redirect rule for one blocked url.
///
/// The url is already normalized (host[+path], no scheme), so the filter
/// anchors on either scheme and tolerates a leading `www.`. Only top-level
/// navigations are matched; subresource loads pass through.
pub fn build_redirect_rule(id: RuleId, url: &str, block_page_url: &str) -> NativeRule {
    let regex_filter = format!("^https?://(www\\.)?{}", escape_regex(url));
    NativeRule {
        id,
        priority: 1,
        action: RuleAction::Redirect {
            redirect: RedirectTarget {
                url: block_page_url.to_string(),
            },
        },
        condition: RuleCondition {
            regex_filter,
            resource_types: vec![ResourceType::MainFrame],
        },
    }
}

/// Escapes regex metacharacters so the url is matched literally.
fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '-' | '/' | '\\' | '^' | '$' | '*' | '+' | '?' | '.' | '(' | ')' | '|' | '[' | ']'
                | '{' | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
