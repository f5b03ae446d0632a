use crate::config::TargetAliases;

/// Key for targets whose URL carries no host name at all.
pub const UNKNOWN_TARGET: &str = "unknown";

/// Derive the short target key of a ticket system instance from its URL.
///
/// The key is based on the first label of the host name. Labels with a `-` keep only the part
/// after the last `-`, all others go through the substring replacements. Whole key renames are
/// applied last. The same URL always yields the same key.
pub fn target_key(url: &str, aliases: &TargetAliases) -> String {
    let label = first_host_label(url).to_lowercase();

    let key = match label.rsplit_once('-') {
        Some((_, tail)) => tail.to_string(),
        None => aliases
            .replace
            .iter()
            .fold(label, |acc, (from, to)| acc.replace(from.as_str(), to)),
    };
    let key = if key.is_empty() {
        UNKNOWN_TARGET.to_string()
    } else {
        key
    };

    aliases.rename.get(&key).cloned().unwrap_or(key)
}

fn first_host_label(url: &str) -> &str {
    let url = url.trim();
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    host.split([':', '.']).next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> String {
        target_key(url, &TargetAliases::default())
    }

    #[test]
    fn test_should_replace_known_codename() {
        assert_eq!(key("https://jiraabcd.example.com"), "prod");
    }

    #[test]
    fn test_should_keep_suffix_of_dashed_label() {
        assert_eq!(key("https://jira-test.example.com"), "test");
        assert_eq!(key("https://jiraabcd-staging.example.com"), "staging");
    }

    #[test]
    fn test_should_rename_internal_codenames() {
        assert_eq!(key("https://154.example.net"), "cloud-prod");
        assert_eq!(key("https://dilettant.atlassian.net"), "cloud-ref");
    }

    #[test]
    fn test_should_ignore_case_credentials_port_and_path() {
        assert_eq!(key("HTTPS://probe@JiraABCD.Example.com:8443/rest/api"), "prod");
        assert_eq!(key("http://jira-ref:8080"), "ref");
    }

    #[test]
    fn test_should_accept_url_without_scheme() {
        assert_eq!(key("jiraabcd.example.com"), "prod");
        assert_eq!(key("tracker"), "tracker");
    }

    #[test]
    fn test_should_map_missing_host_to_unknown() {
        assert_eq!(key(""), UNKNOWN_TARGET);
        assert_eq!(key("https://"), UNKNOWN_TARGET);
        assert_eq!(key("https://jira-.example.com"), UNKNOWN_TARGET);
    }

    #[test]
    fn test_should_be_pure() {
        let url = "https://jira-test.example.com";
        assert_eq!(key(url), key(url));
    }

    #[test]
    fn test_should_use_configured_rules() {
        let aliases = TargetAliases {
            replace: Default::default(),
            rename: [("jiraabcd".to_string(), "main".to_string())].into(),
        };
        assert_eq!(target_key("https://jiraabcd.example.com", &aliases), "main");
    }
}
