//! Case-insensitive substring search over configured links.

use log::debug;

use crate::config::settings::PortalConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub category: String,
    pub title: String,
    pub url: String,
}

/// Match `term` against link titles and URLs. A blank term matches every
/// link. When the search feature is explicitly disabled the term is ignored
/// and the full listing comes back, as if no filter existed.
pub fn search_links(config: &PortalConfig, term: &str) -> Vec<SearchHit> {
    let needle = if config.features.search_enabled == Some(false) {
        debug!("Search is disabled by configuration, listing every link");
        String::new()
    } else {
        term.trim().to_lowercase()
    };
    let mut hits = Vec::new();
    for category in config.categories() {
        for link in category.links.as_deref().unwrap_or(&[]) {
            let title = link.title.as_deref().unwrap_or("");
            let url = link.url.as_deref().unwrap_or("");
            if needle.is_empty()
                || title.to_lowercase().contains(&needle)
                || url.to_lowercase().contains(&needle)
            {
                hits.push(SearchHit {
                    category: category.display_name().to_string(),
                    title: title.to_string(),
                    url: url.to_string(),
                });
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_from(yaml: &str) -> PortalConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const LINKS: &str = r#"
categories:
  - name: Tools
    links:
      - title: Grafana Dashboard
        url: https://grafana.example.com
      - title: Wiki
        url: https://wiki.example.com
  - name: News
    rss_feed: https://example.com/feed.xml
"#;

    #[test]
    fn test_matches_title_case_insensitively() {
        let hits = search_links(&config_from(LINKS), "GRAFANA");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "Tools");
        assert_eq!(hits[0].title, "Grafana Dashboard");
    }

    #[test]
    fn test_matches_url_text() {
        let hits = search_links(&config_from(LINKS), "wiki.example");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Wiki");
    }

    #[test]
    fn test_blank_term_lists_every_link() {
        let hits = search_links(&config_from(LINKS), "   ");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_disabled_feature_ignores_the_term() {
        let yaml = format!("features:\n  search_enabled: false\n{}", LINKS);
        let hits = search_links(&config_from(&yaml), "wiki");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert_eq!(search_links(&config_from(LINKS), "nonexistent"), Vec::new());
    }
}
