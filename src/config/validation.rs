use log::{error, warn};
use url::Url;

use crate::config::settings::PortalConfig;

/// Outcome of structural validation. Errors mark entries the portal cannot
/// use; warnings mark entries that render degraded. Validation never aborts
/// a load, the caller decides what to do with the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn log(&self) {
        for e in &self.errors {
            error!("Config validation: {}", e);
        }
        for w in &self.warnings {
            warn!("Config validation: {}", w);
        }
    }
}

pub fn validate(config: &PortalConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    let categories = match &config.categories {
        Some(categories) => categories,
        None => {
            report
                .errors
                .push("configuration has no 'categories' list".to_string());
            return report;
        }
    };

    for (idx, category) in categories.iter().enumerate() {
        let label = category
            .name
            .clone()
            .unwrap_or_else(|| format!("category #{}", idx + 1));

        if category.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            report
                .errors
                .push(format!("category #{} has no name", idx + 1));
        }

        if let Some(feed) = &category.rss_feed {
            if Url::parse(feed).is_err() {
                report
                    .errors
                    .push(format!("'{}' has an invalid rss_feed URL: {}", label, feed));
            }
        }

        match &category.links {
            Some(links) => {
                for (link_idx, link) in links.iter().enumerate() {
                    if link.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                        report.errors.push(format!(
                            "'{}' link #{} has no url",
                            label,
                            link_idx + 1
                        ));
                    }
                    if link.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
                        report.warnings.push(format!(
                            "'{}' link #{} has no title",
                            label,
                            link_idx + 1
                        ));
                    }
                }
            }
            None => {
                if category.rss_feed.is_none() {
                    report.warnings.push(format!(
                        "'{}' has neither links nor an rss_feed",
                        label
                    ));
                }
            }
        }
    }

    if let Some(feed) = &config.rss_feed {
        if Url::parse(feed).is_err() {
            report
                .errors
                .push(format!("invalid main rss_feed URL: {}", feed));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{CategoryConfig, LinkEntry};
    use pretty_assertions::assert_eq;

    fn named_category(name: &str) -> CategoryConfig {
        CategoryConfig {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_categories_is_an_error() {
        let config = PortalConfig::default();
        let report = validate(&config);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_clean_config_passes() {
        let mut category = named_category("Tools");
        category.links = Some(vec![LinkEntry {
            title: Some("Dash".to_string()),
            url: Some("https://dash.example.com".to_string()),
            icon: None,
        }]);
        let config = PortalConfig {
            rss_feed: Some("https://news.example.com/rss.xml".to_string()),
            categories: Some(vec![category]),
            ..Default::default()
        };

        let report = validate(&config);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_unnamed_category_is_an_error() {
        let config = PortalConfig {
            categories: Some(vec![CategoryConfig::default()]),
            ..Default::default()
        };
        let report = validate(&config);
        assert!(report.errors.iter().any(|e| e.contains("has no name")));
    }

    #[test]
    fn test_invalid_feed_url_is_an_error() {
        let mut category = named_category("News");
        category.rss_feed = Some("not a url".to_string());
        let config = PortalConfig {
            categories: Some(vec![category]),
            ..Default::default()
        };
        let report = validate(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("invalid rss_feed URL")));
    }

    #[test]
    fn test_invalid_main_feed_url_is_an_error() {
        let mut category = named_category("News");
        category.rss_feed = Some("https://news.example.com/feed.xml".to_string());
        let config = PortalConfig {
            rss_feed: Some("not a url".to_string()),
            categories: Some(vec![category]),
            ..Default::default()
        };

        let report = validate(&config);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("main rss_feed"));
    }

    #[test]
    fn test_link_without_url_is_an_error_without_title_a_warning() {
        let mut category = named_category("Tools");
        category.links = Some(vec![
            LinkEntry {
                title: Some("No url".to_string()),
                url: None,
                icon: None,
            },
            LinkEntry {
                title: None,
                url: Some("https://ok.example.com".to_string()),
                icon: None,
            },
        ]);
        let config = PortalConfig {
            categories: Some(vec![category]),
            ..Default::default()
        };

        let report = validate(&config);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("has no url"));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("has no title"));
    }

    #[test]
    fn test_empty_category_is_a_warning() {
        let config = PortalConfig {
            categories: Some(vec![named_category("Empty")]),
            ..Default::default()
        };
        let report = validate(&config);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("neither links nor an rss_feed")));
    }
}
