//! Search providers for the CLI and TUI.
//!
//! All providers share one contract: an empty query matches everything, and
//! only the configured fields are inspected.

use regex::{Regex, RegexBuilder};

use crate::notification::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Message,
    Session,
    Window,
    Pane,
    Level,
    State,
}

impl SearchField {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "message" => Some(SearchField::Message),
            "session" => Some(SearchField::Session),
            "window" => Some(SearchField::Window),
            "pane" => Some(SearchField::Pane),
            "level" => Some(SearchField::Level),
            "state" => Some(SearchField::State),
            _ => None,
        }
    }

    fn value<'a>(&self, notification: &'a Notification) -> &'a str {
        match self {
            SearchField::Message => &notification.message,
            SearchField::Session => {
                if notification.session_name.is_empty() {
                    &notification.session
                } else {
                    &notification.session_name
                }
            }
            SearchField::Window => &notification.window,
            SearchField::Pane => &notification.pane,
            SearchField::Level => notification.level.as_str(),
            SearchField::State => notification.state.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_insensitive: bool,
    pub fields: Vec<SearchField>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            fields: vec![
                SearchField::Message,
                SearchField::Session,
                SearchField::Window,
                SearchField::Pane,
            ],
        }
    }
}

pub trait SearchProvider: Send + Sync {
    fn matches(&self, notification: &Notification, query: &str) -> bool;
    fn name(&self) -> &'static str;
}

/// Plain substring match against any configured field.
#[derive(Debug, Clone, Default)]
pub struct SubstringSearch {
    options: SearchOptions,
}

impl SubstringSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }
}

impl SearchProvider for SubstringSearch {
    fn matches(&self, notification: &Notification, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = fold(query, self.options.case_insensitive);
        self.options
            .fields
            .iter()
            .any(|field| fold(field.value(notification), self.options.case_insensitive).contains(&needle))
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Every whitespace-separated token must appear in some configured field.
#[derive(Debug, Clone, Default)]
pub struct TokenSearch {
    options: SearchOptions,
}

impl TokenSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }
}

impl SearchProvider for TokenSearch {
    fn matches(&self, notification: &Notification, query: &str) -> bool {
        let haystacks: Vec<String> = self
            .options
            .fields
            .iter()
            .map(|field| fold(field.value(notification), self.options.case_insensitive))
            .collect();
        query.split_whitespace().all(|token| {
            let token = fold(token, self.options.case_insensitive);
            haystacks.iter().any(|haystack| haystack.contains(&token))
        })
    }

    fn name(&self) -> &'static str {
        "token"
    }
}

/// Regular-expression search. Queries that fail to compile match nothing.
#[derive(Debug, Clone, Default)]
pub struct RegexSearch {
    options: SearchOptions,
}

impl RegexSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    fn compile(&self, query: &str) -> Option<Regex> {
        RegexBuilder::new(query)
            .case_insensitive(self.options.case_insensitive)
            .build()
            .ok()
    }
}

impl SearchProvider for RegexSearch {
    fn matches(&self, notification: &Notification, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let Some(pattern) = self.compile(query) else {
            return false;
        };
        self.options
            .fields
            .iter()
            .any(|field| pattern.is_match(field.value(notification)))
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// Keeps the notifications matching `query`, in input order.
pub fn search_notifications(
    notifications: Vec<Notification>,
    provider: &dyn SearchProvider,
    query: &str,
) -> Vec<Notification> {
    if query.is_empty() {
        return notifications;
    }
    notifications
        .into_iter()
        .filter(|notification| provider.matches(notification, query))
        .collect()
}

fn fold(value: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationLevel, NotificationState};

    fn notification(id: u64, message: &str, session_name: &str) -> Notification {
        Notification {
            id,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            state: NotificationState::Active,
            session: "$1".to_string(),
            session_name: session_name.to_string(),
            window: "@1".to_string(),
            pane: "%1".to_string(),
            message: message.to_string(),
            pane_created: String::new(),
            level: NotificationLevel::Error,
            read_timestamp: String::new(),
        }
    }

    fn sample() -> Vec<Notification> {
        vec![
            notification(1, "Build FAILED on main", "work"),
            notification(2, "tests passed", "play"),
            notification(3, "deploy failed: timeout", "work"),
        ]
    }

    fn ids(notifications: &[Notification]) -> Vec<u64> {
        notifications.iter().map(|n| n.id).collect()
    }

    #[test]
    fn substring_respects_case_option() {
        let sensitive = SubstringSearch::default();
        assert_eq!(ids(&search_notifications(sample(), &sensitive, "failed")), vec![3]);

        let insensitive = SubstringSearch::new(SearchOptions {
            case_insensitive: true,
            ..SearchOptions::default()
        });
        assert_eq!(ids(&search_notifications(sample(), &insensitive, "failed")), vec![1, 3]);
    }

    #[test]
    fn session_field_prefers_resolved_name() {
        let provider = SubstringSearch::new(SearchOptions {
            case_insensitive: false,
            fields: vec![SearchField::Session],
        });
        assert_eq!(ids(&search_notifications(sample(), &provider, "play")), vec![2]);
    }

    #[test]
    fn token_search_requires_every_token() {
        let provider = TokenSearch::new(SearchOptions {
            case_insensitive: true,
            ..SearchOptions::default()
        });
        assert_eq!(ids(&search_notifications(sample(), &provider, "failed main")), vec![1]);
    }

    #[test]
    fn regex_search_and_invalid_patterns() {
        let provider = RegexSearch::default();
        assert_eq!(ids(&search_notifications(sample(), &provider, "^(tests|deploy)")), vec![2, 3]);
        assert!(search_notifications(sample(), &provider, "([unclosed").is_empty());
    }

    #[test]
    fn level_and_state_fields_are_opt_in() {
        let default_fields = SubstringSearch::default();
        assert!(search_notifications(sample(), &default_fields, "error").is_empty());

        let with_level = SubstringSearch::new(SearchOptions {
            case_insensitive: false,
            fields: vec![SearchField::Level, SearchField::State],
        });
        assert_eq!(search_notifications(sample(), &with_level, "error").len(), 3);
        assert_eq!(search_notifications(sample(), &with_level, "active").len(), 3);
    }

    #[test]
    fn empty_query_matches_everything() {
        assert_eq!(search_notifications(sample(), &RegexSearch::default(), "").len(), 3);
        assert_eq!(search_notifications(sample(), &TokenSearch::default(), "").len(), 3);
    }
}
