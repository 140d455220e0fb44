//! Plain-text rendering of catalog views.

use catalog_core::{CatalogEntry, CatalogView, describe_load_error};
use catalog_types::AppState;

pub(crate) const LOADING_MESSAGE: &str =
    "Demo is loading... This process may take 2 to 3 minutes.";
pub(crate) const LOADING_APPS: &str = "Loading apps...";
pub(crate) const NO_APPS: &str = "No apps available.";

/// `sales-forecast_v2` -> `Sales Forecast V2`.
pub(crate) fn display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        let ch = if ch == '-' || ch == '_' { ' ' } else { ch };
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

pub(crate) fn badge(state: AppState) -> &'static str {
    match state {
        AppState::On => "[on]     ",
        AppState::Loading => "[loading]",
        AppState::Off => "[off]    ",
    }
}

pub(crate) fn entry_line(entry: &CatalogEntry) -> String {
    let mut line = format!("{} {}", badge(entry.state), display_name(entry.name()));
    if let Some(description) = entry
        .app
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        line.push_str(" - ");
        line.push_str(description);
    }
    match entry.state {
        AppState::On => {
            if let Some(url) = entry.launch_url() {
                line.push_str(" <");
                line.push_str(url);
                line.push('>');
            }
        }
        AppState::Loading => {
            line.push_str("\n          ");
            line.push_str(LOADING_MESSAGE);
        }
        AppState::Off => {}
    }
    line
}

/// Full listing of a view, one line (or two, while loading) per app.
pub(crate) fn catalog_lines(view: &CatalogView, config_hint: &str) -> Vec<String> {
    if !view.loaded {
        return vec![LOADING_APPS.to_string()];
    }
    if let Some(err) = &view.load_error {
        return vec![describe_load_error(err, config_hint)];
    }
    if view.entries.is_empty() {
        return vec![NO_APPS.to_string()];
    }
    view.entries.iter().map(entry_line).collect()
}

/// One line per app whose state differs between two views.
pub(crate) fn transitions(previous: &CatalogView, next: &CatalogView) -> Vec<String> {
    next.entries
        .iter()
        .filter_map(|entry| {
            let before = previous.state(entry.name());
            if before == Some(entry.state) {
                return None;
            }
            let name = display_name(entry.name());
            Some(match before {
                Some(before) => format!("{name}: {before} -> {}", entry.state),
                None => format!("{name}: {}", entry.state),
            })
        })
        .collect()
}
