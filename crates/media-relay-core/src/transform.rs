//! Caption transform pipeline.
//!
//! Captions are rewritten by an ordered list of literal replacement rules
//! and an optional override caption appended at the end. Rules run one
//! after another over the intermediate text, so a later rule can match
//! text produced by an earlier one.

/// Separator placed between the rewritten caption and the override text.
pub const OVERRIDE_SEPARATOR: &str = "\n\n";

/// Ordered `old -> new` literal replacement rules.
///
/// Insertion order is significant. Setting a rule for an `old` text that is
/// already present updates it in place and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementRules {
    rules: Vec<(String, String)>,
}

impl ReplacementRules {
    /// Creates an empty rule set.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule, or updates the replacement of an existing one.
    pub fn upsert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        let old = old.into();
        let new = new.into();
        if let Some(slot) = self.rules.iter_mut().find(|(o, _)| *o == old) {
            slot.1 = new;
        } else {
            self.rules.push((old, new));
        }
    }

    /// Removes every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over rules in application order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(o, n)| (o.as_str(), n.as_str()))
    }
}

impl<O: Into<String>, N: Into<String>> FromIterator<(O, N)> for ReplacementRules {
    fn from_iter<I: IntoIterator<Item = (O, N)>>(iter: I) -> Self {
        let mut rules = Self::new();
        for (old, new) in iter {
            rules.upsert(old, new);
        }
        rules
    }
}

/// Renders the final caption for one relayed item.
///
/// ```
/// use media_relay_core::transform::{render, ReplacementRules};
///
/// let rules: ReplacementRules = [("a", "b"), ("b", "c")].into_iter().collect();
/// assert_eq!(render("a", &rules, None), "c");
/// assert_eq!(render("", &ReplacementRules::new(), Some("Sig")), "Sig");
/// ```
#[must_use]
pub fn render(original: &str, rules: &ReplacementRules, override_caption: Option<&str>) -> String {
    let mut text = original.to_string();
    for (old, new) in rules.iter() {
        // An empty pattern would insert `new` between every character.
        if old.is_empty() {
            continue;
        }
        if text.contains(old) {
            text = text.replace(old, new);
        }
    }

    match override_caption {
        Some(extra) if !extra.is_empty() => {
            if text.is_empty() {
                extra.to_string()
            } else {
                format!("{text}{OVERRIDE_SEPARATOR}{extra}").trim().to_string()
            }
        }
        _ => text,
    }
}

/// Turns a rendered caption into the optional caption field of a send call.
///
/// An empty caption is omitted rather than sent as an empty string.
#[must_use]
pub fn caption_field(rendered: String) -> Option<String> {
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}
