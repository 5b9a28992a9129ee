//! Query string parsing.
//!
//! Every key is checked against the resource's declarations; violations are
//! collected so one malformed error can name all of them at once.

use std::collections::BTreeMap;

use rsdispatch_domain::{Action, ListParameters, ResourceDescriptor};

const LIST_KEYS: [&str; 8] = [
    "offset",
    "limit",
    "sort",
    "direction",
    "search",
    "filter",
    "_embed",
    "_reference",
];
const ENTITY_KEYS: [&str; 2] = ["_embed", "_reference"];

/// Validated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub list: ListParameters,
    pub embeds: Vec<String>,
    pub references: Vec<String>,
}

/// Decodes a raw query string into pairs.
pub fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    })
    .unwrap_or_default()
}

struct Offences(Vec<String>);

impl Offences {
    fn add(&mut self, key: &str) {
        if !self.0.iter().any(|k| k == key) {
            self.0.push(key.to_string());
        }
    }
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn nested_group(
    value: &str,
    allowed: &std::collections::BTreeSet<String>,
) -> Option<BTreeMap<String, String>> {
    let mut group = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(value.as_bytes()) {
        if !allowed.contains(&*key) {
            return None;
        }
        group.insert(key.into_owned(), value.into_owned());
    }
    Some(group)
}

/// Validates `pairs` for `action` on `descriptor`.
///
/// Returns the offending keys, in first-seen order, on failure.
pub fn parse_query(
    pairs: &[(String, String)],
    descriptor: &ResourceDescriptor,
    action: Action,
) -> Result<ParsedQuery, Vec<String>> {
    let rules = descriptor.list_rules();
    let allowed: &[&str] = if action == Action::List {
        &LIST_KEYS
    } else {
        &ENTITY_KEYS
    };

    let mut offences = Offences(Vec::new());
    let mut values: BTreeMap<&str, &str> = BTreeMap::new();
    for (key, value) in pairs {
        if allowed.contains(&key.as_str()) {
            values.insert(key.as_str(), value.as_str());
        } else {
            offences.add(key);
        }
    }

    let mut list = ListParameters::from_rules(rules);

    if let Some(offset) = values.get("offset") {
        match offset.trim().parse::<u64>() {
            Ok(offset) => list.offset = offset,
            Err(_) => offences.add("offset"),
        }
    }

    if let Some(limit) = values.get("limit") {
        match limit.trim().parse::<u64>() {
            Ok(limit) if limit > 0 => list.limit = limit,
            _ => offences.add("limit"),
        }
    }

    let sort_keys = values.get("sort").map(|v| comma_list(v));
    let directions = values.get("direction").map(|v| comma_list(v));
    if sort_keys.is_some() || directions.is_some() {
        let keys = sort_keys.unwrap_or_else(|| vec![rules.default_sort_key.clone()]);
        let directions = directions.unwrap_or_default();

        if keys.is_empty() || directions.len() > keys.len() {
            offences.add(if keys.is_empty() { "sort" } else { "direction" });
        } else {
            let mut sort_data = Vec::with_capacity(keys.len());
            for (index, key) in keys.iter().enumerate() {
                let Some(default_direction) = rules.default_direction(key) else {
                    offences.add("sort");
                    continue;
                };
                let direction = directions
                    .get(index)
                    .map(String::as_str)
                    .unwrap_or(default_direction);
                if !rules.allows_direction(key, direction) {
                    offences.add("direction");
                    continue;
                }
                sort_data.push((key.clone(), direction.to_string()));
            }
            list.sort_data = sort_data;
        }
    }

    if let Some(search) = values.get("search") {
        match nested_group(search, &rules.search) {
            Some(group) => list.search_data = group,
            None => offences.add("search"),
        }
    }

    if let Some(filter) = values.get("filter") {
        match nested_group(filter, &rules.filter) {
            Some(group) => list.filter_data = group,
            None => offences.add("filter"),
        }
    }

    let mut embeddable = |key: &str| -> Vec<String> {
        let names = values.get(key).map(|v| comma_list(v)).unwrap_or_default();
        if names.iter().any(|n| !descriptor.embeds().contains(n)) {
            offences.add(key);
        }
        names
    };
    let embeds = embeddable("_embed");
    let references = embeddable("_reference");

    if offences.0.is_empty() {
        Ok(ParsedQuery {
            list,
            embeds,
            references,
        })
    } else {
        Err(offences.0)
    }
}
