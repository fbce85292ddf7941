//! Parallel probe fanout and category grouping.

use std::collections::HashMap;
use tokio::task::JoinSet;

use crate::config::FleetConfig;
use crate::probe::{self, ProbeResult};

/// Probe every server in `cfg` concurrently. The i-th result always
/// corresponds to `cfg.servers[i]`: each probe task is tagged with its
/// input index and writes into a pre-sized slot vector, so completion
/// order never affects output order.
pub async fn aggregate(client: &reqwest::Client, cfg: &FleetConfig) -> Vec<ProbeResult> {
    let mut probes = JoinSet::new();
    for (index, entry) in cfg.servers.iter().enumerate() {
        let client = client.clone();
        let entry = entry.clone();
        probes.spawn(async move { (index, probe::probe(&client, &entry).await) });
    }

    let mut slots: Vec<Option<ProbeResult>> = vec![None; cfg.servers.len()];
    while let Some(joined) = probes.join_next().await {
        if let Ok((index, result)) = joined {
            slots[index] = Some(result);
        }
    }
    // A slot left empty by an aborted or panicked task degrades to the
    // offline sentinel; the cycle still publishes.
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.unwrap_or_else(|| ProbeResult::offline(&cfg.servers[index])))
        .collect()
}

/// One category of the published layout, in `category_order` order.
#[derive(Debug)]
pub struct CategoryGroup<'a> {
    pub name: &'a str,
    pub emoji: &'a str,
    pub results: Vec<&'a ProbeResult>,
}

/// Single pass over ordered results into the layout groups. Empty
/// categories are kept; duplicate names in `category_order` collapse to
/// their first occurrence.
pub fn group_by_category<'a>(
    cfg: &'a FleetConfig,
    results: &'a [ProbeResult],
) -> Vec<CategoryGroup<'a>> {
    let mut groups: Vec<CategoryGroup<'a>> = Vec::with_capacity(cfg.category_order.len());
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for name in &cfg.category_order {
        if index_of.contains_key(name.as_str()) {
            continue;
        }
        index_of.insert(name.as_str(), groups.len());
        groups.push(CategoryGroup {
            name: name.as_str(),
            emoji: cfg
                .category_emojis
                .get(name)
                .map(String::as_str)
                .unwrap_or(""),
            results: Vec::new(),
        });
    }
    for result in results {
        if let Some(&i) = index_of.get(result.category.as_str()) {
            groups[i].results.push(result);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerEntry, parse_and_validate};

    fn fixture_config() -> FleetConfig {
        parse_and_validate(
            &serde_json::json!({
                "server_ip": "10.0.0.1",
                "update_interval": 30,
                "category_order": ["Drift", "Race", "Empty"],
                "category_emojis": {"Drift": "🟣", "Race": "🏁", "Empty": "⬜"},
                "servers": [
                    {"name": "D1", "port": 8081, "category": "Drift"},
                    {"name": "R1", "port": 8082, "category": "Race"},
                    {"name": "D2", "port": 8083, "category": "Drift"}
                ]
            })
            .to_string(),
        )
        .expect("fixture config must validate")
    }

    fn offline(name: &str, category: &str) -> ProbeResult {
        ProbeResult::offline(&ServerEntry {
            name: name.to_owned(),
            port: 8081,
            category: category.to_owned(),
            resolved_host: "10.0.0.1".to_owned(),
        })
    }

    #[test]
    fn grouping_follows_category_order_and_keeps_empty_categories() {
        let cfg = fixture_config();
        let results = vec![
            offline("D1", "Drift"),
            offline("R1", "Race"),
            offline("D2", "Drift"),
        ];
        let groups = group_by_category(&cfg, &results);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "Drift");
        assert_eq!(groups[0].results.len(), 2);
        assert_eq!(groups[0].results[0].name, "D1");
        assert_eq!(groups[0].results[1].name, "D2");
        assert_eq!(groups[1].results.len(), 1);
        assert_eq!(groups[2].name, "Empty");
        assert!(groups[2].results.is_empty());
    }

    #[test]
    fn duplicate_category_names_collapse_to_first_occurrence() {
        let mut cfg = fixture_config();
        cfg.category_order = vec!["Drift".to_owned(), "Drift".to_owned()];
        let results = vec![offline("D1", "Drift")];
        let groups = group_by_category(&cfg, &results);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].results.len(), 1);
    }
}
