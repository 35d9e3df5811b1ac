use crate::output::{print_json, print_table};
use bach_core::config::BachConfig;
use bach_core::PluginRegistry;

pub fn run(config: &BachConfig, json: bool) -> anyhow::Result<()> {
    let registry = PluginRegistry::from_config(config)?;

    let areas: Vec<(String, String)> = registry
        .area_names()
        .into_iter()
        .map(|name| {
            let default_actor = registry
                .area(name)
                .ok()
                .and_then(|a| a.default_actor.clone())
                .unwrap_or_default();
            (name.to_string(), default_actor)
        })
        .collect();

    if json {
        print_json(&serde_json::json!({
            "areas": areas
                .iter()
                .map(|(name, actor)| serde_json::json!({"name": name, "default_actor": actor}))
                .collect::<Vec<_>>(),
            "actors": registry.actor_names(),
            "notifiers": registry.notifier_names(),
            "fetchers": registry.fetcher_names(),
            "rule_sources": registry.enricher_names(),
        }))?;
        return Ok(());
    }

    let mut rows: Vec<Vec<String>> = areas
        .into_iter()
        .map(|(name, actor)| vec!["area".to_string(), name, actor])
        .collect();
    for (kind, names) in [
        ("actor", registry.actor_names()),
        ("notifier", registry.notifier_names()),
        ("fetcher", registry.fetcher_names()),
        ("rule source", registry.enricher_names()),
    ] {
        rows.extend(
            names
                .into_iter()
                .map(|n| vec![kind.to_string(), n.to_string(), String::new()]),
        );
    }
    print_table(&["KIND", "NAME", "DEFAULT ACTOR"], rows);
    Ok(())
}
