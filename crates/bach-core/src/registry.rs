//! Name → plugin lookup for areas, actors, notifiers, fetchers and
//! enrichers.
//!
//! A registry is populated once at startup and never changes afterwards;
//! concurrent pipelines share it behind an `Arc`.

use crate::actor::{Actor, DryRunMutateClient, ExclusionActor, ExclusionKind};
use crate::config::BachConfig;
use crate::enricher::{youtube_channel_enricher, youtube_video_enricher, Enricher};
use crate::error::{BachError, Result};
use crate::fetcher::{ClientFetcher, Fetcher, FileFetcher, HttpReportClient, ReportClient};
use crate::notifier::{
    ConsoleNotifier, LogNotifier, Notifier, WebhookNotifier, CONSOLE_CHANNEL,
};
use crate::params::Params;
use crate::query::{keyword_template, placement_template, require_fields, QueryTemplate};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type NotifierFactory = Arc<dyn Fn(&Params) -> Result<Arc<dyn Notifier>> + Send + Sync>;
pub type FetcherFactory = Arc<dyn Fn(&Params) -> Result<Arc<dyn Fetcher>> + Send + Sync>;

/// Fetcher used when a pipeline names none.
pub const DEFAULT_FETCHER: &str = "ads";

#[derive(Clone)]
pub struct AreaDefinition {
    pub name: String,
    pub template: Arc<dyn QueryTemplate>,
    /// Actor `play` uses for this area.
    pub default_actor: Option<String>,
    /// Parameters applied beneath the caller's.
    pub defaults: Params,
}

pub struct PluginRegistry {
    areas: BTreeMap<String, AreaDefinition>,
    actors: BTreeMap<String, Arc<dyn Actor>>,
    notifiers: BTreeMap<String, NotifierFactory>,
    fetchers: BTreeMap<String, FetcherFactory>,
    enrichers: BTreeMap<String, Arc<dyn Enricher>>,
}

fn unknown<T>(kind: &str, name: &str, available: impl Iterator<Item = T>) -> BachError
where
    T: AsRef<str>,
{
    let names: Vec<String> = available.map(|n| n.as_ref().to_string()).collect();
    let listed = if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    };
    BachError::Configuration(format!("unknown {kind} '{name}' (available: {listed})"))
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Built-in plugins with default configuration.
    pub fn builtin() -> Result<Self> {
        Self::from_config(&BachConfig::default())
    }

    /// Built-in plugins wired to `config`: the `ads` fetcher talks to
    /// `report_endpoint`, the YouTube rule sources to `enrichment_endpoint`,
    /// HTTP plugins use `http_timeout_secs`, and `area_defaults` become area
    /// parameters.
    pub fn from_config(config: &BachConfig) -> Result<Self> {
        let timeout = config.http_timeout();
        let endpoint = config.report_endpoint.clone();
        let mutate = Arc::new(DryRunMutateClient);
        let defaults = |area: &str| config.area_defaults.get(area).cloned().unwrap_or_default();

        let mut builder = Self::builder()
            .area_with_defaults(
                "placement",
                placement_template()?,
                Some("placement_exclusion"),
                defaults("placement"),
            )
            .area_with_defaults(
                "keyword",
                keyword_template()?,
                Some("keyword_exclusion"),
                defaults("keyword"),
            )
            .actor(ExclusionActor::new(ExclusionKind::Placement, mutate.clone()))
            .actor(ExclusionActor::new(ExclusionKind::Keyword, mutate))
            .notifier(CONSOLE_CHANNEL, |p| Ok(Arc::new(ConsoleNotifier::from_params(p)?)))
            .notifier("log", |_| Ok(Arc::new(LogNotifier)))
            .notifier("webhook", move |p| {
                Ok(Arc::new(WebhookNotifier::from_params(p, timeout)?))
            })
            .fetcher("file", |p| {
                let path = p.get("path").ok_or_else(|| {
                    BachError::Configuration("file fetcher requires a 'path' parameter".into())
                })?;
                Ok(Arc::new(FileFetcher::new(path)))
            })
            .fetcher(DEFAULT_FETCHER, move |p| {
                let url = p.get("endpoint").cloned().or_else(|| endpoint.clone()).ok_or_else(|| {
                    BachError::Configuration(
                        "ads fetcher needs report_endpoint in config or an 'endpoint' parameter"
                            .into(),
                    )
                })?;
                Ok(Arc::new(ClientFetcher::new(HttpReportClient::new(url, timeout)?)))
            });

        if let Some(url) = &config.enrichment_endpoint {
            match HttpReportClient::new(url.clone(), timeout) {
                Ok(client) => {
                    let client: Arc<dyn ReportClient> = Arc::new(client);
                    builder = builder
                        .enricher(youtube_channel_enricher(client.clone()))
                        .enricher(youtube_video_enricher(client));
                }
                Err(e) => tracing::warn!(error = %e, "enrichment sources disabled"),
            }
        }

        for area in config.area_defaults.keys() {
            if !builder.areas.contains_key(area) {
                tracing::warn!(area = %area, "area_defaults names an unknown area");
            }
        }
        builder.build()
    }

    pub fn area(&self, name: &str) -> Result<&AreaDefinition> {
        self.areas
            .get(name)
            .ok_or_else(|| unknown("area", name, self.areas.keys()))
    }

    pub fn actor(&self, name: &str) -> Result<Arc<dyn Actor>> {
        self.actors
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("actor", name, self.actors.keys()))
    }

    /// Build the named channel from `params`; bad params fail here, not at send time.
    pub fn notifier(&self, name: &str, params: &Params) -> Result<Arc<dyn Notifier>> {
        let factory = self
            .notifiers
            .get(name)
            .ok_or_else(|| unknown("notifier", name, self.notifiers.keys()))?;
        factory(params)
    }

    pub fn fetcher(&self, name: &str, params: &Params) -> Result<Arc<dyn Fetcher>> {
        let factory = self
            .fetchers
            .get(name)
            .ok_or_else(|| unknown("fetcher", name, self.fetchers.keys()))?;
        factory(params)
    }

    /// Enricher serving the rule source `source` (case-insensitive).
    pub fn enricher(&self, source: &str) -> Result<Arc<dyn Enricher>> {
        self.enrichers
            .get(&source.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| unknown("rule source", source, self.enrichers.keys()))
    }

    pub fn area_names(&self) -> Vec<&str> {
        self.areas.keys().map(String::as_str).collect()
    }

    pub fn actor_names(&self) -> Vec<&str> {
        self.actors.keys().map(String::as_str).collect()
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.keys().map(String::as_str).collect()
    }

    pub fn fetcher_names(&self) -> Vec<&str> {
        self.fetchers.keys().map(String::as_str).collect()
    }

    pub fn enricher_names(&self) -> Vec<&str> {
        self.enrichers.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RegistryBuilder {
    areas: BTreeMap<String, AreaDefinition>,
    actors: BTreeMap<String, Arc<dyn Actor>>,
    notifiers: BTreeMap<String, NotifierFactory>,
    fetchers: BTreeMap<String, FetcherFactory>,
    enrichers: BTreeMap<String, Arc<dyn Enricher>>,
}

impl RegistryBuilder {
    pub fn area(
        self,
        name: &str,
        template: impl QueryTemplate + 'static,
        default_actor: Option<&str>,
    ) -> Self {
        self.area_with_defaults(name, template, default_actor, Params::new())
    }

    pub fn area_with_defaults(
        mut self,
        name: &str,
        template: impl QueryTemplate + 'static,
        default_actor: Option<&str>,
        defaults: Params,
    ) -> Self {
        self.areas.insert(
            name.to_string(),
            AreaDefinition {
                name: name.to_string(),
                template: Arc::new(template),
                default_actor: default_actor.map(str::to_string),
                defaults,
            },
        );
        self
    }

    /// Register `actor` under its own name.
    pub fn actor(mut self, actor: impl Actor + 'static) -> Self {
        self.actors.insert(actor.name().to_string(), Arc::new(actor));
        self
    }

    pub fn notifier<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Params) -> Result<Arc<dyn Notifier>> + Send + Sync + 'static,
    {
        self.notifiers.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn fetcher<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Params) -> Result<Arc<dyn Fetcher>> + Send + Sync + 'static,
    {
        self.fetchers.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Register `enricher` under its rule source.
    pub fn enricher(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enrichers
            .insert(enricher.source().to_ascii_uppercase(), Arc::new(enricher));
        self
    }

    /// Fails when an area's default actor is not registered, or when the
    /// area's query lacks fields that actor needs.
    pub fn build(self) -> Result<PluginRegistry> {
        for area in self.areas.values() {
            let Some(actor_name) = &area.default_actor else {
                continue;
            };
            let in_area = |e: BachError| {
                let detail = match e {
                    BachError::Configuration(msg) => msg,
                    other => other.to_string(),
                };
                BachError::Configuration(format!("area '{}': {detail}", area.name))
            };
            let actor = self
                .actors
                .get(actor_name)
                .ok_or_else(|| in_area(unknown("actor", actor_name, self.actors.keys())))?;
            require_fields(&*area.template, actor.required_query_fields()).map_err(in_area)?;
        }
        Ok(PluginRegistry {
            areas: self.areas,
            actors: self.actors,
            notifiers: self.notifiers,
            fetchers: self.fetchers,
            enrichers: self.enrichers,
        })
    }
}
