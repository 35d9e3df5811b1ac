//! The `Bach` pipeline: fetch a report, filter it by rules, act on the
//! surviving rows and notify channels about the result.
//!
//! Stages advance strictly in order:
//!
//! ```text
//! Configuring -> Fetched -> Filtered -> Acted -> Notified
//! ```
//!
//! Every operation checks the current stage first and fails with a state
//! error when called out of order. A failing operation leaves the pipeline
//! exactly as it was.

use crate::actor::{ActionResult, Actor};
use crate::error::{BachError, Result};
use crate::fetcher::Fetcher;
use crate::notifier::{deliver, NotificationSummary, Notifier};
use crate::params::Params;
use crate::query::{build_query, QuerySource};
use crate::registry::{PluginRegistry, DEFAULT_FETCHER};
use crate::report::Report;
use crate::request::BachRequest;
use crate::rules::{compile, RuleSet};
use crate::task::{PluginRef, Task};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuring,
    Fetched,
    Filtered,
    Acted,
    Notified,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Configuring => "configuring",
            Stage::Fetched => "fetched",
            Stage::Filtered => "filtered",
            Stage::Acted => "acted",
            Stage::Notified => "notified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a complete run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub result: ActionResult,
    pub notifications: NotificationSummary,
}

#[derive(Clone)]
struct ConfiguredFetcher {
    /// `None` for custom fetchers, which cannot be saved into a task.
    reference: Option<PluginRef>,
    fetcher: Arc<dyn Fetcher>,
}

#[derive(Clone)]
struct ConfiguredActor {
    reference: PluginRef,
    actor: Arc<dyn Actor>,
}

#[derive(Clone)]
struct ConfiguredNotifier {
    reference: PluginRef,
    notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct Bach {
    registry: Arc<PluginRegistry>,
    stage: Stage,

    query: Option<QuerySource>,
    accounts: Vec<String>,
    fetcher: Option<ConfiguredFetcher>,
    actor: Option<ConfiguredActor>,
    params: Params,
    rules: RuleSet,
    notifiers: Vec<ConfiguredNotifier>,

    report: Option<Report>,
    action_result: Option<ActionResult>,
    notifications: Option<NotificationSummary>,
}

impl Bach {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            stage: Stage::Configuring,
            query: None,
            accounts: Vec::new(),
            fetcher: None,
            actor: None,
            params: Params::new(),
            rules: RuleSet::default(),
            notifiers: Vec::new(),
            report: None,
            action_result: None,
            notifications: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Most recent report: fetched, then replaced by the filtered one.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn action_result(&self) -> Option<&ActionResult> {
        self.action_result.as_ref()
    }

    pub fn notifications(&self) -> Option<&NotificationSummary> {
        self.notifications.as_ref()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn expect_stage(&self, operation: &str, stage: Stage) -> Result<()> {
        if self.stage != stage {
            return Err(BachError::state(operation, self.stage));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Query through the named area's template.
    pub fn with_type(&mut self, area: &str) -> Result<&mut Self> {
        self.expect_stage("set area", Stage::Configuring)?;
        self.registry.area(area)?;
        self.query = Some(QuerySource::Area(area.to_string()));
        Ok(self)
    }

    /// Send `query` to the backend verbatim.
    pub fn with_query(&mut self, query: &str) -> Result<&mut Self> {
        self.expect_stage("set query", Stage::Configuring)?;
        self.query = Some(QuerySource::Raw(query.to_string()));
        Ok(self)
    }

    pub fn with_accounts<I, S>(&mut self, accounts: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expect_stage("set accounts", Stage::Configuring)?;
        self.accounts = accounts.into_iter().map(Into::into).collect();
        Ok(self)
    }

    pub fn with_fetcher(&mut self, name: &str, params: Params) -> Result<&mut Self> {
        self.expect_stage("set fetcher", Stage::Configuring)?;
        let fetcher = self.registry.fetcher(name, &params)?;
        self.fetcher = Some(ConfiguredFetcher {
            reference: Some(PluginRef::new(name, params)),
            fetcher,
        });
        Ok(self)
    }

    pub fn with_custom_fetcher(&mut self, fetcher: Arc<dyn Fetcher>) -> Result<&mut Self> {
        self.expect_stage("set fetcher", Stage::Configuring)?;
        self.fetcher = Some(ConfiguredFetcher {
            reference: None,
            fetcher,
        });
        Ok(self)
    }

    pub fn with_actor(&mut self, name: &str, params: Params) -> Result<&mut Self> {
        self.expect_stage("set actor", Stage::Configuring)?;
        let actor = self.registry.actor(name)?;
        self.actor = Some(ConfiguredActor {
            reference: PluginRef::new(name, params),
            actor,
        });
        Ok(self)
    }

    /// Same as [`Bach::with_actor`]: a pipeline holds a single actor, so a
    /// later action replaces an earlier one.
    pub fn add_action(&mut self, name: &str, params: Params) -> Result<&mut Self> {
        self.with_actor(name, params)
    }

    /// Drop any configured actor; `act` then passes rows through.
    pub fn without_actor(&mut self) -> Result<&mut Self> {
        self.expect_stage("clear actor", Stage::Configuring)?;
        self.actor = None;
        Ok(self)
    }

    /// Free-form parameters for the query template and the actor.
    pub fn with_params(&mut self, params: Params) -> Result<&mut Self> {
        self.expect_stage("set params", Stage::Configuring)?;
        self.params = params;
        Ok(self)
    }

    /// Compile and attach rules. All of them compile or none is added.
    pub fn add_rules<I, S>(&mut self, expressions: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.stage >= Stage::Filtered {
            return Err(BachError::state("add rules", self.stage));
        }
        let mut rules = self.rules.clone();
        for expression in expressions {
            let rule = compile(expression.as_ref())?;
            for source in rule.sources().keys() {
                if self.registry.enricher(source).is_err() {
                    let available = self.registry.enricher_names();
                    return Err(BachError::syntax(
                        rule.source(),
                        format!(
                            "unsupported rule source '{source}' (available: {})",
                            if available.is_empty() {
                                "none".to_string()
                            } else {
                                available.join(", ")
                            }
                        ),
                    ));
                }
            }
            rules.insert(rule);
        }
        self.rules = rules;
        Ok(self)
    }

    pub fn add_notify(&mut self, name: &str, params: Params) -> Result<&mut Self> {
        if self.stage >= Stage::Notified {
            return Err(BachError::state("add notifier", self.stage));
        }
        let reference = PluginRef::new(name, params);
        if self.notifiers.iter().any(|n| n.reference == reference) {
            return Ok(self);
        }
        let notifier = self.registry.notifier(name, &reference.params)?;
        self.notifiers.push(ConfiguredNotifier {
            reference,
            notifier,
        });
        Ok(self)
    }

    /// Area defaults overlaid with the pipeline's own params.
    fn effective_params(&self) -> Result<Params> {
        let mut params = match &self.query {
            Some(QuerySource::Area(area)) => self.registry.area(area)?.defaults.clone(),
            _ => Params::new(),
        };
        params.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(params)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Configuring → Fetched. `query` overrides the configured query source.
    pub fn fetch(&mut self, query: Option<&str>) -> Result<&Report> {
        self.expect_stage("fetch", Stage::Configuring)?;
        if self.accounts.is_empty() {
            return Err(BachError::Configuration("no accounts configured".into()));
        }

        let params = self.effective_params()?;
        let query = match (query, &self.query) {
            (Some(q), _) => Some(q.to_string()),
            (None, Some(source)) => Some(build_query(&self.registry, source, &self.accounts, &params)?),
            (None, None) => None,
        };

        let fetcher = match (&self.fetcher, &query) {
            (Some(configured), _) => configured.fetcher.clone(),
            (None, Some(_)) => self.registry.fetcher(DEFAULT_FETCHER, &Params::new())?,
            (None, None) => {
                return Err(BachError::Configuration(
                    "nothing to fetch: configure an area, a query or a fetcher".into(),
                ))
            }
        };

        tracing::debug!(query = query.as_deref().unwrap_or(""), "fetching report");
        let report = fetcher.fetch(query.as_deref(), &self.accounts)?;
        tracing::info!(rows = report.len(), accounts = self.accounts.len(), "report fetched");

        self.stage = Stage::Fetched;
        Ok(self.report.insert(report))
    }

    /// Fetched → Filtered. Keeps the rows every rule accepts.
    pub fn apply(&mut self) -> Result<&Report> {
        self.expect_stage("apply rules", Stage::Fetched)?;
        let Some(report) = &self.report else {
            return Err(BachError::state("apply rules", "no report is stored"));
        };
        let enriched = self.enrich(report)?;
        let report = enriched.as_ref().unwrap_or(report);
        let filtered = report.filter(&self.rules)?;
        tracing::info!(
            rules = self.rules.len(),
            before = report.len(),
            after = filtered.len(),
            "rules applied"
        );

        self.stage = Stage::Filtered;
        Ok(self.report.insert(filtered))
    }

    /// Join the columns of every non-ads rule source into `report`. `None`
    /// when no rule reads such a source.
    fn enrich(&self, report: &Report) -> Result<Option<Report>> {
        let mut enriched: Option<Report> = None;
        for (source, attributes) in self.rules.sources() {
            let enricher = self.registry.enricher(&source)?;
            let offered = enricher.fields();
            // Attributes the source lacks stay unbound and fail as binding errors.
            let fields: Vec<String> = attributes
                .into_iter()
                .filter(|a| offered.contains(a))
                .collect();
            if fields.is_empty() {
                continue;
            }
            let base = enriched.as_ref().unwrap_or(report);
            let extra = enricher.enrich(base, &fields)?;
            tracing::info!(source = %source, fields = fields.len(), "report enriched");
            enriched = Some(base.join(&source, extra)?);
        }
        Ok(enriched)
    }

    /// Filtered → Acted. Without an actor the rows pass through untouched.
    pub fn act(&mut self) -> Result<&ActionResult> {
        self.expect_stage("act", Stage::Filtered)?;
        let Some(report) = &self.report else {
            return Err(BachError::state("act", "no report is stored"));
        };
        let result = match &self.actor {
            None => ActionResult::passthrough(report.clone()),
            Some(configured) => {
                let mut params = self.effective_params()?;
                params.extend(
                    configured
                        .reference
                        .params
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
                configured.actor.act(report, &params)?
            }
        };
        tracing::info!("{}", result.summary());

        self.stage = Stage::Acted;
        Ok(self.action_result.insert(result))
    }

    /// Acted → Notified. Channel failures are reported, not raised.
    pub fn notify(&mut self) -> Result<NotificationSummary> {
        self.expect_stage("notify", Stage::Acted)?;
        let Some(result) = &self.action_result else {
            return Err(BachError::state("notify", "no action result is stored"));
        };
        let channels: Vec<Arc<dyn Notifier>> =
            self.notifiers.iter().map(|n| n.notifier.clone()).collect();
        let summary = deliver(&channels, result);
        tracing::info!(
            delivered = summary.delivered.len(),
            failed = summary.failed.len(),
            "notifications sent"
        );

        self.stage = Stage::Notified;
        self.notifications = Some(summary.clone());
        Ok(summary)
    }

    /// Validate the configuration, then fetch, apply, act and notify.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.expect_stage("run", Stage::Configuring)?;
        if self.accounts.is_empty() {
            return Err(BachError::Configuration("no accounts configured".into()));
        }
        if self.query.is_none() && self.fetcher.is_none() {
            return Err(BachError::Configuration(
                "nothing to fetch: configure an area, a query or a fetcher".into(),
            ));
        }

        self.fetch(None)?;
        self.apply()?;
        let result = self.act()?.clone();
        let notifications = self.notify()?;
        Ok(RunSummary {
            result,
            notifications,
        })
    }

    // -----------------------------------------------------------------------
    // Tasks and requests
    // -----------------------------------------------------------------------

    /// Snapshot the configuration as a task. Runtime data is never included.
    pub fn as_task(&self, name: &str) -> Result<Task> {
        let fetcher = match &self.fetcher {
            Some(ConfiguredFetcher {
                reference: None, ..
            }) => {
                return Err(BachError::Configuration(
                    "a custom fetcher cannot be saved into a task".into(),
                ))
            }
            Some(configured) => configured.reference.clone(),
            None => None,
        };
        let mut task = Task::new(name, self.accounts.clone());
        task.query = self.query.clone();
        task.rules = self.rules.expressions();
        task.actor = self.actor.as_ref().map(|a| a.reference.clone());
        task.notifiers = self.notifiers.iter().map(|n| n.reference.clone()).collect();
        task.fetcher = fetcher;
        task.params = self.params.clone();
        task.validate()?;
        Ok(task)
    }

    /// A fresh pipeline configured from `task`.
    pub fn from_task(registry: Arc<PluginRegistry>, task: &Task) -> Result<Self> {
        let mut bach = Self::new(registry);
        match &task.query {
            Some(QuerySource::Area(area)) => {
                bach.with_type(area)?;
            }
            Some(QuerySource::Raw(query)) => {
                bach.with_query(query)?;
            }
            None => {}
        }
        bach.with_accounts(task.accounts.iter().cloned())?
            .with_params(task.params.clone())?
            .add_rules(&task.rules)?;
        if let Some(fetcher) = &task.fetcher {
            bach.with_fetcher(&fetcher.name, fetcher.params.clone())?;
        }
        if let Some(actor) = &task.actor {
            bach.with_actor(&actor.name, actor.params.clone())?;
        }
        for notifier in &task.notifiers {
            bach.add_notify(&notifier.name, notifier.params.clone())?;
        }
        Ok(bach)
    }

    pub fn run_task(registry: Arc<PluginRegistry>, task: &Task) -> Result<RunSummary> {
        tracing::info!(task = %task.name, id = %task.id, "running task");
        Self::from_task(registry, task)?.run()
    }

    /// Configure from `request` and run, acting with the area's default actor.
    ///
    /// On failure this pipeline is left untouched.
    pub fn play(&mut self, request: &BachRequest) -> Result<RunSummary> {
        self.expect_stage("play", Stage::Configuring)?;
        let mut next = Self::new(self.registry.clone());
        next.with_type(&request.area)?
            .with_accounts(request.accounts.iter().cloned())?
            .with_params(request.area_parameters.clone())?
            .add_rules(&request.rules)?;
        if let Some(actor) = self.registry.area(&request.area)?.default_actor.clone() {
            next.with_actor(&actor, Params::new())?;
        }
        for channel in &request.notify {
            next.add_notify(channel, request.notification_parameters.clone())?;
        }
        let summary = next.run()?;
        *self = next;
        Ok(summary)
    }
}
