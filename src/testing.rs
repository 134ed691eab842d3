//! Test support: a scripted in-memory cluster API and a handler built on it

use crate::{
    apply_remaining_tags, create_with_tagging_fallback, default_rules, handle_exception,
    rules::NOT_FOUND_CODES, update_tags, HandlerConfig, HandlerRequest, HandlerStats,
    IdempotencyKey, ListPage, Matcher, OperationKind, OperationState, Outcome, Progress,
    RemoteError, ResourceHandler, RuleSet, Sequencer, TagMap, TaggingClient, TracingObserver,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier key under which the cluster ARN is kept in `OperationState`
pub const ARN: &str = "arn";

const PAGE_SIZE: usize = 2;

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Sample resource model
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DbCluster {
    pub name: String,
    pub engine_version: String,
    pub arn: Option<String>,
    pub status: Option<String>,
}

impl DbCluster {
    pub fn new(name: &str, engine_version: &str) -> Self {
        Self {
            name: name.to_owned(),
            engine_version: engine_version.to_owned(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModifyClusterRequest {
    pub name: String,
    pub engine_version: String,
}

/// Remote API operations the mock counts and scripts
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiOp {
    Create,
    Describe,
    Modify,
    Delete,
    AddTags,
    RemoveTags,
    List,
}

#[derive(Default)]
struct MockInner {
    clusters: BTreeMap<String, DbCluster>,
    calls: BTreeMap<ApiOp, u32>,
    failures: BTreeMap<ApiOp, VecDeque<Option<RemoteError>>>,
    statuses: VecDeque<String>,
    create_tags: Vec<TagMap>,
    tags: BTreeMap<String, TagMap>,
}

/// In-memory cluster API with per-operation call counters and scripted failures
#[derive(Default)]
pub struct MockApi {
    inner: Mutex<MockInner>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the result of the next `op` call: `Some(error)` fails it, `None` lets it through
    pub fn script(&self, op: ApiOp, failure: Option<RemoteError>) {
        self.lock().failures.entry(op).or_default().push_back(failure);
    }

    /// Queue statuses reported by the next describe calls
    pub fn script_statuses(&self, statuses: &[&str]) {
        self.lock()
            .statuses
            .extend(statuses.iter().map(|s| s.to_string()));
    }

    pub fn insert(&self, cluster: DbCluster) {
        self.lock().clusters.insert(cluster.name.clone(), cluster);
    }

    pub fn calls(&self, op: ApiOp) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Tag maps sent with each create call, in order, failed calls included
    pub fn create_tags(&self) -> Vec<TagMap> {
        self.lock().create_tags.clone()
    }

    /// Tags currently attached to `arn`
    pub fn tags_of(&self, arn: &str) -> TagMap {
        self.lock().tags.get(arn).cloned().unwrap_or_default()
    }

    fn enter(&self, op: ApiOp) -> Result<MutexGuard<'_, MockInner>, RemoteError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_insert(0) += 1;
        let failure = inner
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .flatten();
        match failure {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }

    pub fn create_cluster(
        &self,
        cluster: &DbCluster,
        tags: &TagMap,
    ) -> Result<String, RemoteError> {
        self.lock().create_tags.push(tags.clone());
        let mut inner = self.enter(ApiOp::Create)?;
        if inner.clusters.contains_key(&cluster.name) {
            return Err(RemoteError::service("AlreadyExists", "cluster already exists"));
        }
        let arn = format!("arn:mock:cluster:{}", cluster.name);
        let created = DbCluster {
            arn: Some(arn.clone()),
            status: Some("creating".into()),
            ..cluster.clone()
        };
        inner.clusters.insert(cluster.name.clone(), created);
        inner.tags.insert(arn.clone(), tags.clone());
        Ok(arn)
    }

    pub fn describe_cluster(&self, name: &str) -> Result<DbCluster, RemoteError> {
        let mut inner = self.enter(ApiOp::Describe)?;
        let status = inner.statuses.pop_front();
        let cluster = inner
            .clusters
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::service("ResourceNotFoundException", "cluster not found"))?;
        Ok(DbCluster {
            status: Some(status.unwrap_or_else(|| "available".into())),
            ..cluster
        })
    }

    pub fn modify_cluster(&self, request: &ModifyClusterRequest) -> Result<(), RemoteError> {
        let mut inner = self.enter(ApiOp::Modify)?;
        let cluster = inner
            .clusters
            .get_mut(&request.name)
            .ok_or_else(|| RemoteError::service("ResourceNotFoundException", "cluster not found"))?;
        cluster.engine_version = request.engine_version.clone();
        Ok(())
    }

    pub fn delete_cluster(&self, name: &str) -> Result<(), RemoteError> {
        let mut inner = self.enter(ApiOp::Delete)?;
        inner
            .clusters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::service("ResourceNotFoundException", "cluster not found"))
    }

    pub fn list_clusters(
        &self,
        page_token: Option<&str>,
    ) -> Result<ListPage<DbCluster>, RemoteError> {
        let inner = self.enter(ApiOp::List)?;
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RemoteError::service("ValidationException", "invalid page token"))?,
            None => 0,
        };
        let resources: Vec<DbCluster> = inner
            .clusters
            .values()
            .skip(start)
            .take(PAGE_SIZE)
            .cloned()
            .collect();
        let next = start + resources.len();
        let next_page_token = (next < inner.clusters.len()).then(|| next.to_string());
        Ok(ListPage {
            resources,
            next_page_token,
        })
    }
}

impl TaggingClient for MockApi {
    fn add_tags(&self, resource_id: &str, tags: &TagMap) -> Result<(), RemoteError> {
        let mut inner = self.enter(ApiOp::AddTags)?;
        inner
            .tags
            .entry(resource_id.to_owned())
            .or_default()
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn remove_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), RemoteError> {
        let mut inner = self.enter(ApiOp::RemoveTags)?;
        if let Some(tags) = inner.tags.get_mut(resource_id) {
            tags.retain(|key, _| !keys.contains(key));
        }
        Ok(())
    }
}

fn is_available(cluster: &DbCluster) -> bool {
    cluster.status.as_deref() == Some("available")
}

/// Put identity discovered by an earlier invocation back on the resource
fn restore_identity(mut cluster: DbCluster, state: OperationState) -> Progress<DbCluster> {
    if let Some(arn) = state.identifier(ARN) {
        cluster.arn = Some(arn.to_owned());
    }
    Progress::progress(cluster, state)
}

/// Sample handler for [`DbCluster`] on top of [`MockApi`]
pub struct ClusterHandler {
    pub api: Arc<MockApi>,
    pub config: HandlerConfig,
    pub stats: Arc<HandlerStats>,
    /// Consecutive "available" reads required before a cluster counts as stable
    pub confirmations: u32,
}

impl ClusterHandler {
    pub fn new(api: Arc<MockApi>, config: HandlerConfig) -> Self {
        Self {
            api,
            config,
            stats: Arc::new(HandlerStats::new()),
            confirmations: 1,
        }
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    fn sequencer(&self, operation: OperationKind) -> Sequencer {
        Sequencer::new(operation, self.config.clone())
            .with_stats(self.stats.clone())
            .with_observer(Arc::new(TracingObserver))
    }
}

impl ResourceHandler for ClusterHandler {
    type Resource = DbCluster;

    fn create(
        &self,
        request: HandlerRequest<DbCluster>,
        state: Option<OperationState>,
    ) -> Outcome<DbCluster> {
        let seq = self.sequencer(OperationKind::Create);
        let api = self.api.as_ref();
        let tags = request.desired_tags;

        Progress::progress(request.desired, OperationState::resume(state))
            .then(restore_identity)
            .then(|r, s| {
                let rules = default_rules();
                create_with_tagging_fallback(&seq, r, s, &tags, &rules, |cluster, state, flat| {
                    let arn = api.create_cluster(cluster, flat)?;
                    state.set_identifier(ARN, arn.clone());
                    cluster.arn = Some(arn);
                    Ok(())
                })
            })
            .then(|r, s| {
                let name = r.name.clone();
                seq.await_stable(
                    "wait-available",
                    r,
                    s,
                    "cluster-available",
                    self.confirmations,
                    |_| api.describe_cluster(&name).map(|c| is_available(&c)),
                    &default_rules(),
                )
            })
            .then(|r, s| {
                let arn = s.identifier(ARN).unwrap_or_default().to_owned();
                apply_remaining_tags(&seq, r, s, api, &arn, &tags)
            })
            .into_outcome()
    }

    fn read(&self, resource: DbCluster) -> Outcome<DbCluster> {
        let seq = self.sequencer(OperationKind::Read);
        let api = self.api.as_ref();

        seq.initiate("describe-cluster", resource, OperationState::new())
            .translate(|r| r.name.clone())
            .call(|name| api.describe_cluster(name))
            .on_response(|found, r, _| *r = found.clone())
            .progress()
            .into_outcome()
    }

    fn update(
        &self,
        request: HandlerRequest<DbCluster>,
        state: Option<OperationState>,
    ) -> Outcome<DbCluster> {
        let seq = self.sequencer(OperationKind::Update);
        let api = self.api.as_ref();
        let HandlerRequest {
            desired,
            desired_tags,
            previous_tags,
            ..
        } = request;

        Progress::progress(desired, OperationState::resume(state))
            .then(restore_identity)
            .then(|r, s| {
                seq.initiate("modify-cluster", r, s)
                    .idempotent(IdempotencyKey::for_step("modify-cluster"))
                    .translate(|r| ModifyClusterRequest {
                        name: r.name.clone(),
                        engine_version: r.engine_version.clone(),
                    })
                    .call(|req| api.modify_cluster(req))
                    .stabilize_probed("cluster-available", self.confirmations, |req, _| {
                        api.describe_cluster(&req.name).map(|c| is_available(&c))
                    })
                    .handle_error(default_rules())
                    .progress()
            })
            .then(|r, s| {
                let arn = r.arn.clone().unwrap_or_default();
                update_tags(&seq, r, s, api, &arn, &previous_tags, &desired_tags, &default_rules())
            })
            .into_outcome()
    }

    fn delete(&self, resource: DbCluster, state: Option<OperationState>) -> Outcome<DbCluster> {
        let seq = self.sequencer(OperationKind::Delete);
        let api = self.api.as_ref();

        Progress::progress(resource, OperationState::resume(state))
            .then(|r, s| {
                seq.initiate("delete-cluster", r, s)
                    .idempotent(IdempotencyKey::for_step("delete-cluster"))
                    .translate(|r| r.name.clone())
                    .call(|name| api.delete_cluster(name))
                    .handle_error(RuleSet::ignore_not_found_as_success().or_else(default_rules()))
                    .progress()
            })
            .then(|r, s| {
                let name = r.name.clone();
                seq.await_stable(
                    "wait-deleted",
                    r,
                    s,
                    "cluster-deleted",
                    self.confirmations,
                    |_| match api.describe_cluster(&name) {
                        Ok(_) => Ok(false),
                        Err(error) if Matcher::codes(NOT_FOUND_CODES).matches(&error) => Ok(true),
                        Err(error) => Err(error),
                    },
                    &default_rules(),
                )
            })
            .into_outcome()
    }

    fn list(&self, page_token: Option<String>) -> Outcome<ListPage<DbCluster>> {
        match self.api.list_clusters(page_token.as_deref()) {
            Ok(page) => Outcome::Success {
                resource: page,
                message: None,
            },
            Err(error) => {
                let empty = ListPage {
                    resources: Vec::new(),
                    next_page_token: None,
                };
                let start = Progress::progress(empty, OperationState::new());
                handle_exception(start, &error, &default_rules()).into_outcome()
            }
        }
    }
}
